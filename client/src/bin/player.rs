//! Find an opponent through the shared dashboard.
//!
//! Every confirmed transaction is printed as a YAML audit record.

use anyhow::{anyhow, Context};
use clap::Parser;
use commonware_cryptography::{ed25519::PrivateKey, PrivateKeyExt};
use rand::rngs::OsRng;
use std::{path::PathBuf, str::FromStr};
use tictactoe_client::{Client, Commitment, Dashboard, Store, Submitter};
use tictactoe_types::Address;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Join or host a game through the dashboard")]
struct Args {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Dashboard config written by the `dashboard` binary.
    #[arg(short, long, default_value = "dashboard.json")]
    config: PathBuf,

    /// Dashboard address, overriding the config file.
    #[arg(short, long)]
    dashboard: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    let level = tracing::Level::from_str(&args.log_level).context("invalid log level")?;
    tracing_subscriber::fmt().with_max_level(level).init();

    let address = match &args.dashboard {
        Some(address) => Address::from_str(address)
            .map_err(|err| anyhow!("invalid dashboard address {address}: {err}"))?,
        None => {
            let config = Store::new(&args.config)
                .load()
                .context("failed to load dashboard config")?;
            if config.commitment != Commitment::Confirmed {
                warn!(commitment = ?config.commitment, "simulator only confirms synchronously");
            }
            config.validate().context("invalid dashboard config")?.address
        }
    };

    let client = Client::new(&args.url).context("invalid ledger url")?;
    let submitter = Submitter::new(client).with_observer(|audit| {
        match serde_yaml::to_string(audit) {
            Ok(yaml) => println!("---\n{yaml}"),
            Err(err) => warn!(%err, "failed to render audit record"),
        }
    });
    let dashboard = Dashboard::connect(&submitter, address)
        .await
        .context("failed to connect to dashboard")?;

    let player = PrivateKey::from_rng(&mut OsRng);
    info!(player = %Address::from(&player), dashboard = %address, "looking for an opponent");
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let game = dashboard
        .start_game_until(&player, shutdown)
        .await
        .context("matchmaking failed")?;

    let state = game.state();
    info!(
        game = %game.address(),
        player_x = %state.player_x,
        player_o = ?state.player_o,
        "game in progress"
    );
    game.abandon();
    dashboard.disconnect();
    Ok(())
}
