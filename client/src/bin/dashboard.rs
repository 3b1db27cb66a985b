//! Find the dashboard recorded in the config file, or create one and record it.

use anyhow::Context;
use clap::Parser;
use std::{path::PathBuf, str::FromStr};
use tictactoe_client::{fetch_dashboard, Client, Commitment, Store, Submitter};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Create or reconnect to the shared dashboard")]
struct Args {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Where the dashboard key is persisted.
    #[arg(short, long, default_value = "dashboard.json")]
    config: PathBuf,

    #[arg(long, value_enum, default_value_t = Commitment::Confirmed)]
    commitment: Commitment,

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

    let client = Client::new(&args.url).context("invalid ledger url")?;
    let submitter = Submitter::new(client);
    let store = Store::new(args.config);
    let dashboard = fetch_dashboard(&store, &submitter, &args.url, args.commitment)
        .await
        .context("failed to fetch dashboard")?;

    let state = dashboard.state();
    info!(
        dashboard = %dashboard.address(),
        config = %store.path().display(),
        total_games = state.total_games,
        pending = ?state.pending_game,
        "dashboard ready"
    );
    println!("{}", dashboard.address());
    dashboard.disconnect();
    Ok(())
}
