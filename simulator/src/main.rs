use anyhow::Context;
use clap::Parser;
use std::{str::FromStr, sync::Arc};
use tictactoe_simulator::{Api, Simulator};
use tictactoe_types::api::DEFAULT_FEE_PER_SIGNATURE;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Fee charged per transaction signature.
    #[arg(short, long, default_value_t = DEFAULT_FEE_PER_SIGNATURE)]
    fee: u64,

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

    let simulator = Arc::new(Simulator::new(args.fee));
    let api = Api::new(simulator);
    let app = api.router();

    // Start server
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(fee = args.fee, "Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("axum server error")?;

    Ok(())
}
