mod logging;
mod rpc;
mod schema;
mod server;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use tickgate_core::{Gateway, GatewayConfig, ProviderId, ReqwestHttpClient};

/// Multi-provider financial-data gateway speaking line-delimited JSON-RPC
/// on stdin/stdout.
#[derive(Debug, Parser)]
#[command(name = "tickgate", version, about)]
struct Cli {
    /// Log level override (DEBUG, INFO, WARN, ERROR); defaults to $LOG_LEVEL.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref());

    let config = GatewayConfig::from_env();
    let gateway = Arc::new(Gateway::new(config, Arc::new(ReqwestHttpClient::new())));

    let available: Vec<&str> = ProviderId::ALL
        .into_iter()
        .filter(|provider| gateway.is_provider_available(*provider))
        .map(ProviderId::as_str)
        .collect();
    info!(providers = available.join(","), "gateway ready");

    match server::serve(gateway).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(io_error) => {
            eprintln!("error: {io_error}");
            ExitCode::FAILURE
        }
    }
}
