#![forbid(unsafe_code)]

use clap::Parser;
use gext_core::{ExtensionInfo, Runtime};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// CLI surface from the host contract: `-p/--port` is required, the rest
/// are informative flags an extension may use for its own bookkeeping.
#[derive(Parser, Debug)]
#[command(author, version, about = "G-Earth extension launcher")]
struct Cli {
    /// Port the host is listening on for this extension's connection.
    #[arg(short, long)]
    port: u16,

    /// Optional path passed by the host, meaning left to the extension.
    #[arg(short, long, value_name = "FILE")]
    filename: Option<String>,

    /// Optional auth token passed by the host.
    #[arg(short = 'c', long = "auth-token")]
    auth_token: Option<String>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    info!(port = cli.port, filename = ?cli.filename, auth_token = cli.auth_token.is_some(), "starting extension");

    let info = ExtensionInfo::new(
        "gext-cli example extension",
        "gext contributors",
        env!("CARGO_PKG_VERSION"),
        "Minimal packet-interception extension launched via gext-cli",
    );

    let runtime = Runtime::new(cli.port, info);
    if let Err(err) = runtime.start().await {
        error!(%err, "failed to start extension runtime");
        std::process::exit(1);
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for ctrl-c");
    }

    let _ = runtime.stop().await;
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
