#![forbid(unsafe_code)]

//! A minimal demo extension: logs lifecycle events, echoes every packet in
//! both directions via a catch-all interceptor, and intercepts one header
//! id to demonstrate blocking. Mirrors the shape of G-Python's own example
//! extension (lifecycle hooks, a catch-all logger, one targeted blocker).

use clap::Parser;
use gext_core::{Direction, ExtensionInfo, InterceptMode, Runtime};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(short, long)]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let info = ExtensionInfo::new(
        "echo extension",
        "gext contributors",
        "1.0",
        "Logs every packet crossing the connection in both directions",
    );

    let runtime = Runtime::new(cli.port, info);

    runtime.on_event("double_click", || info!("extension has been clicked")).await;
    runtime.on_event("init", || info!("initialized with host")).await;
    runtime.on_event("connection_start", || info!("connection started")).await;
    runtime.on_event("connection_end", || info!("connection ended")).await;

    runtime
        .intercept(
            Direction::ToServer,
            -1i16,
            InterceptMode::Blocking,
            |message| {
                info!(direction = ?message.direction, header = message.packet.header_id(), "packet");
            },
        )
        .await;
    runtime
        .intercept(
            Direction::ToClient,
            -1i16,
            InterceptMode::Blocking,
            |message| {
                info!(direction = ?message.direction, header = message.packet.header_id(), "packet");
            },
        )
        .await;

    // Block a single chat header outright, as a demonstration of a
    // targeted (non-catch-all) blocking interceptor.
    runtime
        .intercept(
            Direction::ToServer,
            2547i16,
            InterceptMode::Blocking,
            |message| {
                message.blocked = true;
            },
        )
        .await;

    runtime.start().await.expect("failed to start extension runtime");

    match runtime.request_flags().await {
        Ok(flags) => info!(?flags, "host flags"),
        Err(e) => info!(error = %e, "could not read host flags"),
    }

    tokio::signal::ctrl_c().await.ok();
    let _ = runtime.stop().await;
}
