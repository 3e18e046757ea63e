//! videogate — edge-resident video transformation gateway.
//!
//! Entry point: parse CLI args, load and validate configuration, initialize
//! telemetry, wire `AppState`, and serve the router with graceful shutdown.
//! The panic hook is the one piece of the teacher's original `main.rs` that
//! survives unchanged; everything past it is new.

use std::panic;
use std::sync::Arc;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "videogate", version = videogate::VERSION)]
struct Cli {
    /// Path to the YAML or JSON configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Address to bind the HTTP listener to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Base URL of the upstream media-transformation endpoint.
    #[arg(long, default_value = "https://transform.internal")]
    transform_base_path: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    panic::set_hook(Box::new(|panic_info| {
        eprintln!("videogate fatal error:");
        eprintln!("{}", panic_info);
        if let Some(location) = panic_info.location() {
            eprintln!("location: {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    let cli = Cli::parse();

    let config = videogate::config::AppConfig::from_path(&cli.config)?;
    videogate::telemetry::init(&config);

    tracing::info!(version = videogate::VERSION, bind = %cli.bind, "starting videogate");

    let state = Arc::new(videogate::api::state::AppState::build(
        config,
        cli.transform_base_path,
    )?);
    let app = videogate::api::routes::build_router(state);

    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    tracing::info!(bind = %cli.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("videogate shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
