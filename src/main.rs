//! Loads the configuration, opens the store and serves the API until Ctrl-C.

use std::net::SocketAddr;

use anyhow::Context;
use dotenv::dotenv;
use log::{error, info};

use prms::config::Config;
use prms::services::Service;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(e) = run().await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let service = Service::from_config(&config).await?;

    if let Some(seed) = &config.admin {
        service
            .ensure_admin(seed)
            .await
            .context("Failed to create the administrator account")?;
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to open web server listener")?;

    let app = prms::app(service).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Failed to bind Axum to listener")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
