use anyhow::Context;
use axum_server::{tls_rustls::RustlsConfig, Handle};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use album_api_rust::config::RuntimeConfig;
use album_api_rust::server::{shutdown_signal, Service};

#[derive(Parser)]
#[command(name = "album-api")]
#[command(about = "JSON API for users, albums and photos")]
#[command(version)]
struct Cli {
    /// development, staging or production (defaults to APP_ENV, then development)
    environment: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL, JWT_SECRET, etc. can live there
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = RuntimeConfig::for_environment(cli.environment.as_deref());
    tracing::info!("Starting album API in {} mode", config.environment);

    let mut service = Service::new(config.clone());
    let app = match service.run().await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("Startup aborted: {}", e);
            std::process::exit(1);
        }
    };

    let tls = match RustlsConfig::from_pem_file(&config.tls.cert_path, &config.tls.key_path).await {
        Ok(tls) => tls,
        Err(e) => {
            service.shutdown().await;
            return Err(e).with_context(|| {
                format!(
                    "failed to load TLS certificate {} / key {}",
                    config.tls.cert_path.display(),
                    config.tls.key_path.display()
                )
            });
        }
    };

    let handle = Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.graceful_shutdown(Some(Duration::from_secs(10)));
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Album API listening on https://{}", addr);

    let served = axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await;

    service.shutdown().await;
    served.with_context(|| format!("server on {} failed", addr))?;
    Ok(())
}
