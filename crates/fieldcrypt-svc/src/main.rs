//! `fieldcrypt-svc`: HTTP service applying field-level envelope encryption.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (tracing, optional OTLP).
//! 3. Build the key vault selected by `KEY_SOURCE`, pre-loading secret store keys.
//! 4. Build the [`CipherField`] transform.
//! 5. Spawn the background key expiry sweep.
//! 6. Build the Axum router and serve until SIGINT/SIGTERM.

mod aws;
mod config;
mod keys;
mod server;
mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use fieldcrypt::CipherField;
use tracing::info;

use config::Config;
use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "fieldcrypt-svc starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key vault
    // -----------------------------------------------------------------------
    let vault = keys::build_vault(&cfg).await?;

    // -----------------------------------------------------------------------
    // 4. Transform
    // -----------------------------------------------------------------------
    let settings = cfg.transform_settings()?;
    info!(
        mode = %settings.cipher_mode,
        field_mode = %settings.field_mode,
        fields = settings.field_count(),
        "transform configured"
    );
    let transform = Arc::new(CipherField::new(settings, vault).context("invalid transform settings")?);

    // -----------------------------------------------------------------------
    // 5. Background tasks
    // -----------------------------------------------------------------------
    let _key_expiry = keys::expiry_task(transform.clone(), cfg.key_expiry_sweep_interval());

    // -----------------------------------------------------------------------
    // 6. HTTP server
    // -----------------------------------------------------------------------
    let router = server::router::build(AppState::new(transform));

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("fieldcrypt-svc stopped");
    telemetry::shutdown_telemetry();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
