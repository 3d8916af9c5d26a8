//! The gateway's HTTP binding: builds the `axum::Router`, wires the
//! outer CORS layer, health endpoints, and request-logging middleware,
//! then mounts [`llm::router`] (spec.md §1: this outer binding — and the
//! auth/CORS/request-logging middleware it hosts — is explicitly out of
//! the gateway's core, but the crate boundary and its use of `axum`/
//! `tower-http` are carried, per SPEC_FULL §10).

#![deny(missing_docs)]

mod cors;
mod error;
mod health;
mod logging;
mod metrics;

use std::{net::SocketAddr, sync::Arc};

use anyhow::anyhow;
use axum::{Router, routing::get};
use config::Config;
use logging::RequestLoggingLayer;
use metrics::Metrics;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::Error;

/// Configuration for serving the gateway.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to.
    pub listen_address: SocketAddr,
    /// The deserialized gateway TOML configuration.
    pub config: Config,
    /// Cancellation token for graceful shutdown.
    pub shutdown_signal: CancellationToken,
    /// The version string to log on startup.
    pub version: String,
    /// Optional oneshot sender to send back the bound address (useful
    /// when port 0 was specified).
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts and runs the gateway server with the provided configuration.
pub async fn serve(
    ServeConfig { listen_address, config, shutdown_signal, version, bound_addr_sender }: ServeConfig,
) -> anyhow::Result<()> {
    log::info!("gateway {version}");

    let metrics = Arc::new(Metrics::new());
    let cors = cors::new_layer(config.server.cors.as_ref());

    let mut app = Router::new();
    let mut llm_exposed = false;

    let state = Arc::new(llm::AppState::new(config.llm.clone(), build_http_client()?));

    if let Some(llm_router) = llm::router(state) {
        app = app.merge(llm_router);
        llm_exposed = true;
    } else {
        log::warn!("gateway is disabled in configuration — no protocol endpoints mounted");
    }

    if config.server.health.enabled {
        let health_router = Router::new()
            .route(&config.server.health.path, get(health::health))
            .route(&format!("{}/ready", config.server.health.path), get(health::ready))
            .route(&format!("{}/live", config.server.health.path), get(health::live))
            .route(&format!("{}/stats", config.server.health.path), get(health::stats))
            .with_state(metrics.clone());

        app = app.merge(health_router);
    }

    app = app.layer(RequestLoggingLayer::new(metrics)).layer(cors);

    let listener = TcpListener::bind(listen_address).await.map_err(Error::Bind)?;

    if let Some(sender) = bound_addr_sender {
        sender.send(listener.local_addr()?).expect("failed to send back bound address");
    }

    if llm_exposed {
        log::info!("gateway listening on http://{listen_address}");
    }

    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result.map_err(Error::Server)?;
        }
        _ = shutdown_signal.cancelled() => {
            log::info!("received shutdown signal, shutting down gracefully...");
        }
    }

    Ok(())
}

fn build_http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder().build().map_err(|err| anyhow!("failed to build upstream HTTP client: {err}"))
}
