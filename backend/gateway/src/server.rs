//! Main HTTP Gateway Server.

use std::net::SocketAddr;
use std::time::Instant;

use anyhow::Result;
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use chatrelay_agent::ConversationMailbox;
use chatrelay_channels::ChannelAdapter;

use crate::health_api;

/// Application state shared across gateway routes.
#[derive(Clone)]
pub struct GatewayState {
    pub mailbox: ConversationMailbox,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(mailbox: ConversationMailbox) -> Self {
        Self {
            mailbox,
            started_at: Instant::now(),
        }
    }
}

/// Gateway routes plus every adapter's webhook sub-router.
pub fn build_router(state: GatewayState, adapters: &[&dyn ChannelAdapter]) -> Router {
    let api = Router::new()
        .route("/api/health", get(health_api::get_health))
        .with_state(state);

    adapters
        .iter()
        .fold(api, |router, adapter| router.merge(adapter.build_router()))
        .layer(TraceLayer::new_for_http())
}

/// Serve `app` until Ctrl-C.
#[instrument(skip(app))]
pub async fn start_server(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Gateway HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
