//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to services. It
//! provides the router construction and server startup functionality.

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::bootstrap::BootstrappedServices;

pub mod http;
pub mod response;
pub mod ws;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state threaded through every handler. Cheap to clone:
/// it's just the bootstrap handle.
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<BootstrappedServices>,
}

impl AppState {
    pub fn new(services: Arc<BootstrappedServices>) -> Self {
        Self { services }
    }
}

/// Binds `state.services.config.bind_port` and serves the combined
/// REST/WebSocket router until the returned future is dropped or aborted by
/// the caller during shutdown.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let port = state.services.config.bind_port;
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}");

    let router = http::create_router(state);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}
