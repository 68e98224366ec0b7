//! Liveness endpoint for process supervisors
//!
//! A single `GET /` route answering with a static body. It shares nothing
//! with the pipeline and runs as its own task.

use crate::error::{BgRemovalError, Result};
use axum::{routing::get, Router};
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;
use tracing::info;

/// Body returned by the health route
pub const HEALTH_BODY: &str = "Bot is running";

async fn health() -> &'static str {
    HEALTH_BODY
}

/// Build the health router
pub fn router() -> Router {
    Router::new().route("/", get(health))
}

/// Bind the health listener on `0.0.0.0:port`
///
/// # Errors
/// Returns [`BgRemovalError::Config`] when the port cannot be bound.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    TcpListener::bind(addr)
        .await
        .map_err(|e| BgRemovalError::config(format!("Cannot bind health endpoint on {addr}: {e}")))
}

/// Serve the health router on an already bound listener until `shutdown` resolves
///
/// # Errors
/// - the server fails while running
pub async fn serve_on<F>(listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Health endpoint listening");
    }
    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(BgRemovalError::from)
}

/// Bind `0.0.0.0:port` and serve until `shutdown` resolves
///
/// # Errors
/// - the port cannot be bound
/// - the server fails while running
pub async fn serve<F>(port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = bind(port).await?;
    serve_on(listener, shutdown).await
}
