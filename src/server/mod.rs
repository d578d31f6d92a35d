//! HTTP services
//!
//! Two independent axum services: browser uploads and server-side
//! recording control.

pub mod recording;
pub mod upload;

pub use recording::RecorderState;
pub use upload::UploadState;

use anyhow::Context;
use axum::Router;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;

/// Success body carrying only a message
#[derive(Debug, Serialize)]
pub(crate) struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}

impl MessageResponse {
    pub fn ok(message: &'static str) -> Self {
        Self {
            success: true,
            message,
        }
    }
}

/// The browser client is served from elsewhere during development
pub(crate) fn cors() -> CorsLayer {
    CorsLayer::permissive()
}

/// Bind `addr` and serve `router` until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown requested"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
