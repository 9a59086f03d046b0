//! Collector HTTP server.
//!
//! Serves the routes of [`http::create_http_router`] until the shared cancellation
//! token fires, then shuts down gracefully.

pub mod http;

use crate::core::{MetricsError, Result, Signer};
use crate::service::MetricsService;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// HTTP receiver of metric samples.
pub struct MetricsReceiver {
    service: MetricsService,
    signer: Option<Signer>,
    listener: TcpListener,
}

impl MetricsReceiver {
    /// Binds the listen address. Port `0` picks a free port.
    pub async fn bind(
        address: &str,
        service: MetricsService,
        signer: Option<Signer>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address).await.map_err(|e| {
            MetricsError::network(format!("Failed to bind HTTP server to {}: {}", address, e))
        })?;

        Ok(Self {
            service,
            signer,
            listener,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        let signing = self.signer.is_some();
        let app = http::create_http_router(self.service, self.signer);

        tracing::info!(%addr, signing, "Collector listening");

        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| MetricsError::network(format!("HTTP server error: {}", e)))?;

        tracing::info!("Collector stopped");
        Ok(())
    }
}
