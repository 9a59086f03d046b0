//! Wiring of the agent and collector processes.

use crate::core::{Config, Result, Signer};
use crate::export::{Dispatcher, HttpTransport};
use crate::metrics::Sampler;
use crate::receiver::MetricsReceiver;
use crate::service::MetricsService;
use crate::storage::{self, StorageHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Collector: storage backend, service and HTTP endpoints.
pub struct ServerApplication {
    receiver: MetricsReceiver,
    storage: StorageHandle,
    cancel: CancellationToken,
}

impl ServerApplication {
    /// Opens the configured backend and binds the listen address.
    pub async fn new(config: Config, cancel: CancellationToken) -> Result<Self> {
        let storage = storage::open_repository(&config.storage, &config.retry, &cancel).await?;
        let service = MetricsService::new(Arc::clone(&storage.repository));
        let signer = Signer::from_key(config.server.key.as_deref());

        let receiver = MetricsReceiver::bind(&config.server.address, service, signer).await?;

        tracing::info!(
            backend = ?config.storage.backend,
            store_interval = ?config.storage.store_interval,
            restore = config.storage.restore,
            "Collector initialised"
        );

        Ok(Self {
            receiver,
            storage,
            cancel,
        })
    }

    /// Address the collector listens on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.receiver.local_addr()
    }

    /// Serve until cancelled, then wait for the final snapshot flush.
    pub async fn run(self) -> Result<()> {
        let result = self.receiver.run(self.cancel.clone()).await;

        // The flusher only exits once cancelled, also stop it when serving failed.
        self.cancel.cancel();
        if let Some(flusher) = self.storage.flusher {
            flusher.await?;
        }

        result
    }
}

/// Agent: sampler feeding the dispatcher.
pub struct AgentApplication {
    sampler: Sampler,
    dispatcher: Dispatcher,
    poll_interval: std::time::Duration,
    cancel: CancellationToken,
}

impl AgentApplication {
    pub fn new(config: &Config, cancel: CancellationToken) -> Result<Self> {
        let transport =
            HttpTransport::new(&config.agent_base_url(), config.agent.request_timeout)?;
        tracing::info!(
            endpoint = transport.endpoint(),
            poll_interval = ?config.agent.poll_interval,
            report_interval = ?config.agent.report_interval,
            "Agent initialised"
        );

        let dispatcher = Dispatcher::new(
            Arc::new(transport),
            Signer::from_key(config.agent.key.as_deref()),
            config.agent.workers,
            config.agent.report_interval,
        );

        Ok(Self {
            sampler: Sampler::new(),
            dispatcher,
            poll_interval: config.agent.poll_interval,
            cancel,
        })
    }

    /// Run sampling and delivery until cancelled.
    pub async fn run(self) -> Result<()> {
        let (snapshots, sampler) = self.sampler.spawn(self.poll_interval, self.cancel.clone());
        let dispatcher = self.dispatcher.spawn(snapshots, self.cancel.clone());

        let (sampler, dispatcher) = tokio::join!(sampler, dispatcher);
        sampler?;
        dispatcher?;

        Ok(())
    }
}
