use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::gateway::{run_gateway, GatewayState};
use crate::grpc::GrpcServer;
use crate::scheduler::{Dispatcher, WorkerRegistry};
use crate::store::{ExecutionStore, FileStore, MemoryStore};

/// Scheduler process: store, registry, dispatcher and the servers on top.
pub struct SchedulerNode {
    pub config: SchedulerConfig,
    pub dispatcher: Arc<Dispatcher>,
}

impl SchedulerNode {
    /// Build the node, opening the file store when a data dir is configured.
    pub async fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn ExecutionStore> = match &config.data_dir {
            Some(dir) => Arc::new(FileStore::open(dir).await?),
            None => {
                tracing::warn!("No data dir configured, records are kept in memory only");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: SchedulerConfig, store: Arc<dyn ExecutionStore>) -> Self {
        let registry = Arc::new(WorkerRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(store, registry));
        Self { config, dispatcher }
    }

    /// Run the node until `shutdown` fires.
    ///
    /// 1. Spawns the HTTP gateway if configured
    /// 2. Runs the gRPC server carrying client calls and worker sessions (blocking)
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        if let Some(gateway_addr) = self.config.gateway_addr {
            let state = GatewayState {
                dispatcher: self.dispatcher.clone(),
            };
            let gateway_shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_gateway(gateway_addr, state, gateway_shutdown).await;
            });
        }

        let server = GrpcServer::new(
            self.config.listen_addr,
            self.dispatcher.clone(),
            self.config.session_buffer,
        );
        server.run(shutdown).await
    }
}
