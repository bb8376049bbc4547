use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::Status;

use crate::config::WorkerConfig;
use crate::error::{Result, TaskforgeError};
use crate::proto::scheduler_message;
use crate::proto::worker_message::Message;
use crate::proto::worker_service_client::WorkerServiceClient;
use crate::proto::{SchedulerMessage, WorkerHello, WorkerMessage};
use crate::worker::executor::FunctionRunner;
use crate::worker::heartbeat::HeartbeatReporter;
use crate::worker::pool::{ExecutorPool, Job, LoadCounter};

/// Worker process side of a scheduler session.
pub struct WorkerAgent {
    config: WorkerConfig,
    runner: Arc<dyn FunctionRunner>,
    load: LoadCounter,
}

impl WorkerAgent {
    pub fn new(config: WorkerConfig, runner: Arc<dyn FunctionRunner>) -> Self {
        Self {
            config,
            runner,
            load: LoadCounter::new(),
        }
    }

    pub fn load(&self) -> LoadCounter {
        self.load.clone()
    }

    /// Connect to the scheduler, announce this worker and serve the session.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        self.config.validate()?;

        let mut client = WorkerServiceClient::connect(self.config.scheduler_addr.clone()).await?;
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        tx.send(hello(&self.config.worker_id))
            .await
            .map_err(|_| TaskforgeError::SessionClosed)?;

        let inbound = client
            .worker_stream(ReceiverStream::new(rx))
            .await?
            .into_inner();
        tracing::info!(
            worker_id = %self.config.worker_id,
            scheduler = %self.config.scheduler_addr,
            "Worker connected to scheduler"
        );

        self.serve(tx, inbound, shutdown).await
    }

    /// Serve an established session.
    ///
    /// The receive loop is the only producer into the job queue and waits
    /// while the queue is full. Returns when the session ends (an error) or
    /// on shutdown; either way queued jobs are finished first.
    pub async fn serve<S>(
        self,
        outbound: mpsc::Sender<WorkerMessage>,
        mut inbound: S,
        shutdown: CancellationToken,
    ) -> Result<()>
    where
        S: Stream<Item = std::result::Result<SchedulerMessage, Status>> + Unpin,
    {
        let worker_id = self.config.worker_id.clone();

        let reporter = HeartbeatReporter::new(
            worker_id.clone(),
            self.config.heartbeat_interval_ms,
            self.load.clone(),
        );
        let heartbeat = tokio::spawn(reporter.run(outbound.clone()));

        let (jobs, pool) = ExecutorPool::spawn(
            self.config.pool_size,
            self.config.queue_capacity,
            self.runner.clone(),
            self.load.clone(),
        );
        tracing::info!(worker_id = %worker_id, executors = pool.size(), "Executor pool started");

        let outcome = loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(worker_id = %worker_id, "Shutdown requested, draining jobs");
                    break Ok(());
                }
                next = inbound.next() => next,
            };

            match next {
                Some(Ok(message)) => match message.message {
                    Some(scheduler_message::Message::Execute(request)) => {
                        tracing::debug!(execution_id = %request.execution_id, "Job received");
                        let job = Job {
                            request,
                            results: outbound.clone(),
                        };
                        if jobs.send(job).await.is_err() {
                            break Err(TaskforgeError::Internal("executor pool stopped".into()));
                        }
                    }
                    None => tracing::warn!(worker_id = %worker_id, "Ignoring empty scheduler message"),
                },
                Some(Err(status)) => {
                    tracing::error!(worker_id = %worker_id, error = %status, "Scheduler stream failed");
                    break Err(TaskforgeError::GrpcError(status));
                }
                None => {
                    tracing::error!(worker_id = %worker_id, "Scheduler closed stream");
                    break Err(TaskforgeError::SessionClosed);
                }
            }
        };

        drop(jobs);
        pool.join().await;
        heartbeat.abort();
        outcome
    }
}

fn hello(worker_id: &str) -> WorkerMessage {
    WorkerMessage {
        message: Some(Message::Hello(WorkerHello {
            worker_id: worker_id.to_string(),
        })),
    }
}
