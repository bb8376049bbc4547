use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::Status;
use uuid::Uuid;

use crate::error::{Result, TaskforgeError};
use crate::proto::scheduler_message;
use crate::proto::worker_message::Message;
use crate::proto::{ExecutionRequest, SchedulerMessage, WorkerMessage};
use crate::scheduler::dispatch::Dispatcher;

/// Outbound half of one worker session.
///
/// All writers (dispatch paths on any task) go through the same bounded
/// channel, which is drained by the transport in order. That channel is the
/// single point where concurrent sends to one session are serialized.
#[derive(Debug, Clone)]
pub struct WorkerSession {
    id: Uuid,
    tx: mpsc::Sender<std::result::Result<SchedulerMessage, Status>>,
}

impl WorkerSession {
    pub fn new(tx: mpsc::Sender<std::result::Result<SchedulerMessage, Status>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn send(&self, message: SchedulerMessage) -> Result<()> {
        self.tx
            .send(Ok(message))
            .await
            .map_err(|_| TaskforgeError::SessionClosed)
    }

    pub async fn execute(&self, request: ExecutionRequest) -> Result<()> {
        self.send(SchedulerMessage {
            message: Some(scheduler_message::Message::Execute(request)),
        })
        .await
    }
}

/// Drive one worker session until its inbound stream ends or fails, or
/// `shutdown` fires.
///
/// Messages are applied strictly in arrival order. When the loop ends, the
/// identity announced by the last Hello is removed from the registry
/// (unless a newer session has since claimed it). Returns that identity.
pub async fn run_session<S>(
    dispatcher: Arc<Dispatcher>,
    session: WorkerSession,
    mut inbound: S,
    shutdown: CancellationToken,
) -> Option<String>
where
    S: Stream<Item = std::result::Result<WorkerMessage, Status>> + Unpin,
{
    let registry = dispatcher.registry().clone();
    let mut worker_id: Option<String> = None;

    tracing::debug!(session_id = %session.id(), "Worker session opened");

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = inbound.next() => next,
        };
        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(status)) => {
                tracing::warn!(
                    worker_id = ?worker_id,
                    session_id = %session.id(),
                    error = %status,
                    "Worker session receive failed"
                );
                break;
            }
            None => break,
        };

        match message.message {
            Some(Message::Hello(hello)) => {
                if hello.worker_id.is_empty() {
                    tracing::warn!(session_id = %session.id(), "Ignoring Hello without worker id");
                    continue;
                }
                registry.register(&hello.worker_id, session.clone()).await;
                worker_id = Some(hello.worker_id);
            }
            Some(Message::Heartbeat(heartbeat)) => {
                tracing::debug!(
                    worker_id = %heartbeat.worker_id,
                    running_tasks = heartbeat.running_tasks,
                    "Heartbeat"
                );
                registry
                    .update_load(&heartbeat.worker_id, heartbeat.running_tasks)
                    .await;
            }
            Some(Message::Result(result)) => {
                let execution_id = result.execution_id.clone();
                let reporter = worker_id.as_deref().map(|id| (id, session.id()));
                if let Err(e) = dispatcher.apply_result(reporter, result).await {
                    tracing::error!(
                        execution_id = %execution_id,
                        error = %e,
                        "Failed to record execution result"
                    );
                }
            }
            None => {
                tracing::warn!(session_id = %session.id(), "Ignoring empty worker message");
            }
        }
    }

    tracing::info!(worker_id = ?worker_id, session_id = %session.id(), "Worker disconnected");
    if let Some(id) = worker_id.as_deref() {
        registry.deregister_session(id, session.id()).await;
    }
    worker_id
}
