use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

use crate::proto::worker_service_server::WorkerService;
use crate::proto::{SchedulerMessage, WorkerMessage};
use crate::scheduler::{run_session, Dispatcher, WorkerSession};

/// gRPC service accepting worker sessions.
pub struct WorkerSessionService {
    dispatcher: Arc<Dispatcher>,
    session_buffer: usize,
    shutdown: CancellationToken,
}

impl WorkerSessionService {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        session_buffer: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            session_buffer,
            shutdown,
        }
    }
}

#[tonic::async_trait]
impl WorkerService for WorkerSessionService {
    type WorkerStreamStream = ReceiverStream<Result<SchedulerMessage, Status>>;

    async fn worker_stream(
        &self,
        request: Request<Streaming<WorkerMessage>>,
    ) -> Result<Response<Self::WorkerStreamStream>, Status> {
        let peer = request.remote_addr();
        let inbound = request.into_inner();

        let (tx, rx) = mpsc::channel(self.session_buffer);
        let session = WorkerSession::new(tx);
        tracing::debug!(session_id = %session.id(), peer = ?peer, "Worker stream accepted");

        let dispatcher = self.dispatcher.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            run_session(dispatcher, session, inbound, shutdown).await;
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
