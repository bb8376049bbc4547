use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::config::validate_session_buffer;
use crate::grpc::client_service::ClientService;
use crate::grpc::worker_service::WorkerSessionService;
use crate::proto::scheduler_service_server::SchedulerServiceServer;
use crate::proto::worker_service_server::WorkerServiceServer;
use crate::scheduler::Dispatcher;

pub struct GrpcServer {
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    session_buffer: usize,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, dispatcher: Arc<Dispatcher>, session_buffer: usize) -> Self {
        Self {
            addr,
            dispatcher,
            session_buffer,
        }
    }

    /// Bind the configured address and serve until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> crate::error::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` fires.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> crate::error::Result<()> {
        validate_session_buffer(self.session_buffer)?;

        let client_service = ClientService::new(self.dispatcher.clone());
        let worker_service =
            WorkerSessionService::new(self.dispatcher, self.session_buffer, shutdown.clone());

        tracing::info!(addr = ?listener.local_addr().ok(), "Starting gRPC server");

        Server::builder()
            .add_service(SchedulerServiceServer::new(client_service))
            .add_service(WorkerServiceServer::new(worker_service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown.cancelled_owned())
            .await?;

        tracing::info!("gRPC server stopped");
        Ok(())
    }
}
