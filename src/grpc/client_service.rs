use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::proto::scheduler_service_server::SchedulerService;
use crate::proto::{
    ExecutionStatus as ProtoExecutionStatus, GetExecutionStatusRequest,
    GetExecutionStatusResponse, GetFunctionRequest, GetFunctionResponse, ListWorkersRequest,
    ListWorkersResponse, RegisterFunctionRequest, RegisterFunctionResponse,
    TriggerExecutionRequest, TriggerExecutionResponse, WorkerInfo,
};
use crate::scheduler::{Dispatcher, ExecutionStatus, StatusView};

/// Status string returned by a successful trigger.
pub const ACCEPTED: &str = "ACCEPTED";

/// gRPC service for client-facing API
pub struct ClientService {
    dispatcher: Arc<Dispatcher>,
}

impl ClientService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[tonic::async_trait]
impl SchedulerService for ClientService {
    async fn register_function(
        &self,
        request: Request<RegisterFunctionRequest>,
    ) -> Result<Response<RegisterFunctionResponse>, Status> {
        let req = request.into_inner();
        let function = self
            .dispatcher
            .register_function(req.name, req.language, req.code)
            .await?;

        Ok(Response::new(RegisterFunctionResponse {
            function_id: function.id,
        }))
    }

    async fn get_function(
        &self,
        request: Request<GetFunctionRequest>,
    ) -> Result<Response<GetFunctionResponse>, Status> {
        let req = request.into_inner();
        let function = self.dispatcher.get_function(&req.function_id).await?;

        Ok(Response::new(GetFunctionResponse {
            function_id: function.id,
            name: function.name,
            language: function.language,
            code: function.code,
            created_at_ms: function.created_at.timestamp_millis(),
        }))
    }

    async fn trigger_execution(
        &self,
        request: Request<TriggerExecutionRequest>,
    ) -> Result<Response<TriggerExecutionResponse>, Status> {
        let req = request.into_inner();
        let execution = self
            .dispatcher
            .trigger_execution(&req.function_id, req.payload)
            .await?;

        Ok(Response::new(TriggerExecutionResponse {
            execution_id: execution.id,
            status: ACCEPTED.to_string(),
        }))
    }

    async fn get_execution_status(
        &self,
        request: Request<GetExecutionStatusRequest>,
    ) -> Result<Response<GetExecutionStatusResponse>, Status> {
        let req = request.into_inner();

        let response = match self
            .dispatcher
            .get_execution_status(&req.execution_id)
            .await?
        {
            StatusView::Found(execution) => GetExecutionStatusResponse {
                status: status_to_proto(&execution.status) as i32,
                output: execution.output,
                error: execution.error,
                function_id: execution.function_id,
                assigned_worker: execution.assigned_worker.unwrap_or_default(),
                created_at_ms: execution.created_at.timestamp_millis(),
                completed_at_ms: execution.completed_at.map(|dt| dt.timestamp_millis()),
            },
            StatusView::NotFound => GetExecutionStatusResponse {
                status: ProtoExecutionStatus::NotFound as i32,
                ..Default::default()
            },
        };

        Ok(Response::new(response))
    }

    async fn list_workers(
        &self,
        _request: Request<ListWorkersRequest>,
    ) -> Result<Response<ListWorkersResponse>, Status> {
        let workers = self
            .dispatcher
            .registry()
            .snapshot()
            .await
            .into_iter()
            .map(|w| WorkerInfo {
                worker_id: w.worker_id,
                running_tasks: w.running_tasks,
            })
            .collect();

        Ok(Response::new(ListWorkersResponse { workers }))
    }
}

pub fn status_to_proto(status: &ExecutionStatus) -> ProtoExecutionStatus {
    match status {
        ExecutionStatus::Pending => ProtoExecutionStatus::Pending,
        ExecutionStatus::Running => ProtoExecutionStatus::Running,
        ExecutionStatus::Completed => ProtoExecutionStatus::Completed,
    }
}

/// Wire status as the upper-case name clients print.
pub fn status_name(status: i32) -> &'static str {
    match ProtoExecutionStatus::try_from(status) {
        Ok(ProtoExecutionStatus::Pending) => "PENDING",
        Ok(ProtoExecutionStatus::Running) => "RUNNING",
        Ok(ProtoExecutionStatus::Completed) => "COMPLETED",
        Ok(ProtoExecutionStatus::NotFound) => "NOT_FOUND",
        _ => "UNKNOWN",
    }
}
