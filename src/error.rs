use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskforgeError {
    #[error("No workers available (execution {execution_id} left pending)")]
    NoWorkersAvailable { execution_id: String },

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid status transition for execution {execution_id}: {from} -> {to}")]
    InvalidTransition {
        execution_id: String,
        from: String,
        to: String,
    },

    #[error("Worker session closed")]
    SessionClosed,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("gRPC error: {0}")]
    GrpcError(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, TaskforgeError>;

impl From<TaskforgeError> for tonic::Status {
    fn from(err: TaskforgeError) -> Self {
        match err {
            TaskforgeError::NoWorkersAvailable { .. } => tonic::Status::unavailable(err.to_string()),
            TaskforgeError::FunctionNotFound(_) => tonic::Status::not_found(err.to_string()),
            TaskforgeError::InvalidArgument(_) => tonic::Status::invalid_argument(err.to_string()),
            TaskforgeError::InvalidTransition { .. } => {
                tonic::Status::failed_precondition(err.to_string())
            }
            TaskforgeError::SessionClosed => tonic::Status::unavailable(err.to_string()),
            TaskforgeError::GrpcError(status) => status,
            other => tonic::Status::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn no_workers_maps_to_unavailable() {
        let status: tonic::Status = TaskforgeError::NoWorkersAvailable {
            execution_id: "e1".to_string(),
        }
        .into();
        assert_eq!(status.code(), Code::Unavailable);
        assert!(status.message().contains("No workers available"));
    }

    #[test]
    fn store_failure_maps_to_internal() {
        let status: tonic::Status = TaskforgeError::Store("disk full".to_string()).into();
        assert_eq!(status.code(), Code::Internal);
        assert!(status.message().contains("disk full"));
    }

    #[test]
    fn grpc_status_passes_through() {
        let status: tonic::Status =
            TaskforgeError::GrpcError(tonic::Status::permission_denied("nope")).into();
        assert_eq!(status.code(), Code::PermissionDenied);
        assert_eq!(status.message(), "nope");
    }
}
