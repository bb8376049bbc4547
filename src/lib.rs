pub mod config;
pub mod error;
pub mod gateway;
pub mod grpc;
pub mod node;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod worker;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("taskforge");
}
