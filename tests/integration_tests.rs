//! End-to-end tests over real gRPC connections on localhost.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tonic::Code;

use taskforge::config::{SchedulerConfig, WorkerConfig};
use taskforge::error::TaskforgeError;
use taskforge::grpc::GrpcServer;
use taskforge::node::SchedulerNode;
use taskforge::proto::scheduler_service_client::SchedulerServiceClient;
use taskforge::proto::{
    ExecutionStatus, GetExecutionStatusRequest, GetExecutionStatusResponse, GetFunctionRequest,
    ListWorkersRequest, RegisterFunctionRequest, TriggerExecutionRequest,
};
use taskforge::scheduler::Dispatcher;
use taskforge::store::{ExecutionStore, FileStore, MemoryStore};
use taskforge::worker::{EchoRunner, WorkerAgent};

struct TestScheduler {
    endpoint: String,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
}

async fn start_scheduler(store: Arc<dyn ExecutionStore>) -> TestScheduler {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let node = SchedulerNode::with_store(SchedulerConfig::new(addr), store);
    let dispatcher = node.dispatcher.clone();
    let shutdown = CancellationToken::new();

    let server = GrpcServer::new(addr, dispatcher.clone(), node.config.session_buffer);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        server.serve(listener, server_shutdown).await.unwrap();
    });

    TestScheduler {
        endpoint: format!("http://{}", addr),
        dispatcher,
        shutdown,
    }
}

async fn client(endpoint: &str) -> SchedulerServiceClient<Channel> {
    for _ in 0..50 {
        if let Ok(client) = SchedulerServiceClient::connect(endpoint.to_string()).await {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("scheduler at {endpoint} never came up");
}

fn start_worker(endpoint: &str, worker_id: &str, shutdown: CancellationToken) {
    start_slow_worker(endpoint, worker_id, Duration::ZERO, shutdown);
}

fn start_slow_worker(endpoint: &str, worker_id: &str, delay: Duration, shutdown: CancellationToken) {
    let config = WorkerConfig::new(worker_id, endpoint)
        .with_pool_size(4)
        .with_heartbeat_interval_ms(50);
    let runner = Arc::new(EchoRunner::new(worker_id, delay));
    tokio::spawn(async move {
        let _ = WorkerAgent::new(config, runner).run(shutdown).await;
    });
}

async fn wait_for_workers(client: &mut SchedulerServiceClient<Channel>, count: usize) {
    for _ in 0..250 {
        let workers = client
            .list_workers(ListWorkersRequest {})
            .await
            .unwrap()
            .into_inner()
            .workers;
        if workers.len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {count} workers to register");
}

async fn wait_for_completion(
    client: &mut SchedulerServiceClient<Channel>,
    execution_id: &str,
) -> GetExecutionStatusResponse {
    for _ in 0..250 {
        let response = client
            .get_execution_status(GetExecutionStatusRequest {
                execution_id: execution_id.to_string(),
            })
            .await
            .unwrap()
            .into_inner();
        if response.status == ExecutionStatus::Completed as i32 {
            return response;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("execution {execution_id} never completed");
}

#[tokio::test]
async fn test_register_trigger_complete() {
    let scheduler = start_scheduler(Arc::new(MemoryStore::new())).await;
    let mut client = client(&scheduler.endpoint).await;
    start_worker(&scheduler.endpoint, "worker-1", scheduler.shutdown.clone());
    wait_for_workers(&mut client, 1).await;

    let function_id = client
        .register_function(RegisterFunctionRequest {
            name: "greet".to_string(),
            language: "python".to_string(),
            code: b"print('hi')".to_vec(),
        })
        .await
        .unwrap()
        .into_inner()
        .function_id;

    let function = client
        .get_function(GetFunctionRequest {
            function_id: function_id.clone(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(function.name, "greet");
    assert_eq!(function.code, b"print('hi')");

    let triggered = client
        .trigger_execution(TriggerExecutionRequest {
            function_id: function_id.clone(),
            payload: br#"{"name":"ada"}"#.to_vec(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(triggered.status, "ACCEPTED");

    let status = wait_for_completion(&mut client, &triggered.execution_id).await;
    assert!(status.error.is_empty());
    assert_eq!(status.function_id, function_id);
    assert_eq!(status.assigned_worker, "worker-1");
    assert!(status.completed_at_ms.is_some());
    let output: serde_json::Value = serde_json::from_slice(&status.output).unwrap();
    assert_eq!(output["worker"], "worker-1");
    assert_eq!(output["input"]["name"], "ada");

    scheduler.shutdown.cancel();
}

#[tokio::test]
async fn test_trigger_without_workers_is_unavailable() {
    let scheduler = start_scheduler(Arc::new(MemoryStore::new())).await;
    let mut client = client(&scheduler.endpoint).await;

    let status = client
        .trigger_execution(TriggerExecutionRequest {
            function_id: "f1".to_string(),
            payload: b"{}".to_vec(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);
    assert!(status.message().contains("No workers available"));

    scheduler.shutdown.cancel();
}

#[tokio::test]
async fn test_unknown_execution_is_not_found_status() {
    let scheduler = start_scheduler(Arc::new(MemoryStore::new())).await;
    let mut client = client(&scheduler.endpoint).await;

    let response = client
        .get_execution_status(GetExecutionStatusRequest {
            execution_id: "missing".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.status, ExecutionStatus::NotFound as i32);

    let err = client
        .get_function(GetFunctionRequest {
            function_id: "missing".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);

    scheduler.shutdown.cancel();
}

#[tokio::test]
async fn test_executions_spread_across_workers() {
    let scheduler = start_scheduler(Arc::new(MemoryStore::new())).await;
    let mut client = client(&scheduler.endpoint).await;
    let delay = Duration::from_millis(300);
    start_slow_worker(&scheduler.endpoint, "worker-a", delay, scheduler.shutdown.clone());
    start_slow_worker(&scheduler.endpoint, "worker-b", delay, scheduler.shutdown.clone());
    wait_for_workers(&mut client, 2).await;

    let mut ids = Vec::new();
    for _ in 0..6 {
        let triggered = client
            .trigger_execution(TriggerExecutionRequest {
                function_id: "f1".to_string(),
                payload: b"{}".to_vec(),
            })
            .await
            .unwrap()
            .into_inner();
        ids.push(triggered.execution_id);
    }

    let mut workers = Vec::new();
    for id in &ids {
        workers.push(wait_for_completion(&mut client, id).await.assigned_worker);
    }
    assert!(workers.iter().any(|w| w == "worker-a"));
    assert!(workers.iter().any(|w| w == "worker-b"));

    scheduler.shutdown.cancel();
}

#[tokio::test]
async fn test_worker_disconnect_removes_registration() {
    let scheduler = start_scheduler(Arc::new(MemoryStore::new())).await;
    let mut client = client(&scheduler.endpoint).await;

    let worker_shutdown = CancellationToken::new();
    start_worker(&scheduler.endpoint, "worker-1", worker_shutdown.clone());
    wait_for_workers(&mut client, 1).await;

    worker_shutdown.cancel();
    wait_for_workers(&mut client, 0).await;
    assert!(scheduler.dispatcher.registry().is_empty().await);

    scheduler.shutdown.cancel();
}

#[tokio::test]
async fn test_file_store_keeps_results_across_restart() {
    let dir = tempfile::tempdir().unwrap();

    let execution_id = {
        let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
        let scheduler = start_scheduler(store).await;
        let mut client = client(&scheduler.endpoint).await;
        start_worker(&scheduler.endpoint, "worker-1", scheduler.shutdown.clone());
        wait_for_workers(&mut client, 1).await;

        let triggered = client
            .trigger_execution(TriggerExecutionRequest {
                function_id: "f1".to_string(),
                payload: b"{}".to_vec(),
            })
            .await
            .unwrap()
            .into_inner();
        wait_for_completion(&mut client, &triggered.execution_id).await;
        scheduler.shutdown.cancel();
        triggered.execution_id
    };

    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let scheduler = start_scheduler(store).await;
    let mut client = client(&scheduler.endpoint).await;
    let status = wait_for_completion(&mut client, &execution_id).await;
    assert_eq!(status.assigned_worker, "worker-1");

    scheduler.shutdown.cancel();
}

#[tokio::test]
async fn test_zero_session_buffer_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(MemoryStore::new()),
        Arc::new(taskforge::scheduler::WorkerRegistry::new()),
    ));

    let outcome = GrpcServer::new(addr, dispatcher, 0)
        .serve(listener, CancellationToken::new())
        .await;
    assert!(matches!(outcome, Err(TaskforgeError::Config(_))));

    let node = SchedulerNode::new(SchedulerConfig::new(addr).with_session_buffer(0)).await;
    assert!(matches!(node, Err(TaskforgeError::Config(_))));
}
