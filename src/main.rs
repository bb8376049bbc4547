use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::Channel;
use tracing_subscriber::EnvFilter;

use taskforge::config::{SandboxConfig, SchedulerConfig, WorkerConfig};
use taskforge::grpc::client_service::status_name;
use taskforge::node::SchedulerNode;
use taskforge::proto::scheduler_service_client::SchedulerServiceClient;
use taskforge::proto::{
    GetExecutionStatusRequest, GetFunctionRequest, ListWorkersRequest, RegisterFunctionRequest,
    TriggerExecutionRequest,
};
use taskforge::shutdown::install_shutdown_handler;
use taskforge::worker::{EchoRunner, FunctionRunner, SandboxRunner, WorkerAgent};

#[derive(Parser, Debug)]
#[command(name = "taskforge")]
#[command(version)]
#[command(about = "A distributed function execution scheduler")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the scheduler
    Scheduler(SchedulerArgs),

    /// Start a worker and connect it to a scheduler
    Worker(WorkerArgs),

    /// Function management commands
    Function {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: FunctionCommands,
    },

    /// Execution commands
    Execution {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: ExecutionCommands,
    },

    /// List connected workers and their load
    Workers {
        #[command(flatten)]
        client: ClientArgs,
    },
}

// =============================================================================
// Scheduler Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct SchedulerArgs {
    /// Port to listen on for gRPC
    #[arg(long, default_value = "50051")]
    port: u16,

    /// Port for the HTTP gateway (optional)
    #[arg(long)]
    gateway_port: Option<u16>,

    /// Directory for persisted functions and executions (in memory if unset)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Outbound message buffer per worker session
    #[arg(long, default_value = "64")]
    session_buffer: usize,
}

// =============================================================================
// Worker Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct WorkerArgs {
    /// Worker ID (unique identifier for this worker)
    #[arg(long, default_value = "worker-1")]
    id: String,

    /// Scheduler address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:50051")]
    scheduler: String,

    /// Number of concurrent executors
    #[arg(long, default_value = "4")]
    pool_size: usize,

    /// Capacity of the local job queue
    #[arg(long, default_value = "100")]
    queue_capacity: usize,

    /// Heartbeat interval in milliseconds
    #[arg(long, default_value = "2000")]
    heartbeat_ms: u64,

    /// How functions are executed
    #[arg(long, default_value = "echo")]
    runner: RunnerKind,

    /// Simulated work time for the echo runner, in milliseconds
    #[arg(long, default_value = "1000")]
    echo_delay_ms: u64,

    /// Docker image for the sandbox runner
    #[arg(long, default_value = "alpine:latest")]
    image: String,

    /// Shell command run inside the sandbox container
    #[arg(long)]
    command: Option<String>,
}

#[derive(Debug, Clone, ValueEnum)]
enum RunnerKind {
    Echo,
    Sandbox,
}

// =============================================================================
// Client Arguments (shared by function, execution and workers commands)
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Scheduler address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:50051")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum FunctionCommands {
    /// Register a function
    Register {
        /// Function name
        #[arg(long)]
        name: String,

        /// Language label stored with the function
        #[arg(long, default_value = "shell")]
        language: String,

        /// Inline source code
        #[arg(long, conflicts_with = "file")]
        code: Option<String>,

        /// Read source code from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Show a registered function
    Get {
        /// The function ID (UUID)
        function_id: String,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ExecutionCommands {
    /// Trigger an execution of a function
    Trigger {
        /// The function ID (UUID)
        function_id: String,

        /// JSON payload handed to the function
        #[arg(long, short = 'p', default_value = "{}")]
        payload: String,
    },
    /// Get status of an execution
    Status {
        /// The execution ID (UUID)
        execution_id: String,
    },
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct FunctionRegisterOutput {
    function_id: String,
}

#[derive(Serialize)]
struct FunctionOutput {
    function_id: String,
    name: String,
    language: String,
    code: String,
    created_at_ms: i64,
}

#[derive(Serialize)]
struct TriggerOutput {
    execution_id: String,
    status: String,
}

#[derive(Serialize)]
struct ExecutionStatusOutput {
    execution_id: String,
    status: String,
    output: String,
    error: String,
    function_id: String,
    assigned_worker: String,
    created_at_ms: i64,
    completed_at_ms: Option<i64>,
}

#[derive(Serialize)]
struct WorkerOutput {
    worker_id: String,
    running_tasks: u32,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn create_client(addr: &str) -> Result<SchedulerServiceClient<Channel>, Box<dyn std::error::Error>> {
    let channel = Channel::from_shared(addr.to_string())?.connect().await?;
    Ok(SchedulerServiceClient::new(channel))
}

// =============================================================================
// Process Implementations
// =============================================================================

async fn run_scheduler(args: SchedulerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let mut config = SchedulerConfig::new(listen_addr).with_session_buffer(args.session_buffer);
    if let Some(port) = args.gateway_port {
        config = config.with_gateway(format!("0.0.0.0:{}", port).parse()?);
    }
    if let Some(dir) = args.data_dir {
        config = config.with_data_dir(dir);
    }

    tracing::info!(
        listen_addr = %config.listen_addr,
        gateway_addr = ?config.gateway_addr,
        data_dir = ?config.data_dir,
        "Starting taskforge scheduler"
    );

    let shutdown = install_shutdown_handler()?;
    let node = SchedulerNode::new(config).await?;
    node.run(shutdown).await?;

    Ok(())
}

async fn run_worker(args: WorkerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = WorkerConfig::new(args.id, args.scheduler)
        .with_pool_size(args.pool_size)
        .with_queue_capacity(args.queue_capacity)
        .with_heartbeat_interval_ms(args.heartbeat_ms);

    let runner: Arc<dyn FunctionRunner> = match args.runner {
        RunnerKind::Echo => Arc::new(EchoRunner::new(
            config.worker_id.clone(),
            Duration::from_millis(args.echo_delay_ms),
        )),
        RunnerKind::Sandbox => {
            let mut sandbox = SandboxConfig {
                image: args.image,
                ..SandboxConfig::default()
            };
            if let Some(command) = args.command {
                sandbox.command = command;
            }
            Arc::new(SandboxRunner::new(sandbox))
        }
    };

    tracing::info!(
        worker_id = %config.worker_id,
        scheduler = %config.scheduler_addr,
        pool_size = config.pool_size,
        runner = ?args.runner,
        "Starting taskforge worker"
    );

    let shutdown = install_shutdown_handler()?;
    WorkerAgent::new(config, runner).run(shutdown).await?;

    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_function_register(
    client: &mut SchedulerServiceClient<Channel>,
    name: String,
    language: String,
    code: Vec<u8>,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .register_function(RegisterFunctionRequest {
            name,
            language,
            code,
        })
        .await?
        .into_inner();

    match output_format {
        OutputFormat::Json => {
            let output = FunctionRegisterOutput {
                function_id: response.function_id,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Function registered successfully!");
            println!("Function ID: {}", response.function_id);
        }
    }
    Ok(())
}

async fn handle_function_get(
    client: &mut SchedulerServiceClient<Channel>,
    function_id: String,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .get_function(GetFunctionRequest { function_id })
        .await?
        .into_inner();
    let code = String::from_utf8_lossy(&response.code).into_owned();

    match output_format {
        OutputFormat::Json => {
            let output = FunctionOutput {
                function_id: response.function_id,
                name: response.name,
                language: response.language,
                code,
                created_at_ms: response.created_at_ms,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Function ID: {}", response.function_id);
            println!("Name:        {}", response.name);
            println!("Language:    {}", response.language);
            println!("Code:");
            for line in code.lines() {
                println!("  {}", line);
            }
        }
    }
    Ok(())
}

async fn handle_execution_trigger(
    client: &mut SchedulerServiceClient<Channel>,
    function_id: String,
    payload: String,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match client
        .trigger_execution(TriggerExecutionRequest {
            function_id,
            payload: payload.into_bytes(),
        })
        .await
    {
        Ok(response) => {
            let resp = response.into_inner();
            match output_format {
                OutputFormat::Json => {
                    let output = TriggerOutput {
                        execution_id: resp.execution_id,
                        status: resp.status,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Table => {
                    println!("Execution {}", resp.status.to_lowercase());
                    println!("Execution ID: {}", resp.execution_id);
                }
            }
        }
        Err(status) if status.code() == tonic::Code::Unavailable => {
            eprintln!("Error: {}", status.message());
            eprintln!("Hint: start a worker with `taskforge worker --scheduler <addr>`");
            std::process::exit(1);
        }
        Err(status) => {
            eprintln!("Error: Trigger failed: {}", status.message());
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn handle_execution_status(
    client: &mut SchedulerServiceClient<Channel>,
    execution_id: String,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .get_execution_status(GetExecutionStatusRequest {
            execution_id: execution_id.clone(),
        })
        .await?
        .into_inner();
    let output = String::from_utf8_lossy(&response.output).into_owned();

    match output_format {
        OutputFormat::Json => {
            let out = ExecutionStatusOutput {
                execution_id,
                status: status_name(response.status).to_string(),
                output,
                error: response.error,
                function_id: response.function_id,
                assigned_worker: response.assigned_worker,
                created_at_ms: response.created_at_ms,
                completed_at_ms: response.completed_at_ms,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            println!("Execution ID:    {}", execution_id);
            println!("Status:          {}", status_name(response.status));
            if !response.function_id.is_empty() {
                println!("Function ID:     {}", response.function_id);
            }
            if !response.assigned_worker.is_empty() {
                println!("Assigned Worker: {}", response.assigned_worker);
            }
            if !output.is_empty() {
                println!("Output:");
                for line in output.lines() {
                    println!("  {}", line);
                }
            }
            if !response.error.is_empty() {
                println!("Error:");
                for line in response.error.lines() {
                    println!("  {}", line);
                }
            }
        }
    }
    Ok(())
}

async fn handle_workers(
    client: &mut SchedulerServiceClient<Channel>,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .list_workers(ListWorkersRequest {})
        .await?
        .into_inner();

    match output_format {
        OutputFormat::Json => {
            let output: Vec<WorkerOutput> = response
                .workers
                .into_iter()
                .map(|w| WorkerOutput {
                    worker_id: w.worker_id,
                    running_tasks: w.running_tasks,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if response.workers.is_empty() {
                println!("No workers connected.");
            } else {
                println!("{:<30} RUNNING", "WORKER ID");
                println!("{}", "-".repeat(40));
                for worker in response.workers {
                    println!("{:<30} {}", worker.worker_id, worker.running_tasks);
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Scheduler(scheduler_args) => {
            run_scheduler(scheduler_args).await?;
        }
        Commands::Worker(worker_args) => {
            run_worker(worker_args).await?;
        }
        Commands::Function { client, command } => {
            let mut grpc_client = create_client(&client.addr).await?;

            match command {
                FunctionCommands::Register {
                    name,
                    language,
                    code,
                    file,
                } => {
                    let code = match (code, file) {
                        (Some(code), _) => code.into_bytes(),
                        (None, Some(path)) => tokio::fs::read(path).await?,
                        (None, None) => return Err("one of --code or --file is required".into()),
                    };
                    handle_function_register(&mut grpc_client, name, language, code, &client.output)
                        .await?;
                }
                FunctionCommands::Get { function_id } => {
                    handle_function_get(&mut grpc_client, function_id, &client.output).await?;
                }
            }
        }
        Commands::Execution { client, command } => {
            let mut grpc_client = create_client(&client.addr).await?;

            match command {
                ExecutionCommands::Trigger {
                    function_id,
                    payload,
                } => {
                    handle_execution_trigger(&mut grpc_client, function_id, payload, &client.output)
                        .await?;
                }
                ExecutionCommands::Status { execution_id } => {
                    handle_execution_status(&mut grpc_client, execution_id, &client.output).await?;
                }
            }
        }
        Commands::Workers { client } => {
            let mut grpc_client = create_client(&client.addr).await?;
            handle_workers(&mut grpc_client, &client.output).await?;
        }
    }

    Ok(())
}
