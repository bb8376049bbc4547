use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::proto::worker_message::Message;
use crate::proto::{ExecutionRequest, ExecutionResult, WorkerMessage};
use crate::worker::executor::{FunctionRunner, Invocation};

/// Number of jobs currently executing on this worker.
///
/// Owned by the agent and shared by handle with each executor and the
/// heartbeat reporter.
#[derive(Debug, Clone, Default)]
pub struct LoadCounter(Arc<AtomicU32>);

impl LoadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    /// Count one job as running until the returned guard drops.
    pub fn track(&self) -> LoadGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        LoadGuard(self.clone())
    }
}

#[must_use]
#[derive(Debug)]
pub struct LoadGuard(LoadCounter);

impl Drop for LoadGuard {
    fn drop(&mut self) {
        (self.0).0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An execution request and the session it must be answered on.
#[derive(Debug)]
pub struct Job {
    pub request: ExecutionRequest,
    pub results: mpsc::Sender<WorkerMessage>,
}

/// Fixed set of executors draining a bounded job queue.
pub struct ExecutorPool {
    handles: Vec<JoinHandle<()>>,
}

impl ExecutorPool {
    /// Start `size` executors behind a queue of `capacity` jobs.
    ///
    /// Sending on the returned queue waits while it is full. Dropping every
    /// sender lets the executors finish what is queued and exit.
    pub fn spawn(
        size: usize,
        capacity: usize,
        runner: Arc<dyn FunctionRunner>,
        load: LoadCounter,
    ) -> (mpsc::Sender<Job>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..size)
            .map(|index| {
                let rx = rx.clone();
                let runner = runner.clone();
                let load = load.clone();
                tokio::spawn(async move {
                    executor_loop(index, rx, runner, load).await;
                })
            })
            .collect();

        (tx, Self { handles })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every executor to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Executor task failed");
            }
        }
    }
}

async fn executor_loop(
    index: usize,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    runner: Arc<dyn FunctionRunner>,
    load: LoadCounter,
) {
    tracing::debug!(executor = index, "Executor started");
    loop {
        // Hold the lock only while waiting for the next job.
        let job = jobs.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        run_job(index, job, runner.as_ref(), &load).await;
    }
    tracing::debug!(executor = index, "Executor stopped");
}

/// Execute one job and report its result on the job's session.
pub async fn run_job(index: usize, job: Job, runner: &dyn FunctionRunner, load: &LoadCounter) {
    let guard = load.track();
    let execution_id = job.request.execution_id.clone();
    tracing::info!(execution_id = %execution_id, executor = index, "Executing");

    let result = match runner.run(Invocation::from_request(&job.request)).await {
        Ok(output) => ExecutionResult {
            execution_id: execution_id.clone(),
            success: true,
            output,
            error: String::new(),
        },
        Err(e) => {
            tracing::warn!(execution_id = %execution_id, error = %e, "Execution failed");
            ExecutionResult {
                execution_id: execution_id.clone(),
                success: false,
                output: Vec::new(),
                error: e.to_string(),
            }
        }
    };

    let message = WorkerMessage {
        message: Some(Message::Result(result)),
    };
    if job.results.send(message).await.is_err() {
        tracing::warn!(execution_id = %execution_id, "Failed to send result, session closed");
    }
    drop(guard);
}
