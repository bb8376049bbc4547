use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Result, TaskforgeError};
use crate::proto::{ExecutionRequest, ExecutionResult};
use crate::scheduler::execution::{Execution, Function, StatusView};
use crate::scheduler::registry::WorkerRegistry;
use crate::store::ExecutionStore;

/// Client-facing operations and the execution state machine.
///
/// The registry and the store are updated independently; there is no
/// transaction spanning both.
pub struct Dispatcher {
    store: Arc<dyn ExecutionStore>,
    registry: Arc<WorkerRegistry>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn ExecutionStore>, registry: Arc<WorkerRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    pub async fn register_function(
        &self,
        name: String,
        language: String,
        code: Vec<u8>,
    ) -> Result<Function> {
        let function = Function::new(name, language, code);
        self.store.save_function(&function).await?;
        tracing::info!(function_id = %function.id, name = %function.name, "Function registered");
        Ok(function)
    }

    pub async fn get_function(&self, function_id: &str) -> Result<Function> {
        self.store
            .get_function(function_id)
            .await?
            .ok_or_else(|| TaskforgeError::FunctionNotFound(function_id.to_string()))
    }

    /// Create an execution and hand it to the least-loaded worker.
    ///
    /// The record is stored as PENDING before any worker is consulted. It
    /// turns RUNNING once a worker is picked and before Execute is sent, so
    /// a failed send leaves it RUNNING with nobody working on it.
    pub async fn trigger_execution(&self, function_id: &str, payload: Vec<u8>) -> Result<Execution> {
        let mut execution = Execution::new(function_id.to_string());
        self.store.save_execution(&execution).await?;

        let Some((worker_id, session)) = self.registry.select_for_dispatch().await else {
            tracing::warn!(execution_id = %execution.id, "No workers available, execution left pending");
            return Err(TaskforgeError::NoWorkersAvailable {
                execution_id: execution.id,
            });
        };

        execution.mark_running(&worker_id)?;
        self.store.save_execution(&execution).await?;

        session
            .execute(ExecutionRequest {
                execution_id: execution.id.clone(),
                function_id: execution.function_id.clone(),
                payload,
            })
            .await
            .inspect_err(|e| {
                tracing::error!(
                    execution_id = %execution.id,
                    worker_id = %worker_id,
                    error = %e,
                    "Failed to send execution to worker"
                );
            })?;

        tracing::info!(execution_id = %execution.id, worker_id = %worker_id, "Execution dispatched");
        Ok(execution)
    }

    pub async fn get_execution_status(&self, execution_id: &str) -> Result<StatusView> {
        Ok(match self.store.get_execution(execution_id).await? {
            Some(execution) => StatusView::Found(execution),
            None => StatusView::NotFound,
        })
    }

    /// Record a worker's result.
    ///
    /// The execution becomes COMPLETED whatever the success flag says. When
    /// the result is applied, the reporting worker's load drops by one
    /// (never below zero), provided `reporter` (worker id and session id)
    /// still owns that registry entry. Results for unknown or already
    /// completed executions are ignored. Returns whether the result was
    /// applied.
    pub async fn apply_result(
        &self,
        reporter: Option<(&str, Uuid)>,
        result: ExecutionResult,
    ) -> Result<bool> {
        let Some(mut execution) = self.store.get_execution(&result.execution_id).await? else {
            tracing::warn!(execution_id = %result.execution_id, "Result for unknown execution");
            return Ok(false);
        };

        if let Err(e) = execution.complete(result.output, result.error) {
            tracing::warn!(
                execution_id = %result.execution_id,
                error = %e,
                "Ignoring duplicate result"
            );
            return Ok(false);
        }
        self.store.save_execution(&execution).await?;

        if let Some((worker_id, session_id)) = reporter {
            self.registry.release_task(worker_id, session_id).await;
        }

        tracing::info!(
            execution_id = %execution.id,
            worker_id = ?reporter.map(|(id, _)| id),
            success = result.success,
            "Execution completed"
        );
        Ok(true)
    }
}
