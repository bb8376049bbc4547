use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TaskforgeError};

/// A registered, immutable unit of user code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub id: String,
    pub name: String,
    pub language: String,
    pub code: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl Function {
    pub fn new(name: String, language: String, code: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            language,
            code,
            created_at: Utc::now(),
        }
    }
}

/// Stored lifecycle state of an execution.
///
/// `Completed` is terminal and covers both successful and failed runs; a
/// failure is visible only through a non-empty `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocation of a [`Function`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub function_id: String,
    pub status: ExecutionStatus,
    pub output: Vec<u8>,
    pub error: String,
    pub assigned_worker: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    pub fn new(function_id: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            function_id,
            status: ExecutionStatus::Pending,
            output: Vec::new(),
            error: String::new(),
            assigned_worker: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// PENDING -> RUNNING, recording the worker it was handed to.
    pub fn mark_running(&mut self, worker_id: &str) -> Result<()> {
        if self.status != ExecutionStatus::Pending {
            return Err(self.transition_error(ExecutionStatus::Running));
        }
        self.status = ExecutionStatus::Running;
        self.assigned_worker = Some(worker_id.to_string());
        Ok(())
    }

    /// Apply a worker's result. The success flag does not influence the
    /// status; failures carry their message in `error`.
    pub fn complete(&mut self, output: Vec<u8>, error: String) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.transition_error(ExecutionStatus::Completed));
        }
        self.status = ExecutionStatus::Completed;
        self.output = output;
        self.error = error;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_failed(&self) -> bool {
        self.status == ExecutionStatus::Completed && !self.error.is_empty()
    }

    fn transition_error(&self, to: ExecutionStatus) -> TaskforgeError {
        TaskforgeError::InvalidTransition {
            execution_id: self.id.clone(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

/// What a status query reports. `NotFound` is never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusView {
    Found(Execution),
    NotFound,
}

impl StatusView {
    pub fn status_str(&self) -> &'static str {
        match self {
            StatusView::Found(execution) => execution.status.as_str(),
            StatusView::NotFound => "NOT_FOUND",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_execution_is_pending() {
        let execution = Execution::new("f1".to_string());
        assert_eq!(execution.status, ExecutionStatus::Pending);
        assert_eq!(execution.function_id, "f1");
        assert!(execution.output.is_empty());
        assert!(execution.error.is_empty());
        assert!(execution.assigned_worker.is_none());
        assert!(execution.completed_at.is_none());
    }

    #[test]
    fn running_requires_pending() {
        let mut execution = Execution::new("f1".to_string());
        execution.mark_running("w1").unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert_eq!(execution.assigned_worker.as_deref(), Some("w1"));

        let err = execution.mark_running("w2").unwrap_err();
        assert!(matches!(err, TaskforgeError::InvalidTransition { .. }));
        assert_eq!(execution.assigned_worker.as_deref(), Some("w1"));
    }

    #[test]
    fn failure_still_completes() {
        let mut execution = Execution::new("f1".to_string());
        execution.mark_running("w1").unwrap();
        execution.complete(Vec::new(), "boom".to_string()).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.error, "boom");
        assert!(execution.is_failed());
        assert!(execution.completed_at.is_some());
    }

    #[test]
    fn completed_is_terminal() {
        let mut execution = Execution::new("f1".to_string());
        execution.complete(b"first".to_vec(), String::new()).unwrap();
        assert!(execution.complete(b"second".to_vec(), String::new()).is_err());
        assert!(execution.mark_running("w1").is_err());
        assert_eq!(execution.output, b"first");
        assert!(!execution.is_failed());
    }

    #[test]
    fn status_serializes_upper_case() {
        let json = serde_json::to_string(&ExecutionStatus::Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
        assert_eq!(StatusView::NotFound.status_str(), "NOT_FOUND");
    }
}
