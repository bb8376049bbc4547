use std::process::Stdio;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::process::Command;

use crate::config::SandboxConfig;
use crate::proto::ExecutionRequest;
use crate::worker::payload::{decode_payload, Bundle};

/// Why a function run failed. The display text is what the scheduler stores
/// as the execution's error.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("{0}")]
    Failed(String),

    #[error("failed to launch runner: {0}")]
    Launch(#[from] std::io::Error),

    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One function invocation as seen by a runner.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub execution_id: String,
    pub function_id: String,
    pub input: Bundle,
}

impl Invocation {
    pub fn from_request(request: &ExecutionRequest) -> Self {
        Self {
            execution_id: request.execution_id.clone(),
            function_id: request.function_id.clone(),
            input: decode_payload(&request.payload),
        }
    }
}

/// Executes function invocations on a worker.
#[tonic::async_trait]
pub trait FunctionRunner: Send + Sync {
    async fn run(&self, invocation: Invocation) -> Result<Vec<u8>, RunnerError>;
}

/// Reports its input back after a fixed delay.
#[derive(Debug, Clone)]
pub struct EchoRunner {
    worker_id: String,
    delay: Duration,
}

impl EchoRunner {
    pub fn new(worker_id: impl Into<String>, delay: Duration) -> Self {
        Self {
            worker_id: worker_id.into(),
            delay,
        }
    }
}

#[tonic::async_trait]
impl FunctionRunner for EchoRunner {
    async fn run(&self, invocation: Invocation) -> Result<Vec<u8>, RunnerError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let output = json!({
            "worker": self.worker_id,
            "message": "function executed successfully",
            "input": invocation.input,
        });
        Ok(serde_json::to_vec(&output)?)
    }
}

/// Runs the configured command in a sandboxed Docker container.
///
/// Every run gets:
/// - Network isolation (disabled by default)
/// - Dropped capabilities
/// - Read-only root filesystem
/// - Memory and CPU limits
///
/// The invocation reaches the container as `TASKFORGE_EXECUTION_ID`,
/// `TASKFORGE_FUNCTION_ID` and `TASKFORGE_INPUT` (the input as JSON).
#[derive(Debug, Clone)]
pub struct SandboxRunner {
    config: SandboxConfig,
}

impl SandboxRunner {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to `docker` for one invocation.
    pub fn docker_args(&self, invocation: &Invocation) -> Result<Vec<String>, RunnerError> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];

        if self.config.network_disabled {
            args.push("--network=none".to_string());
        }
        if let Some(ref limit) = self.config.memory_limit {
            args.push(format!("--memory={}", limit));
        }
        if let Some(ref limit) = self.config.cpu_limit {
            args.push(format!("--cpus={}", limit));
        }

        args.push("--cap-drop=ALL".to_string());
        args.push("--security-opt=no-new-privileges".to_string());
        args.push("--read-only".to_string());

        let input = serde_json::to_string(&invocation.input)?;
        for (key, value) in [
            ("TASKFORGE_EXECUTION_ID", invocation.execution_id.as_str()),
            ("TASKFORGE_FUNCTION_ID", invocation.function_id.as_str()),
            ("TASKFORGE_INPUT", input.as_str()),
        ] {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(self.config.image.clone());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(self.config.command.clone());
        Ok(args)
    }

    fn process_output(
        execution_id: &str,
        result: std::io::Result<std::process::Output>,
    ) -> Result<Vec<u8>, RunnerError> {
        let output = result.inspect_err(|e| {
            tracing::error!(execution_id, error = %e, "Sandbox launch failed");
        })?;
        let exit_code = output.status.code();

        if output.status.success() {
            tracing::info!(execution_id, exit_code = ?exit_code, "Sandbox run finished");
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::info!(execution_id, exit_code = ?exit_code, "Sandbox run failed");
        Err(RunnerError::Failed(if stderr.is_empty() {
            format!("Exit code: {:?}", exit_code)
        } else {
            stderr
        }))
    }
}

#[tonic::async_trait]
impl FunctionRunner for SandboxRunner {
    async fn run(&self, invocation: Invocation) -> Result<Vec<u8>, RunnerError> {
        let args = self.docker_args(&invocation)?;
        tracing::info!(
            execution_id = %invocation.execution_id,
            image = %self.config.image,
            "Executing function in sandbox"
        );

        let result = Command::new("docker")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        Self::process_output(&invocation.execution_id, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};

    fn invocation(payload: &[u8]) -> Invocation {
        Invocation::from_request(&ExecutionRequest {
            execution_id: "e1".to_string(),
            function_id: "f1".to_string(),
            payload: payload.to_vec(),
        })
    }

    fn output(code: i32, stdout: &str, stderr: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn echo_runner_wraps_input() {
        let runner = EchoRunner::new("worker-7", Duration::ZERO);
        let out = runner.run(invocation(br#"{"x":1}"#)).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["worker"], "worker-7");
        assert_eq!(value["message"], "function executed successfully");
        assert_eq!(value["input"]["x"], 1);
    }

    #[tokio::test]
    async fn echo_runner_tolerates_bad_payload() {
        let runner = EchoRunner::new("w", Duration::ZERO);
        let out = runner.run(invocation(b"garbage")).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["input"], serde_json::json!({}));
    }

    #[test]
    fn sandbox_args_are_locked_down() {
        let runner = SandboxRunner::new(SandboxConfig::default());
        let args = runner.docker_args(&invocation(br#"{"a":"b"}"#)).unwrap();

        assert_eq!(&args[..2], &["run", "--rm"]);
        assert!(args.contains(&"--network=none".to_string()));
        assert!(args.contains(&"--memory=256m".to_string()));
        assert!(args.contains(&"--cpus=0.5".to_string()));
        assert!(args.contains(&"--cap-drop=ALL".to_string()));
        assert!(args.contains(&"--read-only".to_string()));
        assert!(args.contains(&"TASKFORGE_EXECUTION_ID=e1".to_string()));
        assert!(args.contains(&r#"TASKFORGE_INPUT={"a":"b"}"#.to_string()));

        let tail = &args[args.len() - 4..];
        assert_eq!(tail[0], "alpine:latest");
        assert_eq!(tail[1], "sh");
        assert_eq!(tail[2], "-c");
    }

    #[test]
    fn sandbox_args_respect_config() {
        let runner = SandboxRunner::new(SandboxConfig {
            image: "python:3.12-slim".to_string(),
            command: "python -c 'print(1)'".to_string(),
            network_disabled: false,
            memory_limit: None,
            cpu_limit: None,
        });
        let args = runner.docker_args(&invocation(b"")).unwrap();
        assert!(!args.iter().any(|a| a.starts_with("--network")));
        assert!(!args.iter().any(|a| a.starts_with("--memory")));
        assert!(!args.iter().any(|a| a.starts_with("--cpus")));
        assert_eq!(args.last().unwrap(), "python -c 'print(1)'");
    }

    #[test]
    fn successful_exit_returns_stdout() {
        let out = SandboxRunner::process_output("e1", Ok(output(0, "hello\n", ""))).unwrap();
        assert_eq!(out, b"hello\n");
    }

    #[test]
    fn failure_prefers_stderr() {
        let err = SandboxRunner::process_output("e1", Ok(output(1, "", "boom\n"))).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn failure_without_stderr_reports_exit_code() {
        let err = SandboxRunner::process_output("e1", Ok(output(3, "", ""))).unwrap_err();
        assert_eq!(err.to_string(), "Exit code: Some(3)");
    }

    #[test]
    fn launch_error_is_reported() {
        let err = SandboxRunner::process_output(
            "e1",
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "docker missing")),
        )
        .unwrap_err();
        assert!(matches!(err, RunnerError::Launch(_)));
        assert!(err.to_string().contains("docker missing"));
    }
}
