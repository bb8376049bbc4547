use std::net::SocketAddr;
use std::path::PathBuf;

/// Configuration for Docker-based function execution on a worker.
///
/// The sandboxed runner executes `command` inside the container with the
/// execution input exposed through environment variables.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Docker image to use for execution
    pub image: String,
    /// Shell command run inside the container
    pub command: String,
    /// Disable network access in container
    pub network_disabled: bool,
    /// Memory limit (e.g., "256m")
    pub memory_limit: Option<String>,
    /// CPU limit (e.g., "0.5" for half a CPU)
    pub cpu_limit: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "alpine:latest".to_string(),
            command: "echo \"$TASKFORGE_INPUT\"".to_string(),
            network_disabled: true,
            memory_limit: Some("256m".to_string()),
            cpu_limit: Some("0.5".to_string()),
        }
    }
}

/// Coordinator process configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub listen_addr: SocketAddr,
    /// HTTP gateway address; the gateway is disabled when unset.
    pub gateway_addr: Option<SocketAddr>,
    /// Directory for the file store; records stay in memory when unset.
    pub data_dir: Option<PathBuf>,
    /// Outbound buffer of each worker session.
    pub session_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 50051)),
            gateway_addr: None,
            data_dir: None,
            session_buffer: 64,
        }
    }
}

impl SchedulerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_gateway(mut self, addr: SocketAddr) -> Self {
        self.gateway_addr = Some(addr);
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_session_buffer(mut self, session_buffer: usize) -> Self {
        self.session_buffer = session_buffer;
        self
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        validate_session_buffer(self.session_buffer)
    }
}

/// Each worker session needs room for at least one outbound message.
pub(crate) fn validate_session_buffer(session_buffer: usize) -> crate::error::Result<()> {
    if session_buffer == 0 {
        return Err(crate::error::TaskforgeError::Config(
            "session buffer must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Worker process configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// Scheduler endpoint, e.g. `http://127.0.0.1:50051`
    pub scheduler_addr: String,
    /// Number of concurrent executors
    pub pool_size: usize,
    /// Capacity of the local job queue
    pub queue_capacity: usize,
    pub heartbeat_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker-1".to_string(),
            scheduler_addr: "http://127.0.0.1:50051".to_string(),
            pool_size: 4,
            queue_capacity: 100,
            heartbeat_interval_ms: 2000,
        }
    }
}

impl WorkerConfig {
    pub fn new(worker_id: impl Into<String>, scheduler_addr: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            scheduler_addr: scheduler_addr.into(),
            ..Default::default()
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self
    }

    /// Reject settings the agent cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::TaskforgeError;

        if self.worker_id.trim().is_empty() {
            return Err(TaskforgeError::Config("worker id cannot be empty".into()));
        }
        if self.pool_size == 0 {
            return Err(TaskforgeError::Config("pool size must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(TaskforgeError::Config(
                "queue capacity must be at least 1".into(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(TaskforgeError::Config(
                "heartbeat interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_config_default() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.image, "alpine:latest");
        assert!(cfg.network_disabled);
        assert_eq!(cfg.memory_limit.as_deref(), Some("256m"));
        assert_eq!(cfg.cpu_limit.as_deref(), Some("0.5"));
        assert!(cfg.command.contains("TASKFORGE_INPUT"));
    }

    #[test]
    fn scheduler_config_default() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:50051");
        assert!(cfg.gateway_addr.is_none());
        assert!(cfg.data_dir.is_none());
        assert_eq!(cfg.session_buffer, 64);
    }

    #[test]
    fn scheduler_config_builders() {
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let gateway: SocketAddr = "10.0.0.1:3000".parse().unwrap();
        let cfg = SchedulerConfig::new(addr)
            .with_gateway(gateway)
            .with_data_dir("/var/lib/taskforge");
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.gateway_addr, Some(gateway));
        assert_eq!(cfg.data_dir, Some(PathBuf::from("/var/lib/taskforge")));
    }

    #[test]
    fn scheduler_config_rejects_zero_session_buffer() {
        assert!(SchedulerConfig::default().validate().is_ok());
        let cfg = SchedulerConfig::default().with_session_buffer(0);
        assert!(matches!(
            cfg.validate(),
            Err(crate::error::TaskforgeError::Config(_))
        ));
        assert!(SchedulerConfig::default()
            .with_session_buffer(1)
            .validate()
            .is_ok());
    }

    #[test]
    fn worker_config_default() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.worker_id, "worker-1");
        assert_eq!(cfg.pool_size, 4);
        assert_eq!(cfg.queue_capacity, 100);
        assert_eq!(cfg.heartbeat_interval_ms, 2000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn worker_config_rejects_empty_pool() {
        let cfg = WorkerConfig::new("w", "http://localhost:1").with_pool_size(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn worker_config_rejects_blank_id() {
        let cfg = WorkerConfig::new("  ", "http://localhost:1");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn worker_config_rejects_zero_queue_and_interval() {
        let cfg = WorkerConfig::default().with_queue_capacity(0);
        assert!(cfg.validate().is_err());
        let cfg = WorkerConfig::default().with_heartbeat_interval_ms(0);
        assert!(cfg.validate().is_err());
    }
}
