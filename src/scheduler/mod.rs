//! Coordinator side of the scheduler.
//!
//! - [`registry`]: live workers and their reported load
//! - [`execution`]: function/execution records and the status state machine
//! - [`dispatch`]: client operations and worker selection
//! - [`session`]: the per-worker message loop

pub mod dispatch;
pub mod execution;
pub mod registry;
pub mod session;

pub use dispatch::Dispatcher;
pub use execution::{Execution, ExecutionStatus, Function, StatusView};
pub use registry::{WorkerLoad, WorkerRegistry};
pub use session::{run_session, WorkerSession};
