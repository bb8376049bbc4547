//! Worker process: runs dispatched functions and reports back.
//!
//! - [`WorkerAgent`]: session bootstrap and the receive loop
//! - [`pool`]: bounded job queue, fixed executor pool, shared load counter
//! - [`heartbeat`]: periodic load reports
//! - [`executor`]: the [`FunctionRunner`] trait and the echo / Docker runners
//! - [`payload`]: tolerant decoding of execution payloads
//!
//! # Execution Flow
//!
//! 1. Scheduler sends `Execute` on the session
//! 2. The receive loop queues a [`Job`](pool::Job), waiting if the queue is full
//! 3. An executor bumps the load counter and runs the function
//! 4. The `Result` goes back on the same session and the counter drops

pub mod agent;
pub mod executor;
pub mod heartbeat;
pub mod payload;
pub mod pool;

pub use agent::WorkerAgent;
pub use executor::{EchoRunner, FunctionRunner, Invocation, RunnerError, SandboxRunner};
pub use pool::{ExecutorPool, Job, LoadCounter};
