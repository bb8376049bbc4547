//! Persistence for function and execution records.
//!
//! The scheduler only needs keyed point reads and writes. Each call is atomic
//! on its own; callers never rely on multi-call transactions.
//!
//! - [`MemoryStore`]: process-local maps, the default
//! - [`FileStore`]: one JSON document per record under a data directory

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::scheduler::{Execution, Function};

#[tonic::async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn save_function(&self, function: &Function) -> Result<()>;

    async fn get_function(&self, id: &str) -> Result<Option<Function>>;

    async fn save_execution(&self, execution: &Execution) -> Result<()>;

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>>;
}
