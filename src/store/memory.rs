use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::Result;
use crate::scheduler::{Execution, Function};
use crate::store::ExecutionStore;

/// In-memory store. Records live as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    functions: RwLock<HashMap<String, Function>>,
    executions: RwLock<HashMap<String, Execution>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn execution_count(&self) -> usize {
        self.executions.read().await.len()
    }

    /// Every stored execution, in no particular order.
    pub async fn executions(&self) -> Vec<Execution> {
        self.executions.read().await.values().cloned().collect()
    }
}

#[tonic::async_trait]
impl ExecutionStore for MemoryStore {
    async fn save_function(&self, function: &Function) -> Result<()> {
        self.functions
            .write()
            .await
            .insert(function.id.clone(), function.clone());
        Ok(())
    }

    async fn get_function(&self, id: &str) -> Result<Option<Function>> {
        Ok(self.functions.read().await.get(id).cloned())
    }

    async fn save_execution(&self, execution: &Execution) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        Ok(self.executions.read().await.get(id).cloned())
    }
}
