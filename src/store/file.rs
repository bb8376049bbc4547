use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Result, TaskforgeError};
use crate::scheduler::{Execution, Function};
use crate::store::ExecutionStore;

const FUNCTIONS_DIR: &str = "functions";
const EXECUTIONS_DIR: &str = "executions";

/// File-backed store keeping one JSON document per record.
///
/// Writes go to a temporary sibling and are renamed into place, so readers
/// see either the previous or the new record, never a partial one.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(FUNCTIONS_DIR)).await?;
        tokio::fs::create_dir_all(root.join(EXECUTIONS_DIR)).await?;
        tracing::info!(root = %root.display(), "Opened file store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, table: &str, id: &str) -> Option<PathBuf> {
        is_valid_key(id).then(|| self.root.join(table).join(format!("{id}.json")))
    }

    async fn write_record<T: Serialize>(&self, table: &str, id: &str, record: &T) -> Result<()> {
        let path = self
            .record_path(table, id)
            .ok_or_else(|| TaskforgeError::InvalidArgument(format!("invalid record id: {id}")))?;
        let bytes = serde_json::to_vec_pretty(record)?;
        let tmp = path.with_extension(format!("json.tmp-{}", Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
            return Err(TaskforgeError::Store(format!(
                "failed to write {}: {}",
                tmp.display(),
                e
            )));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(TaskforgeError::Store(format!(
                "failed to commit {}: {}",
                path.display(),
                e
            )));
        }
        Ok(())
    }

    async fn read_record<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<Option<T>> {
        let Some(path) = self.record_path(table, id) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TaskforgeError::Store(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Record ids double as file names, so only plain tokens are accepted.
fn is_valid_key(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[tonic::async_trait]
impl ExecutionStore for FileStore {
    async fn save_function(&self, function: &Function) -> Result<()> {
        self.write_record(FUNCTIONS_DIR, &function.id, function).await
    }

    async fn get_function(&self, id: &str) -> Result<Option<Function>> {
        self.read_record(FUNCTIONS_DIR, id).await
    }

    async fn save_execution(&self, execution: &Execution) -> Result<()> {
        self.write_record(EXECUTIONS_DIR, &execution.id, execution)
            .await
    }

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        self.read_record(EXECUTIONS_DIR, id).await
    }
}
