//! 检查点持久化
//!
//! ExecutionState 的唯一事实来源，按 thread_id 整体读写（单 thread 原子）。
//! - InMemoryCheckpointStore：进程内 HashMap，默认
//! - FileCheckpointStore：每个 thread 一个 JSON 文件（文件名为 thread_id 的十六进制编码），先写临时文件再 rename

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::{AgentError, ExecutionState};

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, thread_id: &str) -> Result<Option<ExecutionState>, AgentError>;

    async fn put(&self, thread_id: &str, state: &ExecutionState) -> Result<(), AgentError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    states: RwLock<HashMap<String, ExecutionState>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get(&self, thread_id: &str) -> Result<Option<ExecutionState>, AgentError> {
        Ok(self.states.read().await.get(thread_id).cloned())
    }

    async fn put(&self, thread_id: &str, state: &ExecutionState) -> Result<(), AgentError> {
        self.states
            .write()
            .await
            .insert(thread_id.to_string(), state.clone());
        Ok(())
    }
}

/// 文件检查点：`<dir>/<hex(thread_id)>.json`
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// 逐字节十六进制编码：可逆，不同 thread_id 不会落到同一文件，也不会路径穿越
    fn path_for(&self, thread_id: &str) -> PathBuf {
        let encoded: String = thread_id.bytes().map(|b| format!("{b:02x}")).collect();
        self.dir.join(format!("{encoded}.json"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, thread_id: &str) -> Result<Option<ExecutionState>, AgentError> {
        let path = self.path_for(thread_id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AgentError::Checkpoint(format!("{}: {e}", path.display()))),
        };
        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| AgentError::Checkpoint(format!("{}: {e}", path.display())))
    }

    async fn put(&self, thread_id: &str, state: &ExecutionState) -> Result<(), AgentError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AgentError::Checkpoint(e.to_string()))?;
        let path = self.path_for(thread_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| AgentError::Checkpoint(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| AgentError::Checkpoint(e.to_string()))
    }
}
