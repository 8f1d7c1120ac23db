//! 附件处理
//!
//! 回合开始、规划之前调用一次 FileProcessor，把附件引用解析为内联文本，
//! 再以 `"<文件上下文>\n\nUser query: <消息>"` 的形式拼到用户消息前。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 单个附件文件内容上限（字符）
const MAX_FILE_CHARS: usize = 50_000;

/// 随消息提交的附件引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    pub id: u64,
    pub filename: String,
    pub mime_type: String,
    /// 存储位置（本地路径或对象存储 URI，由 FileProcessor 解释）
    pub location: String,
    #[serde(default)]
    pub size_bytes: u64,
}

/// 附件解析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub file_id: u64,
    pub filename: String,
    pub content: Option<String>,
    pub error: Option<String>,
    pub characters: usize,
    pub truncated: bool,
}

impl ProcessedFile {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn summary(&self) -> String {
        if let Some(err) = &self.error {
            return format!("[File: {} - Error: {}]", self.filename, err);
        }
        let mut meta = vec![format!("{} characters", self.characters)];
        if self.truncated {
            meta.push("truncated".to_string());
        }
        format!("[File: {} ({})]", self.filename, meta.join(", "))
    }
}

#[async_trait]
pub trait FileProcessor: Send + Sync {
    async fn process(&self, files: &[AttachedFile]) -> Result<Vec<ProcessedFile>, AgentError>;
}

/// 本地文本文件处理器：location 视为本地路径，按 UTF-8 读取并截断
#[derive(Debug, Default)]
pub struct LocalFileProcessor;

#[async_trait]
impl FileProcessor for LocalFileProcessor {
    async fn process(&self, files: &[AttachedFile]) -> Result<Vec<ProcessedFile>, AgentError> {
        let mut out = Vec::with_capacity(files.len());
        for f in files {
            let processed = match tokio::fs::read_to_string(&f.location).await {
                Ok(text) => {
                    let characters = text.chars().count();
                    let truncated = characters > MAX_FILE_CHARS;
                    let content: String = text.chars().take(MAX_FILE_CHARS).collect();
                    ProcessedFile {
                        file_id: f.id,
                        filename: f.filename.clone(),
                        content: Some(content),
                        error: None,
                        characters,
                        truncated,
                    }
                }
                Err(e) => {
                    tracing::warn!(file = %f.filename, error = %e, "Attached file unreadable");
                    ProcessedFile {
                        file_id: f.id,
                        filename: f.filename.clone(),
                        content: None,
                        error: Some(e.to_string()),
                        characters: 0,
                        truncated: false,
                    }
                }
            };
            out.push(processed);
        }
        Ok(out)
    }
}

/// 将解析结果格式化为可前置到用户消息的上下文；无附件时为空串
pub fn format_files_for_context(files: &[ProcessedFile]) -> String {
    if files.is_empty() {
        return String::new();
    }
    let mut parts = vec!["The user has attached the following files:\n".to_string()];
    for f in files {
        parts.push(format!("\n{}", f.summary()));
        match (&f.content, &f.error) {
            (Some(content), None) if !content.is_empty() => {
                parts.push(format!("\n```\n{content}\n```\n"));
            }
            (_, Some(err)) => parts.push(format!("\n[Could not read file: {err}]\n")),
            _ => {}
        }
    }
    parts.join("\n")
}

/// 附件上下文 + 用户消息
pub fn message_with_context(context: &str, message: &str) -> String {
    if context.is_empty() {
        message.to_string()
    } else {
        format!("{context}\n\nUser query: {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_processor_reads_and_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, "quarterly numbers").await.unwrap();

        let files = vec![
            AttachedFile {
                id: 1,
                filename: "notes.txt".into(),
                mime_type: "text/plain".into(),
                location: path.to_string_lossy().into_owned(),
                size_bytes: 17,
            },
            AttachedFile {
                id: 2,
                filename: "gone.csv".into(),
                mime_type: "text/csv".into(),
                location: dir.path().join("gone.csv").to_string_lossy().into_owned(),
                size_bytes: 1,
            },
        ];
        let processed = LocalFileProcessor.process(&files).await.unwrap();
        assert!(processed[0].success());
        assert!(!processed[1].success());

        let ctx = format_files_for_context(&processed);
        assert!(ctx.contains("[File: notes.txt (17 characters)]"));
        assert!(ctx.contains("quarterly numbers"));
        assert!(ctx.contains("[Could not read file:"));
    }

    #[test]
    fn test_message_with_context() {
        assert_eq!(message_with_context("", "hi"), "hi");
        assert_eq!(message_with_context("CTX", "hi"), "CTX\n\nUser query: hi");
    }
}
