//! 错误类型
//!
//! 各组件在自身边界捕获失败并按 recovery 规则降级；只有传输层或未分类的错误会以 `error` 事件浮出。

use thiserror::Error;

use crate::llm::LlmError;

/// 一个回合（turn）内可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Planner failed: {0}")]
    PlannerFailed(String),

    /// 执行器在强制无工具回答后仍失败
    #[error("Executor {agent} failed: {reason}")]
    ExecutorFailed { agent: String, reason: String },

    #[error("Summarizer failed: {0}")]
    SummarizerFailed(String),

    #[error("Suggestion generation failed: {0}")]
    SuggestionFailed(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 恢复载荷无法解析为审批决策表，或缺少某个中断 id；不自动重试
    #[error("Interrupt resume payload rejected: {0}")]
    InterruptParse(String),

    #[error("Conversation '{0}' not found")]
    ThreadNotFound(String),

    /// 同一 thread 已有回合在运行
    #[error("Conversation '{0}' already has a turn in progress")]
    ThreadBusy(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("File processing failed: {0}")]
    FileProcessing(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Network timeout")]
    NetworkTimeout,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::JsonParseError(e.to_string())
    }
}
