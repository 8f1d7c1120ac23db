//! 错误分类
//!
//! 将 AgentError 映射为客户端可见的 StreamFailure（类 HTTP 状态码、是否可重试、重试等待秒数），
//! 供事件流在回合失败时输出 `error` 事件。

use serde::Serialize;

use crate::core::AgentError;
use crate::llm::LlmError;

/// `error` 事件携带的结构化失败信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamFailure {
    pub code: u16,
    pub message: String,
    pub retryable: bool,
    pub retry_after: Option<f64>,
}

impl StreamFailure {
    pub fn new(code: u16, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            retryable,
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, secs: f64) -> Self {
        self.retry_after = Some(secs);
        self
    }
}

/// 根据错误类型给出失败描述；限流类错误带 retry_after 提示
pub fn classify_error(err: &AgentError) -> StreamFailure {
    match err {
        AgentError::Llm(LlmError::RateLimited { retry_after_ms }) => StreamFailure::new(
            429,
            format!("Rate limit: {err}"),
            true,
        )
        .with_retry_after(*retry_after_ms as f64 / 1000.0),
        AgentError::Llm(LlmError::Timeout) | AgentError::NetworkTimeout | AgentError::ToolTimeout(_) => {
            StreamFailure::new(
                504,
                "Request timed out. The response is being processed in the background.",
                true,
            )
        }
        AgentError::Llm(LlmError::Network(msg)) | AgentError::Connection(msg) => {
            StreamFailure::new(503, format!("Connection error: {msg}"), true).with_retry_after(5.0)
        }
        AgentError::Checkpoint(_) => {
            StreamFailure::new(503, "Failed to save conversation state.", true).with_retry_after(5.0)
        }
        AgentError::Cancelled => StreamFailure::new(499, "Request was cancelled.", true),
        AgentError::ThreadNotFound(_) => StreamFailure::new(404, err.to_string(), false),
        AgentError::ThreadBusy(_) => StreamFailure::new(409, err.to_string(), true).with_retry_after(1.0),
        AgentError::InterruptParse(msg) | AgentError::ConfigError(msg) => {
            StreamFailure::new(400, msg.clone(), false)
        }
        other => classify_message(&other.to_string()),
    }
}

/// 未分类错误：按消息文本关键字归类（timeout / connection / rate limit），否则 500
fn classify_message(msg: &str) -> StreamFailure {
    let lower = msg.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        StreamFailure::new(504, format!("Operation timed out: {msg}"), true)
    } else if lower.contains("connection") {
        StreamFailure::new(503, format!("Connection error: {msg}"), true).with_retry_after(5.0)
    } else if lower.contains("rate") && lower.contains("limit") {
        StreamFailure::new(429, format!("Rate limit: {msg}"), true).with_retry_after(60.0)
    } else {
        StreamFailure::new(500, format!("Unexpected error: {msg}"), true)
    }
}
