//! Mock LLM 客户端（用于测试与无 API Key 的本地演示）
//!
//! - EchoLlmClient：无脚本时的兜底，给出最简计划与回显回复
//! - ScriptedLlmClient：按顺序返回预置输出（或错误），并记录每次请求供断言；流式调用按词切成多段

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{CompletionRequest, LlmClient, LlmError, Role, TokenStream};

/// 回显客户端：结构化请求返回单步对话计划，其余回显最后一条 User 消息
#[derive(Debug, Default)]
pub struct EchoLlmClient;

#[async_trait]
impl LlmClient for EchoLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let wants_json = request
            .messages
            .iter()
            .any(|m| m.role == Role::System && m.content.contains("JSON Schema"));
        if wants_json {
            return Ok(r#"{"steps": [{"agent": "conversational", "task": "Reply to the user"}], "suggested_queries": []}"#.to_string());
        }
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {last_user}"))
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<TokenStream, LlmError> {
        let content = self.complete(request).await?;
        Ok(Box::pin(stream::iter(vec![Ok(content)])))
    }
}

/// 脚本客户端：每次 complete 弹出一条预置结果；脚本耗尽时返回 ApiError
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条成功输出
    pub fn reply(self, output: impl Into<String>) -> Self {
        self.push(Ok(output.into()));
        self
    }

    /// 追加一条失败
    pub fn fail(self, err: LlmError) -> Self {
        self.push(Err(err));
        self
    }

    pub fn push(&self, item: Result<String, LlmError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Err(LlmError::ApiError("script exhausted".to_string())))
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<TokenStream, LlmError> {
        let content = self.complete(request).await?;
        let tokens: Vec<Result<String, LlmError>> = content
            .split_inclusive(' ')
            .map(|t| Ok(t.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(tokens)))
    }
}
