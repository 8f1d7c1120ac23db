//! 工具执行器
//!
//! 对每次调用施加超时并输出结构化审计日志（JSON）；失败与超时不向上抛出，
//! 而是转为 is_error 的 ToolOutcome，作为工具结果回灌给执行器。
//! 同一批调用并发执行，结果按完成顺序返回（不保证与请求顺序一致）。

use std::time::{Duration, Instant};

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::memory::ToolCall;
use crate::tools::ToolRegistry;

/// 单次工具调用的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub call_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: content.into(),
            is_error: false,
        }
    }

    /// 失败结果：`Error running <tool> tool: <reason>`
    pub fn failed(call: &ToolCall, err: &AgentError) -> Self {
        let reason = match err {
            AgentError::ToolExecutionFailed(msg) => msg.clone(),
            other => other.to_string(),
        };
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: format!("Error running {} tool: {}", call.name, reason),
            is_error: true,
        }
    }
}

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行指定工具；超时返回 ToolTimeout，工具返回 Err 则转为 ToolExecutionFailed；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: serde_json::Value) -> Result<String, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    /// 执行一次调用，失败转为错误结果
    pub async fn run_call(&self, call: &ToolCall) -> ToolOutcome {
        match self.execute(&call.name, call.args.clone()).await {
            Ok(content) => ToolOutcome::ok(call, content),
            Err(e) => ToolOutcome::failed(call, &e),
        }
    }

    /// 并发执行一批调用，按完成顺序返回
    pub async fn execute_batch(&self, calls: &[ToolCall]) -> Vec<ToolOutcome> {
        let mut pending: FuturesUnordered<_> = calls.iter().map(|c| self.run_call(c)).collect();
        let mut outcomes = Vec::with_capacity(calls.len());
        while let Some(outcome) = pending.next().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::tools::{EchoTool, Tool};

    struct SleepTool;

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str {
            "sleep"
        }
        fn description(&self) -> &str {
            "Sleep for ms then return label"
        }
        async fn execute(&self, args: Value) -> Result<String, String> {
            let ms = args.get("ms").and_then(|v| v.as_u64()).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(args.get("label").and_then(|v| v.as_str()).unwrap_or("").to_string())
        }
    }

    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            Err("upstream 500".to_string())
        }
    }

    fn executor(timeout_secs: u64) -> ToolExecutor {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        reg.register(SleepTool);
        reg.register(FailTool);
        ToolExecutor::new(reg, timeout_secs)
    }

    #[tokio::test]
    async fn test_batch_returns_in_completion_order() {
        let ex = executor(5);
        let calls = vec![
            ToolCall::new("sleep", json!({"ms": 150, "label": "slow"})),
            ToolCall::new("sleep", json!({"ms": 5, "label": "fast"})),
        ];
        let out = ex.execute_batch(&calls).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "fast");
        assert_eq!(out[0].call_id, calls[1].id);
        assert_eq!(out[1].content, "slow");
    }

    #[tokio::test]
    async fn test_failure_becomes_error_result() {
        let ex = executor(5);
        let call = ToolCall::new("fail", json!({}));
        let out = ex.run_call(&call).await;
        assert!(out.is_error);
        assert_eq!(out.content, "Error running fail tool: upstream 500");

        let unknown = ex.run_call(&ToolCall::new("nope", json!({}))).await;
        assert!(unknown.is_error);
        assert!(unknown.content.contains("Unknown tool: nope"));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let ex = executor(0);
        let err = ex.execute("sleep", json!({"ms": 50})).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(_)));
    }
}
