//! 汇总器：把本回合各执行器的文字回答合成为一条最终回答
//!
//! 只读取最后一条用户消息之后的叙述消息（剪枝后已无工具载荷）。失败不外抛，回退到最近一条回答。
//! 经 complete_stream 逐段读取，每段交给 on_delta；返回值才是最终回答。

use std::sync::Arc;

use futures_util::StreamExt;

use crate::llm::{ChatMessage, CompletionRequest, LlmClient, LlmError};
use crate::memory::{Message, MessageLog};
use crate::react::prompts::{render, SUMMARIZER_PROMPT};

pub const EMPTY_NARRATIVE_ANSWER: &str = "I couldn't generate a response. Please try again.";
pub const SUMMARY_FAILED_ANSWER: &str =
    "I encountered an error generating the response. Please try again.";

pub struct Summarizer {
    llm: Arc<dyn LlmClient>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn summarize<F>(&self, log: &MessageLog, query: &str, mut on_delta: F) -> String
    where
        F: FnMut(&str) + Send,
    {
        let narrative: Vec<Message> = log
            .since_last_user()
            .into_iter()
            .filter(Message::is_narrative)
            .collect();
        if narrative.iter().all(Message::is_user) {
            tracing::warn!("Nothing to summarize");
            return EMPTY_NARRATIVE_ANSWER.to_string();
        }

        let history = narrative
            .iter()
            .map(|m| {
                if m.is_user() {
                    format!("User: {}", m.content())
                } else {
                    format!("Agent Output: {}", m.content())
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = render(SUMMARIZER_PROMPT, &[("history", history.as_str()), ("query", query)]);

        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)]);
        match self.stream_answer(&request, &mut on_delta).await {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => fallback(&narrative),
            Err(e) => {
                tracing::warn!(error = %e, "Summarizer failed, falling back to last answer");
                fallback(&narrative)
            }
        }
    }

    async fn stream_answer<F>(&self, request: &CompletionRequest, on_delta: &mut F) -> Result<String, LlmError>
    where
        F: FnMut(&str) + Send,
    {
        let mut tokens = self.llm.complete_stream(request).await?;
        let mut answer = String::new();
        while let Some(token) = tokens.next().await {
            let token = token?;
            if !token.is_empty() {
                on_delta(&token);
                answer.push_str(&token);
            }
        }
        Ok(answer)
    }
}

/// 倒序找最后一条非空的 Assistant 叙述
fn fallback(narrative: &[Message]) -> String {
    narrative
        .iter()
        .rev()
        .find(|m| !m.is_user())
        .map(|m| m.content().to_string())
        .unwrap_or_else(|| SUMMARY_FAILED_ANSWER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use crate::memory::ToolCall;

    fn turn_log() -> MessageLog {
        let mut log = MessageLog::new();
        log.push(Message::user("old question"));
        log.push(Message::assistant("old answer"));
        log.push(Message::user("What is the leave policy? [1]"));
        let call = ToolCall::new("search_knowledge_hub", serde_json::json!({}));
        log.push(Message::assistant_with_calls("", vec![call]));
        log.push(Message::assistant("Employees get 20 days [1].\n\nSources:\n[1] Handbook"));
        log
    }

    #[tokio::test]
    async fn test_prompt_uses_current_turn_only() {
        let llm = Arc::new(ScriptedLlmClient::new().reply("Final [1]"));
        let answer = Summarizer::new(llm.clone())
            .summarize(&turn_log(), "What is the leave policy?", |_| {})
            .await;
        assert_eq!(answer, "Final [1]");
        let prompt = &llm.requests()[0].messages[0].content;
        assert!(prompt.contains("Agent Output: Employees get 20 days [1]."));
        assert!(!prompt.contains("old answer"));
    }

    #[tokio::test]
    async fn test_deltas_arrive_before_answer() {
        let llm = Arc::new(ScriptedLlmClient::new().reply("Twenty days of leave [1]."));
        let mut deltas = Vec::new();
        let answer = Summarizer::new(llm)
            .summarize(&turn_log(), "q", |d| deltas.push(d.to_string()))
            .await;
        assert_eq!(answer, "Twenty days of leave [1].");
        assert!(deltas.len() > 1);
        assert_eq!(deltas.concat(), answer);
    }

    #[tokio::test]
    async fn test_failure_returns_last_answer() {
        let llm = Arc::new(ScriptedLlmClient::new().fail(LlmError::Timeout));
        let answer = Summarizer::new(llm).summarize(&turn_log(), "q", |_| {}).await;
        assert!(answer.starts_with("Employees get 20 days"));
    }

    #[tokio::test]
    async fn test_no_agent_output() {
        let llm = Arc::new(ScriptedLlmClient::new());
        let mut log = MessageLog::new();
        log.push(Message::user("hello"));
        let answer = Summarizer::new(llm.clone()).summarize(&log, "hello", |_| {}).await;
        assert_eq!(answer, EMPTY_NARRATIVE_ANSWER);
        assert_eq!(llm.call_count(), 0);
    }
}
