//! 后续问题建议
//!
//! 最多 4 条；叙述消息不足两条时不调用模型；失败返回空列表，不阻塞回合完成。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::llm::{complete_structured, ChatMessage, LlmClient};
use crate::memory::{Message, MessageLog};
use crate::react::prompts::{render, SUGGEST_QUERIES_PROMPT};

pub const MAX_SUGGESTIONS: usize = 4;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SuggestedQueriesOutput {
    /// Short follow-up questions, at most four
    #[serde(default)]
    pub suggested_queries: Vec<String>,
}

pub struct SuggestionGenerator {
    llm: Arc<dyn LlmClient>,
}

impl SuggestionGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// `fixed` 来自刚完成的执行器；存在时直接返回，不调用模型
    pub async fn suggest(&self, log: &MessageLog, fixed: Option<Vec<String>>) -> Vec<String> {
        if let Some(fixed) = fixed {
            return fixed;
        }
        let narrative: Vec<Message> = log.effective().into_iter().filter(Message::is_narrative).collect();
        if narrative.len() < 2 {
            return Vec::new();
        }
        let latest = narrative
            .last()
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        let history = narrative
            .iter()
            .map(|m| {
                let who = if m.is_user() { "User" } else { "Assistant" };
                format!("{who}: {}", m.content())
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = render(
            SUGGEST_QUERIES_PROMPT,
            &[("history", history.as_str()), ("latest", latest.as_str())],
        );

        match complete_structured::<SuggestedQueriesOutput>(self.llm.as_ref(), vec![ChatMessage::user(prompt)]).await {
            Ok(out) => out
                .suggested_queries
                .into_iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .take(MAX_SUGGESTIONS)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Suggestion generation failed");
                Vec::new()
            }
        }
    }
}
