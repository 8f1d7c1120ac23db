//! 对话执行器：不绑定工具，单次推理直接作答

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::{ChatMessage, CompletionRequest, LlmClient};
use crate::memory::{to_chat_messages, Message};
use crate::react::loop_::{ExecutorContext, ExecutorOutcome, TaskExecutor};
use crate::react::prompts::{CONVERSATIONAL_FALLBACK, CONVERSATIONAL_PROMPT};
use crate::workflow::AgentType;

pub struct ConversationalExecutor {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl ConversationalExecutor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_prompt: CONVERSATIONAL_PROMPT.to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

#[async_trait]
impl TaskExecutor for ConversationalExecutor {
    fn agent_type(&self) -> AgentType {
        AgentType::Conversational
    }

    async fn run(&self, ctx: &mut ExecutorContext<'_>) -> Result<ExecutorOutcome, AgentError> {
        if ctx.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let mut messages = vec![ChatMessage::system(self.system_prompt.clone())];
        messages.extend(to_chat_messages(&ctx.state.log.effective()));

        let text = match self.llm.complete(&CompletionRequest::new(messages)).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => CONVERSATIONAL_FALLBACK.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Conversational reply failed, using fallback");
                CONVERSATIONAL_FALLBACK.to_string()
            }
        };
        ctx.state.log.push(Message::assistant(text.clone()));
        Ok(ExecutorOutcome::Completed { final_text: text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExecutionState;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_replies_without_tools() {
        let llm = Arc::new(ScriptedLlmClient::new().reply("Hi there!"));
        let mut state = ExecutionState::new("t");
        state.log.push(Message::user("Hello"));
        let mut ctx = ExecutorContext {
            state: &mut state,
            events: None,
            cancel: CancellationToken::new(),
        };
        let out = ConversationalExecutor::new(llm.clone()).run(&mut ctx).await.unwrap();
        assert_eq!(out, ExecutorOutcome::Completed { final_text: "Hi there!".into() });
        assert!(llm.requests()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_failure_uses_fixed_greeting() {
        let llm = Arc::new(ScriptedLlmClient::new().fail(LlmError::Network("down".into())));
        let mut state = ExecutionState::new("t");
        state.log.push(Message::user("Hello"));
        let mut ctx = ExecutorContext {
            state: &mut state,
            events: None,
            cancel: CancellationToken::new(),
        };
        let out = ConversationalExecutor::new(llm).run(&mut ctx).await.unwrap();
        assert_eq!(
            out,
            ExecutorOutcome::Completed { final_text: CONVERSATIONAL_FALLBACK.into() }
        );
        assert_eq!(state.log.effective().last().unwrap().content(), CONVERSATIONAL_FALLBACK);
    }
}
