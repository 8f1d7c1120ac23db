//! Planner：一次结构化推理把用户请求拆成线性计划
//!
//! 输出 agent 标签经 AgentType::parse_lenient 映射，未知标签降级为 conversational；
//! 推理失败时返回单步默认计划，从不让回合失败。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::llm::{complete_structured, ChatMessage, LlmClient};
use crate::memory::{Message, MessageKind, MessageLog};
use crate::react::prompts::{agent_catalogue, render, PLANNER_PROMPT};
use crate::workflow::{AgentType, Plan, PlanStep};

const GREET_TASK: &str = "Greet the user";
const DEFAULT_TASK: &str = "Handle the user's request";
const NO_HISTORY: &str = "No prior conversation.";

/// 模型输出的计划
#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlanOutput {
    #[serde(default)]
    pub steps: Vec<PlanStepOutput>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlanStepOutput {
    /// One of the available agent names
    #[serde(default)]
    pub agent: String,
    /// What this agent must do
    #[serde(default)]
    pub task: String,
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    max_steps: usize,
    prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, max_steps: usize) -> Self {
        Self {
            llm,
            max_steps: max_steps.max(1),
            prompt: PLANNER_PROMPT.to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// 为日志中最新一条用户消息生成计划
    pub async fn plan(&self, log: &MessageLog) -> Plan {
        let narrative: Vec<Message> = log.effective().into_iter().filter(Message::is_narrative).collect();
        let Some(latest_pos) = narrative.iter().rposition(Message::is_user) else {
            tracing::info!("Empty conversation, planning greeting");
            return Plan::single(AgentType::Conversational, GREET_TASK);
        };
        let latest = narrative[latest_pos].content().to_string();
        let history = render_history(&narrative[..latest_pos]);

        let max_steps = self.max_steps.to_string();
        let agents = agent_catalogue();
        let prompt = render(
            &self.prompt,
            &[
                ("max_steps", max_steps.as_str()),
                ("agents", agents.as_str()),
                ("history", history.as_str()),
                ("latest", latest.as_str()),
            ],
        );

        match complete_structured::<PlanOutput>(self.llm.as_ref(), vec![ChatMessage::user(prompt)]).await {
            Ok(output) => {
                tracing::info!(raw = ?output, "Planner output");
                let steps = output
                    .steps
                    .into_iter()
                    .map(|s| PlanStep::new(AgentType::parse_lenient(&s.agent), s.task))
                    .collect::<Vec<_>>();
                let plan = Plan::new(steps, self.max_steps);
                for (i, step) in plan.steps().iter().enumerate() {
                    tracing::info!(step = i, agent = %step.agent_type, task = %step.task_description, "Plan step");
                }
                plan
            }
            Err(e) => {
                tracing::warn!(error = %e, "Planner failed, using default plan");
                Plan::single(AgentType::Conversational, DEFAULT_TASK)
            }
        }
    }
}

/// `User:` / `Assistant:` 行，空消息跳过
fn render_history(messages: &[Message]) -> String {
    let lines: Vec<String> = messages
        .iter()
        .filter(|m| !m.content().trim().is_empty())
        .map(|m| match m.kind {
            MessageKind::User { .. } => format!("User: {}", m.content()),
            _ => format!("Assistant: {}", m.content()),
        })
        .collect();
    if lines.is_empty() {
        NO_HISTORY.to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};

    fn log(messages: &[Message]) -> MessageLog {
        let mut log = MessageLog::new();
        for m in messages {
            log.push(m.clone());
        }
        log
    }

    #[tokio::test]
    async fn test_empty_log_greets_without_call() {
        let llm = Arc::new(ScriptedLlmClient::new());
        let plan = Planner::new(llm.clone(), 3).plan(&MessageLog::new()).await;
        assert_eq!(plan, Plan::single(AgentType::Conversational, GREET_TASK));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_agent_and_truncation() {
        let llm = Arc::new(ScriptedLlmClient::new().reply(
            r#"{"steps": [
                {"agent": "Knowledge_Hub", "task": "find policy"},
                {"agent": "wizard", "task": "do magic"},
                {"agent": "forse_analyzer", "task": "chart it"},
                {"agent": "research", "task": "extra"}
            ]}"#,
        ));
        let plan = Planner::new(llm, 3).plan(&log(&[Message::user("policy chart")])).await;
        let agents: Vec<AgentType> = plan.steps().iter().map(|s| s.agent_type).collect();
        assert_eq!(
            agents,
            vec![AgentType::KnowledgeHub, AgentType::Conversational, AgentType::DataAnalyst]
        );
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_single_step() {
        let llm = Arc::new(ScriptedLlmClient::new().fail(LlmError::Timeout));
        let plan = Planner::new(llm, 3).plan(&log(&[Message::user("anything")])).await;
        assert_eq!(plan, Plan::single(AgentType::Conversational, DEFAULT_TASK));
    }

    #[tokio::test]
    async fn test_prompt_carries_history_and_latest() {
        let llm = Arc::new(
            ScriptedLlmClient::new().reply(r#"{"steps": [{"agent": "research", "task": "look up"}]}"#),
        );
        let l = log(&[
            Message::user("first question"),
            Message::assistant("first answer"),
            Message::user("second question"),
        ]);
        Planner::new(llm.clone(), 3).plan(&l).await;
        let prompt = &llm.requests()[0].messages[0].content;
        assert!(prompt.contains("User: first question\nAssistant: first answer"));
        assert!(prompt.contains("Latest user message:\nsecond question"));
        assert!(!prompt.contains("User: second question"));
    }

    #[test]
    fn test_empty_history_placeholder() {
        assert_eq!(render_history(&[]), NO_HISTORY);
    }
}
