//! 执行器契约与 ReAct 主循环
//!
//! 推理 -> 若有工具调用则执行并写回结果 -> 下一轮推理，直到产出不带工具调用的回答，或请求审批而挂起。
//! - 预算：每次推理前检查 ToolCallBudget，用尽则不绑定工具并附加强制作答指令
//! - 审批：批次中含 requires_approval 工具时不执行任何调用，整批保存到挂起信息
//! - 载荷清理：写入日志的工具结果先去掉大块产物，原始结果只随 ToolsExecuted 转发一次

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, ExecutionState};
use crate::llm::{ChatMessage, CompletionRequest, LlmClient};
use crate::memory::{to_chat_messages, Message, ToolCall};
use crate::react::budget::{ToolCallBudget, FORCE_ANSWER_INSTRUCTION};
use crate::react::events::{send_transition, Node, Transition, TransitionSender};
use crate::react::hygiene::scrub_tool_payload;
use crate::react::parse::{parse_reasoning_output, strip_tool_json, ReasoningOutput};
use crate::tools::{ToolExecutor, ToolOutcome};
use crate::workflow::{AgentType, DecisionMap, Interrupt};

/// 单次执行器调用内最大推理轮数，防止死循环
const MAX_REASONING_ROUNDS: usize = 20;
/// 强制作答仍无文字时的回答
const BUDGET_EXHAUSTED_ANSWER: &str =
    "I reached the limit of tool calls for this request before finishing. Here is what I could not complete.";

/// 执行器的一次调用上下文
pub struct ExecutorContext<'a> {
    pub state: &'a mut ExecutionState,
    pub events: Option<TransitionSender>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorOutcome {
    Completed { final_text: String },
    Suspended {
        interrupts: Vec<Interrupt>,
        pending_calls: Vec<ToolCall>,
    },
}

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn agent_type(&self) -> AgentType;

    /// 终结型执行器的回答即本回合最终回答，跳过汇总器
    fn is_terminal(&self) -> bool {
        false
    }

    /// 固定的后续建议；Some 时建议生成不调用模型
    fn fixed_suggestions(&self) -> Option<Vec<String>> {
        None
    }

    async fn run(&self, ctx: &mut ExecutorContext<'_>) -> Result<ExecutorOutcome, AgentError>;

    /// 带着审批决策回到挂起的执行器；默认直接重新运行
    async fn resume(
        &self,
        ctx: &mut ExecutorContext<'_>,
        _pending_calls: Vec<ToolCall>,
        _decisions: &DecisionMap,
    ) -> Result<ExecutorOutcome, AgentError> {
        self.run(ctx).await
    }
}

/// 带工具的通用执行器
pub struct ReactExecutor {
    agent: AgentType,
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolExecutor>,
    system_prompt: String,
    tool_call_cap: usize,
    terminal: bool,
    fixed_suggestions: Option<Vec<String>>,
}

impl ReactExecutor {
    pub fn new(
        agent: AgentType,
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolExecutor>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            agent,
            llm,
            tools,
            system_prompt: system_prompt.into(),
            tool_call_cap: 6,
            terminal: false,
            fixed_suggestions: None,
        }
    }

    pub fn with_tool_call_cap(mut self, cap: usize) -> Self {
        self.tool_call_cap = cap;
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn with_fixed_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.fixed_suggestions = Some(suggestions);
        self
    }

    fn base_messages(&self, state: &ExecutionState) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(self.system_prompt.clone())];
        messages.extend(to_chat_messages(&state.log.effective()));
        messages
    }

    /// 不绑定工具的强制作答
    async fn forced_answer(&self, state: &ExecutionState) -> Result<String, AgentError> {
        let mut messages = self.base_messages(state);
        messages.push(ChatMessage::user(FORCE_ANSWER_INSTRUCTION));
        let output = self
            .llm
            .complete(&CompletionRequest::new(messages))
            .await
            .map_err(|e| AgentError::ExecutorFailed {
                agent: self.agent.to_string(),
                reason: e.to_string(),
            })?;
        let text = strip_tool_json(&output);
        Ok(if text.is_empty() {
            BUDGET_EXHAUSTED_ANSWER.to_string()
        } else {
            text
        })
    }

    fn finish(&self, state: &mut ExecutionState, text: String) -> ExecutorOutcome {
        state.log.push(Message::assistant(text.clone()));
        ExecutorOutcome::Completed { final_text: text }
    }

    /// 记录预算、发出原始结果、写回清理后的结果
    fn record_outcomes(
        &self,
        ctx: &mut ExecutorContext<'_>,
        budget: &mut ToolCallBudget,
        executed: usize,
        outcomes: Vec<ToolOutcome>,
    ) {
        budget.record_batch(executed);
        ctx.state.tool_calls_used = budget.used();
        for o in &outcomes {
            ctx.state.log.push(Message::tool_result(
                o.call_id.clone(),
                o.name.clone(),
                scrub_tool_payload(&o.content),
                o.is_error,
            ));
        }
        send_transition(
            &ctx.events,
            Transition::executor(self.agent, Node::ToolsExecuted { results: outcomes }),
        );
    }

    async fn reasoning_loop(&self, ctx: &mut ExecutorContext<'_>) -> Result<ExecutorOutcome, AgentError> {
        let specs = self.tools.registry().specs();
        for round in 0..MAX_REASONING_ROUNDS {
            if ctx.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let mut budget = ToolCallBudget::resume(self.tool_call_cap, ctx.state.tool_calls_used);

            if budget.exhausted() && !specs.is_empty() {
                tracing::warn!(
                    agent = %self.agent,
                    used = budget.used(),
                    cap = budget.cap(),
                    "Tool limit reached, forcing answer"
                );
                let text = self.forced_answer(ctx.state).await?;
                return Ok(self.finish(ctx.state, text));
            }

            let request = CompletionRequest::new(self.base_messages(ctx.state)).with_tools(specs.clone());
            let output = match self.llm.complete(&request).await {
                Ok(o) => o,
                Err(e) => {
                    tracing::warn!(agent = %self.agent, round, error = %e, "Reasoning failed, forcing answer");
                    let text = self.forced_answer(ctx.state).await?;
                    return Ok(self.finish(ctx.state, text));
                }
            };

            let (preamble, calls) = match parse_reasoning_output(&output) {
                ReasoningOutput::Answer(text) => return Ok(self.finish(ctx.state, text)),
                ReasoningOutput::ToolCalls { .. } if specs.is_empty() => {
                    return Ok(self.finish(ctx.state, strip_tool_json(&output)));
                }
                ReasoningOutput::ToolCalls { preamble, calls } => (preamble, calls),
            };

            tracing::debug!(agent = %self.agent, round, calls = calls.len(), "Tool calls requested");
            ctx.state
                .log
                .push(Message::assistant_with_calls(preamble, calls.clone()));
            send_transition(
                &ctx.events,
                Transition::executor(self.agent, Node::Reasoning { calls: calls.clone() }),
            );

            let interrupts: Vec<Interrupt> = calls
                .iter()
                .filter(|c| self.tools.registry().requires_approval(&c.name))
                .map(Interrupt::for_call)
                .collect();
            if !interrupts.is_empty() {
                tracing::info!(agent = %self.agent, count = interrupts.len(), "Approval required, suspending");
                return Ok(ExecutorOutcome::Suspended {
                    interrupts,
                    pending_calls: calls,
                });
            }

            let outcomes = self.tools.execute_batch(&calls).await;
            self.record_outcomes(ctx, &mut budget, calls.len(), outcomes);
        }
        tracing::warn!(agent = %self.agent, "Reasoning round limit reached, forcing answer");
        let text = self.forced_answer(ctx.state).await?;
        Ok(self.finish(ctx.state, text))
    }
}

#[async_trait]
impl TaskExecutor for ReactExecutor {
    fn agent_type(&self) -> AgentType {
        self.agent
    }

    fn is_terminal(&self) -> bool {
        self.terminal
    }

    fn fixed_suggestions(&self) -> Option<Vec<String>> {
        self.fixed_suggestions.clone()
    }

    async fn run(&self, ctx: &mut ExecutorContext<'_>) -> Result<ExecutorOutcome, AgentError> {
        self.reasoning_loop(ctx).await
    }

    /// 批准的调用（可替换参数）与无需审批的调用并发执行；未批准的调用得到拒绝结果
    async fn resume(
        &self,
        ctx: &mut ExecutorContext<'_>,
        pending_calls: Vec<ToolCall>,
        decisions: &DecisionMap,
    ) -> Result<ExecutorOutcome, AgentError> {
        let mut to_run = Vec::new();
        let mut rejected = Vec::new();
        for mut call in pending_calls {
            match decisions.get(&call.id) {
                Some(d) if d.is_approved() => {
                    if let Some(params) = &d.parameters {
                        call.args = params.clone();
                    }
                    to_run.push(call);
                }
                Some(_) => {
                    tracing::info!(agent = %self.agent, tool = %call.name, "Action not approved");
                    rejected.push(ToolOutcome::ok(
                        &call,
                        format!("{} action not approved by user", call.name),
                    ));
                }
                None if self.tools.registry().requires_approval(&call.name) => {
                    return Err(AgentError::InterruptParse(format!(
                        "missing decision for interrupt {}",
                        call.id
                    )));
                }
                None => to_run.push(call),
            }
        }

        let mut budget = ToolCallBudget::resume(self.tool_call_cap, ctx.state.tool_calls_used);
        let mut outcomes = rejected;
        outcomes.extend(self.tools.execute_batch(&to_run).await);
        self.record_outcomes(ctx, &mut budget, to_run.len(), outcomes);
        self.reasoning_loop(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::llm::ScriptedLlmClient;
    use crate::memory::MessageKind;
    use crate::react::events::Namespace;
    use crate::tools::{AppActionTool, ChartTool, EchoTool, ToolRegistry};
    use crate::workflow::Decision;

    fn tools() -> Arc<ToolExecutor> {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        reg.register(ChartTool);
        reg.register(AppActionTool::new("create_program", "Create a program"));
        Arc::new(ToolExecutor::new(reg, 5))
    }

    fn state() -> ExecutionState {
        let mut s = ExecutionState::new("t");
        s.log.push(Message::user("do it"));
        s
    }

    #[tokio::test]
    async fn test_tool_then_answer() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .reply(r#"{"tool": "echo", "args": {"text": "pong"}}"#)
                .reply("All done."),
        );
        let ex = ReactExecutor::new(AgentType::Research, llm.clone(), tools(), "sys");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut st = state();
        let mut ctx = ExecutorContext {
            state: &mut st,
            events: Some(tx),
            cancel: CancellationToken::new(),
        };
        let out = ex.run(&mut ctx).await.unwrap();
        assert_eq!(out, ExecutorOutcome::Completed { final_text: "All done.".into() });
        assert_eq!(st.tool_calls_used, 1);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.namespace, Namespace::Executor(AgentType::Research));
        assert!(matches!(first.node, Node::Reasoning { .. }));
        assert!(matches!(rx.recv().await.unwrap().node, Node::ToolsExecuted { .. }));

        let second_request = &llm.requests()[1];
        assert!(second_request
            .messages
            .iter()
            .any(|m| m.content.contains("Observation from echo")));
    }

    #[tokio::test]
    async fn test_budget_forces_unbound_answer() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .reply(r#"{"tool": "echo", "args": {"text": "1"}}"#)
                .reply(r#"{"tool": "echo", "args": {"text": "2"}}"#)
                .reply("Final from what I have."),
        );
        let ex = ReactExecutor::new(AgentType::Research, llm.clone(), tools(), "sys").with_tool_call_cap(2);
        let mut st = state();
        let mut ctx = ExecutorContext {
            state: &mut st,
            events: None,
            cancel: CancellationToken::new(),
        };
        let out = ex.run(&mut ctx).await.unwrap();
        assert_eq!(
            out,
            ExecutorOutcome::Completed { final_text: "Final from what I have.".into() }
        );
        let requests = llm.requests();
        assert_eq!(requests.len(), 3);
        assert!(!requests[1].tools.is_empty());
        assert!(requests[2].tools.is_empty());
        assert!(requests[2]
            .messages
            .last()
            .is_some_and(|m| m.content.starts_with("STOP.")));
    }

    #[tokio::test]
    async fn test_chart_payload_scrubbed_in_log_but_forwarded_raw() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .reply(r#"{"tool": "render_chart", "args": {"labels": ["a"], "values": [1]}}"#)
                .reply("Here is your chart."),
        );
        let ex = ReactExecutor::new(AgentType::DataAnalyst, llm, tools(), "sys");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut st = state();
        let mut ctx = ExecutorContext {
            state: &mut st,
            events: Some(tx),
            cancel: CancellationToken::new(),
        };
        ex.run(&mut ctx).await.unwrap();

        let logged = st
            .log
            .effective()
            .into_iter()
            .find(|m| matches!(m.kind, MessageKind::ToolResult { .. }))
            .unwrap();
        assert!(logged.content().contains("[Chart was generated and displayed to user]"));

        rx.recv().await.unwrap();
        match rx.recv().await.unwrap().node {
            Node::ToolsExecuted { results } => assert!(results[0].content.contains("chart-preview")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_approval_suspends_then_resume_with_rejection() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .reply(r#"{"tool_calls": [{"tool": "create_program", "args": {"name": "G"}}, {"tool": "echo", "args": {"text": "x"}}]}"#)
                .reply("Okay, I did not create it."),
        );
        let ex = ReactExecutor::new(AgentType::AppAutomation, llm, tools(), "sys");
        let mut st = state();
        let mut ctx = ExecutorContext {
            state: &mut st,
            events: None,
            cancel: CancellationToken::new(),
        };
        let (interrupts, pending) = match ex.run(&mut ctx).await.unwrap() {
            ExecutorOutcome::Suspended { interrupts, pending_calls } => (interrupts, pending_calls),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(interrupts.len(), 1);
        assert_eq!(interrupts[0].requested_action, "create_program");
        assert_eq!(pending.len(), 2);
        assert_eq!(st.tool_calls_used, 0);

        let mut decisions = DecisionMap::new();
        decisions.insert(interrupts[0].id.clone(), Decision::reject());
        let mut ctx = ExecutorContext {
            state: &mut st,
            events: None,
            cancel: CancellationToken::new(),
        };
        let out = ex.resume(&mut ctx, pending, &decisions).await.unwrap();
        assert!(matches!(out, ExecutorOutcome::Completed { .. }));
        assert!(st
            .log
            .effective()
            .iter()
            .any(|m| m.content() == "create_program action not approved by user"));
        assert_eq!(st.tool_calls_used, 1);
    }

    #[tokio::test]
    async fn test_approved_parameters_replace_request() {
        let action = AppActionTool::new("create_program", "Create a program");
        let performed = action.performed();
        let mut reg = ToolRegistry::new();
        reg.register(action);
        let tools = Arc::new(ToolExecutor::new(reg, 5));
        let llm = Arc::new(ScriptedLlmClient::new().reply("Created."));
        let ex = ReactExecutor::new(AgentType::AppAutomation, llm, tools, "sys");

        let call = ToolCall::new("create_program", json!({"name": "Old"}));
        let mut decisions = DecisionMap::new();
        decisions.insert(
            call.id.clone(),
            Decision {
                action: "approve".into(),
                parameters: Some(json!({"name": "New"})),
            },
        );
        let mut st = state();
        let mut ctx = ExecutorContext {
            state: &mut st,
            events: None,
            cancel: CancellationToken::new(),
        };
        ex.resume(&mut ctx, vec![call], &decisions).await.unwrap();
        assert_eq!(performed.lock().unwrap()[0], json!({"name": "New"}));
    }

    #[tokio::test]
    async fn test_reasoning_failure_falls_back_to_forced_answer() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .fail(crate::llm::LlmError::Timeout)
                .reply("Partial answer."),
        );
        let ex = ReactExecutor::new(AgentType::Research, llm, tools(), "sys");
        let mut st = state();
        let mut ctx = ExecutorContext {
            state: &mut st,
            events: None,
            cancel: CancellationToken::new(),
        };
        assert_eq!(
            ex.run(&mut ctx).await.unwrap(),
            ExecutorOutcome::Completed { final_text: "Partial answer.".into() }
        );
    }

    #[tokio::test]
    async fn test_double_failure_surfaces_executor_error() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .fail(crate::llm::LlmError::Timeout)
                .fail(crate::llm::LlmError::Timeout),
        );
        let ex = ReactExecutor::new(AgentType::Research, llm, tools(), "sys");
        let mut st = state();
        let mut ctx = ExecutorContext {
            state: &mut st,
            events: None,
            cancel: CancellationToken::new(),
        };
        assert!(matches!(
            ex.run(&mut ctx).await,
            Err(AgentError::ExecutorFailed { .. })
        ));
    }
}
