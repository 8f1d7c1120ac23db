//! 回合引擎
//!
//! 一个回合是按 TurnStage 推进的状态机：规划 -> 逐步执行 -> 汇总 -> 建议 -> 完成，
//! 执行器请求审批时停在 Suspended。每完成一个阶段就把 ExecutionState 整体写回检查点，
//! 所以进程重启或重连后可以从 `stage` 继续，已完成的步骤不会重跑。
//!
//! 每个节点完成时发出一条 Transition；监听端断开时发送被静默丢弃，回合照常运行并持久化。
//! 驱动期间 thread 登记在 LiveTurns 中，转移同时广播；重连遇到仍在运行的回合时只旁听，不重跑。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::core::{classify_error, AgentError, ExecutionState, Suspension, TurnStage};
use crate::files::{format_files_for_context, message_with_context, AttachedFile, FileProcessor};
use crate::memory::{CheckpointStore, Message};
use crate::react::{
    send_transition, ExecutorContext, ExecutorOutcome, Node, Planner, SuggestionGenerator, Summarizer,
    TaskExecutor, Transition, TransitionSender,
};
use crate::workflow::graph::{advance, prune, start_plan};
use crate::workflow::interrupt::{parse_decision_map, parse_failure_answer};
use crate::workflow::live::{Attach, LiveTurn, LiveTurns};
use crate::workflow::types::AgentType;

/// 一次用户输入
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub thread_id: String,
    pub tenant_id: Option<String>,
    /// 用户消息；线程挂起时为审批决策表 JSON
    pub message: String,
    pub attached_files: Vec<AttachedFile>,
}

impl TurnInput {
    pub fn new(thread_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_files(mut self, files: Vec<AttachedFile>) -> Self {
        self.attached_files = files;
        self
    }
}

pub struct TurnEngine {
    pub(crate) planner: Planner,
    pub(crate) executors: HashMap<AgentType, Arc<dyn TaskExecutor>>,
    /// 未注册类型的退路（对话执行器）
    pub(crate) fallback: Arc<dyn TaskExecutor>,
    pub(crate) summarizer: Summarizer,
    pub(crate) suggestions: SuggestionGenerator,
    pub(crate) checkpoints: Arc<dyn CheckpointStore>,
    pub(crate) files: Option<Arc<dyn FileProcessor>>,
    pub(crate) live: LiveTurns,
}

impl TurnEngine {
    pub fn checkpoints(&self) -> Arc<dyn CheckpointStore> {
        Arc::clone(&self.checkpoints)
    }

    /// 该 thread 当前是否有回合在运行
    pub fn is_live(&self, thread_id: &str) -> bool {
        self.live.is_live(thread_id)
    }

    /// 处理一条用户输入；任何未在组件边界恢复的错误都以 Failed 转移发出后返回。
    /// 同一 thread 已有回合在运行时返回 ThreadBusy
    pub async fn run_turn(
        &self,
        input: TurnInput,
        events: Option<TransitionSender>,
        cancel: CancellationToken,
    ) -> Result<ExecutionState, AgentError> {
        let thread_id = input.thread_id.clone();
        let live = match self.live.attach(&thread_id) {
            Attach::Lead(live) => live,
            Attach::Follow(_) => {
                tracing::warn!(thread_id = %thread_id, "Turn already in progress");
                return self.report(&thread_id, Err(AgentError::ThreadBusy(thread_id.clone())), &events);
            }
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let drive = async move {
            let inner = Some(tx);
            let result = self.drive_turn(input, &inner, &cancel).await;
            self.report(&thread_id, result, &inner)
        };
        let (result, ()) = tokio::join!(drive, fan_out(rx, events, &live));
        result
    }

    /// 重连：回合仍在运行时旁听其后续转移；否则挂起的线程重新发出审批请求，
    /// 未完成的回合从检查点阶段继续，其余情况不做任何事
    pub async fn continue_thread(
        &self,
        thread_id: &str,
        events: Option<TransitionSender>,
        cancel: CancellationToken,
    ) -> Result<ExecutionState, AgentError> {
        let live = match self.live.attach(thread_id) {
            Attach::Lead(live) => live,
            Attach::Follow(feed) => {
                tracing::info!(thread_id = %thread_id, "Turn still running, following live feed");
                follow(feed, &events, &cancel).await;
                let result = self
                    .checkpoints
                    .get(thread_id)
                    .await
                    .and_then(|s| s.ok_or_else(|| AgentError::ThreadNotFound(thread_id.to_string())));
                return self.report(thread_id, result, &events);
            }
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let drive = async move {
            let inner = Some(tx);
            let result = self.drive_continue(thread_id, &inner, &cancel).await;
            self.report(thread_id, result, &inner)
        };
        let (result, ()) = tokio::join!(drive, fan_out(rx, events, &live));
        result
    }

    fn report(
        &self,
        thread_id: &str,
        result: Result<ExecutionState, AgentError>,
        events: &Option<TransitionSender>,
    ) -> Result<ExecutionState, AgentError> {
        if let Err(e) = &result {
            tracing::error!(thread_id = %thread_id, error = %e, "Turn failed");
            send_transition(events, Transition::root(Node::Failed(classify_error(e))));
        }
        result
    }

    async fn drive_turn(
        &self,
        input: TurnInput,
        events: &Option<TransitionSender>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionState, AgentError> {
        let mut state = self
            .checkpoints
            .get(&input.thread_id)
            .await?
            .unwrap_or_else(|| ExecutionState::new(input.thread_id.clone()));
        if input.tenant_id.is_some() {
            state.tenant_id = input.tenant_id.clone();
        }

        if state.is_suspended() {
            return self.resume_suspended(state, &input.message, events, cancel).await;
        }

        tracing::info!(thread_id = %state.thread_id, "Starting turn");
        let full_message = self.inline_files(&input).await;
        state.begin_turn(input.message.clone(), input.attached_files.clone());
        state.log.push(Message::user(full_message));

        let plan = self.planner.plan(&state.log).await;
        let first = start_plan(&mut state, plan.clone());
        state.stage = TurnStage::Executing;
        self.checkpoint(&mut state).await?;
        send_transition(events, Transition::root(Node::Planned { plan, first }));

        self.run_stages(&mut state, events, cancel).await?;
        Ok(state)
    }

    async fn drive_continue(
        &self,
        thread_id: &str,
        events: &Option<TransitionSender>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionState, AgentError> {
        let mut state = self
            .checkpoints
            .get(thread_id)
            .await?
            .ok_or_else(|| AgentError::ThreadNotFound(thread_id.to_string()))?;
        tracing::info!(thread_id = %thread_id, stage = ?state.stage, "Continuing thread");

        if state.is_suspended() {
            let interrupts = state
                .suspension
                .as_ref()
                .map(|s| s.interrupts.clone())
                .unwrap_or_default();
            send_transition(events, Transition::root(Node::Interrupted { interrupts }));
        } else if state.is_in_flight() {
            self.run_stages(&mut state, events, cancel).await?;
        }
        Ok(state)
    }

    /// 审批恢复：解析决策表，失败则以错误回答结束并保持挂起；成功则回到挂起的执行器，不重新规划
    async fn resume_suspended(
        &self,
        mut state: ExecutionState,
        payload: &str,
        events: &Option<TransitionSender>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionState, AgentError> {
        let Some(suspension) = state.suspension.clone() else {
            return Ok(state);
        };
        let decisions = match parse_decision_map(payload, &suspension.interrupts) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(thread_id = %state.thread_id, error = %e, "Rejected approval payload");
                send_transition(
                    events,
                    Transition::root(Node::InterruptRejected {
                        answer: parse_failure_answer(payload),
                    }),
                );
                return Ok(state);
            }
        };

        tracing::info!(
            thread_id = %state.thread_id,
            agent = %suspension.agent,
            decisions = decisions.len(),
            "Resuming suspended executor"
        );
        let executor = self.executor(suspension.agent);
        state.suspension = None;
        state.stage = TurnStage::Executing;
        state.current_agent = Some(suspension.agent);

        let outcome = {
            let mut ctx = ExecutorContext {
                state: &mut state,
                events: events.clone(),
                cancel: cancel.clone(),
            };
            executor
                .resume(&mut ctx, suspension.pending_calls, &decisions)
                .await?
        };
        self.after_executor(&mut state, executor.as_ref(), outcome, events)
            .await?;
        self.run_stages(&mut state, events, cancel).await?;
        Ok(state)
    }

    /// 从当前阶段推进到 Complete 或 Suspended
    async fn run_stages(
        &self,
        state: &mut ExecutionState,
        events: &Option<TransitionSender>,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        loop {
            if cancel.is_cancelled() {
                tracing::warn!(thread_id = %state.thread_id, stage = ?state.stage, "Turn cancelled");
                return Err(AgentError::Cancelled);
            }
            match state.stage {
                TurnStage::Executing => {
                    let Some(agent) = state.current_agent else {
                        state.stage = TurnStage::Summarizing;
                        continue;
                    };
                    let executor = self.executor(agent);
                    tracing::info!(thread_id = %state.thread_id, step = state.step_index, agent = %agent, "Running executor");
                    let outcome = {
                        let mut ctx = ExecutorContext {
                            state: &mut *state,
                            events: events.clone(),
                            cancel: cancel.clone(),
                        };
                        executor.run(&mut ctx).await?
                    };
                    self.after_executor(state, executor.as_ref(), outcome, events)
                        .await?;
                }
                TurnStage::Summarizing => {
                    let answer = self
                        .summarizer
                        .summarize(&state.log, &state.query, |text| {
                            send_transition(
                                events,
                                Transition::root(Node::AnswerDelta {
                                    text: text.to_string(),
                                }),
                            )
                        })
                        .await;
                    state.log.push(Message::assistant(answer.clone()));
                    state.final_answer = Some(answer.clone());
                    state.stage = TurnStage::Suggesting;
                    self.checkpoint(state).await?;
                    send_transition(events, Transition::root(Node::Summarized { answer }));
                }
                TurnStage::Suggesting => {
                    let fixed = state
                        .last_agent
                        .and_then(|a| self.executor(a).fixed_suggestions());
                    let queries = self.suggestions.suggest(&state.log, fixed).await;
                    state.stage = TurnStage::Complete;
                    self.checkpoint(state).await?;
                    send_transition(events, Transition::root(Node::Suggested { queries }));
                    tracing::info!(thread_id = %state.thread_id, "Turn complete");
                }
                TurnStage::Suspended | TurnStage::Complete | TurnStage::Idle => return Ok(()),
            }
        }
    }

    /// 执行器返回后的状态转移：挂起、终结型直达建议、或推进到下一步/汇总
    async fn after_executor(
        &self,
        state: &mut ExecutionState,
        executor: &dyn TaskExecutor,
        outcome: ExecutorOutcome,
        events: &Option<TransitionSender>,
    ) -> Result<(), AgentError> {
        let agent = executor.agent_type();
        match outcome {
            ExecutorOutcome::Suspended {
                interrupts,
                pending_calls,
            } => {
                tracing::info!(thread_id = %state.thread_id, agent = %agent, count = interrupts.len(), "Turn suspended for approval");
                state.suspension = Some(Suspension {
                    agent,
                    interrupts: interrupts.clone(),
                    pending_calls,
                });
                state.stage = TurnStage::Suspended;
                self.checkpoint(state).await?;
                send_transition(events, Transition::root(Node::Interrupted { interrupts }));
            }
            ExecutorOutcome::Completed { final_text } => {
                let terminal = executor.is_terminal();
                state.last_agent = Some(agent);
                let finished = Transition::root(Node::ExecutorFinished {
                    agent,
                    terminal,
                    final_text: final_text.clone(),
                });
                if terminal {
                    let removed = prune(state);
                    tracing::debug!(thread_id = %state.thread_id, removed, "Pruned after terminal executor");
                    state.final_answer = Some(final_text);
                    state.terminal_answer = true;
                    state.current_agent = None;
                    state.stage = TurnStage::Suggesting;
                    self.checkpoint(state).await?;
                    send_transition(events, finished);
                } else {
                    let next = advance(state);
                    if next.is_none() {
                        state.stage = TurnStage::Summarizing;
                    }
                    self.checkpoint(state).await?;
                    send_transition(events, finished);
                    send_transition(events, Transition::root(Node::StepAdvanced { next }));
                }
            }
        }
        Ok(())
    }

    /// 计划中的执行器未注册时退回对话执行器
    fn executor(&self, agent: AgentType) -> Arc<dyn TaskExecutor> {
        if let Some(e) = self.executors.get(&agent) {
            return Arc::clone(e);
        }
        tracing::warn!(agent = %agent, "No executor registered, using conversational");
        Arc::clone(&self.fallback)
    }

    /// 附件解析失败只记日志，回合以原始消息继续
    async fn inline_files(&self, input: &TurnInput) -> String {
        let Some(processor) = self.files.as_ref().filter(|_| !input.attached_files.is_empty()) else {
            return input.message.clone();
        };
        tracing::info!(count = input.attached_files.len(), "Processing attached files");
        match processor.process(&input.attached_files).await {
            Ok(processed) => {
                let context = format_files_for_context(&processed);
                tracing::info!(chars = context.len(), "File context generated");
                message_with_context(&context, &input.message)
            }
            Err(e) => {
                tracing::warn!(error = %e, "File processing failed, continuing without attachments");
                input.message.clone()
            }
        }
    }

    async fn checkpoint(&self, state: &mut ExecutionState) -> Result<(), AgentError> {
        state.touch();
        self.checkpoints.put(&state.thread_id, state).await
    }
}

/// 驱动者的转移同时送给自己的监听端和旁听者；驱动结束、发送端全部释放后返回
async fn fan_out(
    mut rx: mpsc::UnboundedReceiver<Transition>,
    events: Option<TransitionSender>,
    live: &LiveTurn,
) {
    while let Some(transition) = rx.recv().await {
        live.publish(transition.clone());
        send_transition(&events, transition);
    }
}

/// 旁听直到驱动者结束；旁听端取消只停止旁听，不影响回合本身
async fn follow(
    mut feed: broadcast::Receiver<Transition>,
    events: &Option<TransitionSender>,
    cancel: &CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = feed.recv() => match received {
                Ok(transition) => send_transition(events, transition),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Live feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
