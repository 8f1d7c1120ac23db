//! 执行状态
//!
//! ExecutionState 是每个 thread 的检查点快照：消息日志、当前计划与游标、回合阶段、挂起信息。
//! 引擎每完成一个阶段即整体写回检查点，进程重启或客户端重连后从 `stage` 继续。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::files::AttachedFile;
use crate::memory::{MessageLog, ToolCall};
use crate::workflow::{AgentType, Interrupt, Plan};

/// 回合阶段
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    /// 尚无回合
    #[default]
    Idle,
    /// 计划已生成，正在执行 `step_index` 对应的执行器
    Executing,
    /// 所有步骤完成，等待汇总
    Summarizing,
    /// 回答已产出，等待生成建议
    Suggesting,
    /// 等待审批决策
    Suspended,
    Complete,
}

/// 挂起时保存的最小恢复信息：哪个执行器、哪些待决调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suspension {
    pub agent: AgentType,
    pub interrupts: Vec<Interrupt>,
    /// 与中断同批请求的全部工具调用（含无需审批的），恢复后一并执行
    pub pending_calls: Vec<ToolCall>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub thread_id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub log: MessageLog,
    pub plan: Option<Plan>,
    pub step_index: usize,
    pub stage: TurnStage,
    /// 当前执行器；None 即 "done"（路由到汇总器）
    pub current_agent: Option<AgentType>,
    /// 最近完成的执行器，供建议生成判断
    pub last_agent: Option<AgentType>,
    pub suspension: Option<Suspension>,
    /// 本回合最终回答（汇总器或终结型执行器产出）
    pub final_answer: Option<String>,
    /// 终结型执行器完成时为 true，跳过汇总
    #[serde(default)]
    pub terminal_answer: bool,
    #[serde(default)]
    pub attachments: Vec<AttachedFile>,
    /// 当前执行器调用已使用的工具调用次数；新回合与新步骤清零
    #[serde(default)]
    pub tool_calls_used: usize,
    /// 本回合原始用户输入（不含文件上下文）
    pub query: String,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            tenant_id: None,
            log: MessageLog::new(),
            plan: None,
            step_index: 0,
            stage: TurnStage::Idle,
            current_agent: None,
            last_agent: None,
            suspension: None,
            final_answer: None,
            terminal_answer: false,
            attachments: Vec::new(),
            tool_calls_used: 0,
            query: String::new(),
            updated_at: Utc::now(),
        }
    }

    /// 开始新回合：清空回合级字段，保留消息日志
    pub fn begin_turn(&mut self, query: impl Into<String>, attachments: Vec<AttachedFile>) {
        self.plan = None;
        self.step_index = 0;
        self.stage = TurnStage::Idle;
        self.current_agent = None;
        self.last_agent = None;
        self.suspension = None;
        self.final_answer = None;
        self.terminal_answer = false;
        self.attachments = attachments;
        self.tool_calls_used = 0;
        self.query = query.into();
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_suspended(&self) -> bool {
        self.stage == TurnStage::Suspended && self.suspension.is_some()
    }

    /// 回合是否已开始且尚未结束（可从检查点继续）
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.stage,
            TurnStage::Executing | TurnStage::Summarizing | TurnStage::Suggesting
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;

    #[test]
    fn test_begin_turn_resets_turn_scope_but_keeps_log() {
        let mut state = ExecutionState::new("t1");
        state.log.push(Message::user("old"));
        state.tool_calls_used = 5;
        state.stage = TurnStage::Complete;
        state.last_agent = Some(AgentType::Onboarding);

        state.begin_turn("new", Vec::new());
        assert_eq!(state.tool_calls_used, 0);
        assert_eq!(state.stage, TurnStage::Idle);
        assert_eq!(state.last_agent, None);
        assert_eq!(state.log.effective().len(), 1);
        assert_eq!(state.query, "new");
    }

    #[test]
    fn test_json_round_trip_keeps_timestamp() {
        let mut state = ExecutionState::new("t1");
        state.stage = TurnStage::Suggesting;
        let json = serde_json::to_string(&state).unwrap();
        let back: ExecutionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.updated_at, state.updated_at);
        assert_eq!(back, state);
    }

    #[test]
    fn test_in_flight_stages() {
        let mut state = ExecutionState::new("t1");
        assert!(!state.is_in_flight());
        state.stage = TurnStage::Summarizing;
        assert!(state.is_in_flight());
        state.stage = TurnStage::Suspended;
        assert!(!state.is_in_flight());
        assert!(!state.is_suspended());
    }
}
