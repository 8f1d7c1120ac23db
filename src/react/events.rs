//! 回合内部状态转移
//!
//! 引擎与执行器每完成一个节点就发出一条 Transition（经 mpsc 通道），事件翻译器按顺序消费。
//! 两个命名空间：Root 为顶层节点（规划、步骤切换、各执行器、汇总、建议），
//! Executor(agent) 为执行器内部的推理与工具节点。

use crate::core::StreamFailure;
use crate::memory::ToolCall;
use crate::tools::ToolOutcome;
use crate::workflow::{AgentType, Interrupt, Plan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Root,
    Executor(AgentType),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// 规划完成
    Planned { plan: Plan, first: AgentType },
    /// 步骤切换；next 为 None 表示进入汇总
    StepAdvanced { next: Option<AgentType> },
    /// 顶层执行器完成；terminal 为 true 时其文本即最终回答
    ExecutorFinished {
        agent: AgentType,
        terminal: bool,
        final_text: String,
    },
    /// 执行器内部一次推理产生了待执行的工具调用
    Reasoning { calls: Vec<ToolCall> },
    /// 执行器内部一批工具执行完成（原始载荷，按完成顺序）
    ToolsExecuted { results: Vec<ToolOutcome> },
    /// 汇总器流式输出的一段增量
    AnswerDelta { text: String },
    Summarized { answer: String },
    Suggested { queries: Vec<String> },
    /// 回合挂起等待审批
    Interrupted { interrupts: Vec<Interrupt> },
    /// 审批载荷无法解析，回合以错误回答结束
    InterruptRejected { answer: String },
    Failed(StreamFailure),
    /// 未识别的节点，翻译时忽略
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub namespace: Namespace,
    pub node: Node,
}

impl Transition {
    pub fn root(node: Node) -> Self {
        Self {
            namespace: Namespace::Root,
            node,
        }
    }

    pub fn executor(agent: AgentType, node: Node) -> Self {
        Self {
            namespace: Namespace::Executor(agent),
            node,
        }
    }
}

pub type TransitionSender = tokio::sync::mpsc::UnboundedSender<Transition>;

/// 发送转移；接收端已关闭（客户端断开）时静默丢弃，回合照常继续
pub fn send_transition(tx: &Option<TransitionSender>, transition: Transition) {
    if let Some(t) = tx {
        let _ = t.send(transition);
    }
}
