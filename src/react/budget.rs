//! 工具调用预算
//!
//! 每次执行器调用一个计数器，对照硬上限。用尽后下一次推理不绑定任何工具，并附加强制作答指令；
//! 已请求的一整批调用不会被中途截断，所以总调用数最多为「上限 + 最后一批的大小」。
//! 计数随 ExecutionState 持久化，作为参数显式传入执行器，不挂在共享的工具实例上。

pub const FORCE_ANSWER_INSTRUCTION: &str = "STOP. You have reached the maximum number of tool calls. \
Synthesize all the information you have gathered and provide your final answer NOW. \
Do NOT call any more tools.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolCallBudget {
    cap: usize,
    used: usize,
}

impl ToolCallBudget {
    pub fn new(cap: usize) -> Self {
        Self { cap, used: 0 }
    }

    /// 从检查点恢复已用次数
    pub fn resume(cap: usize, used: usize) -> Self {
        Self { cap, used }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn exhausted(&self) -> bool {
        self.used >= self.cap
    }

    /// 记录一整批调用；返回本批是否越过上限（仍全部执行）
    pub fn record_batch(&mut self, calls: usize) -> bool {
        let over = self.used + calls > self.cap;
        if over {
            tracing::warn!(
                used = self.used,
                batch = calls,
                cap = self.cap,
                "Tool batch exceeds budget, running in full"
            );
        }
        self.used += calls;
        over
    }
}
