//! 步骤路由与步骤切换
//!
//! - route：(plan, 游标) 的纯函数，越界即路由到汇总器
//! - removal_set：当前可见的全部步骤指令与工具结果；用户消息和执行器的文字回答永不移除
//! - prune：移除 removal_set，新计划开始、步骤切换和终结型执行器完成时都会调用
//! - start_plan / advance：写入步骤指令、推进游标，返回下一个执行器

use crate::core::ExecutionState;
use crate::memory::{Message, MessageLog};
use crate::workflow::types::{AgentType, Destination, Plan};

pub fn route(plan: &Plan, index: usize) -> Destination {
    match plan.get(index) {
        Some(step) => Destination::Agent(step.agent_type),
        None => Destination::Summarizer,
    }
}

/// 当前步骤指令，后续步骤逐行预告，避免当前执行器越权做后面的事
pub fn format_plan_message(plan: &Plan, index: usize) -> Option<String> {
    let current = plan.get(index)?;
    let mut lines = vec![format!(
        "[TASK_DESCRIPTION] for {}: {} [END TASK_DESCRIPTION].",
        current.agent_type, current.task_description
    )];
    for step in plan.steps().iter().skip(index + 1) {
        lines.push(format!(
            "[NEXT_TASK_DESCRIPTION] for {}: {} [END NEXT_TASK_DESCRIPTION].",
            step.agent_type, step.task_description
        ));
    }
    Some(lines.join("\n"))
}

pub fn removal_set(log: &MessageLog) -> Vec<String> {
    log.effective()
        .into_iter()
        .filter(Message::is_prunable)
        .map(|m| m.id)
        .collect()
}

/// 移除旧指令与工具结果，返回移除条数
pub fn prune(state: &mut ExecutionState) -> usize {
    let stale = removal_set(&state.log);
    state.log.remove(&stale)
}

/// 写入新计划并注入第 0 步指令，返回首个执行器；
/// 上一回合因终结型执行器、失败或取消而遗留的指令先被清掉
pub fn start_plan(state: &mut ExecutionState, plan: Plan) -> AgentType {
    let removed = prune(state);
    if removed > 0 {
        tracing::debug!(removed, "Pruned leftovers from previous turn");
    }
    let first = match route(&plan, 0) {
        Destination::Agent(agent) => agent,
        Destination::Summarizer => AgentType::Conversational,
    };
    if let Some(instruction) = format_plan_message(&plan, 0) {
        state.log.push(Message::plan_instruction(instruction));
    }
    state.plan = Some(plan);
    state.step_index = 0;
    state.current_agent = Some(first);
    state.tool_calls_used = 0;
    first
}

/// 执行器正常完成后调用：剪枝、游标 +1；仍有步骤则注入下一条指令并返回其执行器，否则返回 None（done）
pub fn advance(state: &mut ExecutionState) -> Option<AgentType> {
    let removed = prune(state);
    state.step_index += 1;
    state.tool_calls_used = 0;

    let next = state
        .plan
        .as_ref()
        .map(|plan| (route(plan, state.step_index), format_plan_message(plan, state.step_index)));
    match next {
        Some((Destination::Agent(agent), instruction)) => {
            if let Some(text) = instruction {
                state.log.push(Message::plan_instruction(text));
            }
            tracing::info!(step = state.step_index, agent = %agent, removed, "Moving to next plan step");
            state.current_agent = Some(agent);
            Some(agent)
        }
        _ => {
            tracing::info!(steps = state.step_index, removed, "Plan complete");
            state.current_agent = None;
            None
        }
    }
}
