//! 计划驱动的回合编排：执行器类型与计划、步骤路由、审批中断、进行中回合登记、回合引擎

pub mod builder;
pub mod engine;
pub mod graph;
pub mod interrupt;
pub mod live;
pub mod types;

pub use builder::TurnEngineBuilder;
pub use engine::{TurnEngine, TurnInput};
pub use graph::{advance, format_plan_message, prune, removal_set, route, start_plan};
pub use live::{Attach, LiveTurn, LiveTurns};
pub use interrupt::{
    approval_request_text, decision_template, parse_decision_map, parse_failure_answer, Decision, DecisionMap,
    Interrupt, APPROVAL_PROMPT,
};
pub use types::{AgentType, Destination, Plan, PlanStep};
