//! 认知层：规划、执行器主循环、汇总与建议
//!
//! 执行器经 TaskExecutor 契约接入；每个节点完成时发出 Transition，供事件翻译器消费。

pub mod budget;
pub mod conversational;
pub mod events;
pub mod hygiene;
pub mod loop_;
pub mod parse;
pub mod planner;
pub mod prompts;
pub mod suggest;
pub mod summarizer;

pub use budget::{ToolCallBudget, FORCE_ANSWER_INSTRUCTION};
pub use conversational::ConversationalExecutor;
pub use events::{send_transition, Namespace, Node, Transition, TransitionSender};
pub use hygiene::scrub_tool_payload;
pub use loop_::{ExecutorContext, ExecutorOutcome, ReactExecutor, TaskExecutor};
pub use parse::{parse_reasoning_output, ReasoningOutput};
pub use planner::Planner;
pub use suggest::SuggestionGenerator;
pub use summarizer::Summarizer;
