//! 工具箱：注册表、执行器（超时 / 审计 / 并发批次）与内置工具

pub mod app_action;
pub mod chart;
pub mod echo;
pub mod executor;
pub mod knowledge;
pub mod registry;
pub mod schema;

pub use app_action::AppActionTool;
pub use chart::ChartTool;
pub use echo::EchoTool;
pub use executor::{ToolExecutor, ToolOutcome};
pub use knowledge::{KnowledgeDocument, KnowledgeSearchTool, KNOWLEDGE_SEARCH_TOOL};
pub use registry::{Tool, ToolRegistry};
pub use schema::tool_call_schema_json;
