//! 核心层：错误分类与执行状态

pub mod error;
pub mod recovery;
pub mod state;

pub use error::AgentError;
pub use recovery::{classify_error, StreamFailure};
pub use state::{ExecutionState, Suspension, TurnStage};
