//! LLM 层：客户端抽象、OpenAI 兼容实现、Mock 与结构化输出

pub mod mock;
pub mod openai;
pub mod structured;
pub mod traits;

pub use mock::{EchoLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use structured::{complete_structured, extract_json, schema_json};
pub use traits::{
    ChatMessage, CompletionRequest, LlmClient, LlmError, Role, TokenStream, ToolSpec,
};
