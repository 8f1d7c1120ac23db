//! 记忆层：只追加的消息日志与检查点持久化

pub mod conversation;
pub mod persistence;

pub use conversation::{to_chat_messages, LogEntry, Message, MessageKind, MessageLog, ToolCall};
pub use persistence::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
