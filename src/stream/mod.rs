//! 流式事件协议：内部转移 -> 客户端事件 -> SSE 帧

pub mod mux;
pub mod protocol;
pub mod translator;

pub use mux::{reconnect, stream_turn, FrameStream, StreamOptions};
pub use protocol::{
    EventFrame, InvocationState, KnowledgeItem, ProtocolEvent, StreamFrame, ToolInvocation, DONE_SENTINEL,
};
pub use translator::{AnswerMode, EventTranslator};
