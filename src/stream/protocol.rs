//! 客户端事件协议
//!
//! 每个 ProtocolEvent 以 `stage` 区分；线上帧为 SSE `data: <json>\n\n`，
//! 事件帧额外携带 seq（每条流从 1 开始）、query、processing_time_ms。
//! 流以 `{"type":"start","message_id":...}` 开头，以 `data: [DONE]\n\n` 结束。

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::StreamFailure;

pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationState {
    Call,
    Result,
}

/// 工具调用载荷（call：id/name/args；result：同一 id 与解析后的结果）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub state: InvocationState,
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ToolInvocation {
    pub fn call(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            state: InvocationState::Call,
            tool_call_id: id.into(),
            tool_name: name.into(),
            args: Some(args),
            result: None,
        }
    }

    pub fn result(id: impl Into<String>, name: impl Into<String>, result: Value) -> Self {
        Self {
            state: InvocationState::Result,
            tool_call_id: id.into(),
            tool_name: name.into(),
            args: None,
            result: Some(result),
        }
    }
}

/// 检索到的知识条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: Value,
    pub title: String,
    pub content: String,
    pub source_type: String,
    #[serde(default)]
    pub source_item_id: String,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub metadata: Value,
    /// ISO-8601；文档未提供时取构造时刻
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_synced_at: Option<String>,
    #[serde(default = "default_visibility")]
    pub visibility: String,
}

fn default_visibility() -> String {
    "public".to_string()
}

impl KnowledgeItem {
    /// 从工具结果中的文档对象构造；缺省字段按 "Untitled" / "unknown" / "public" 补齐
    pub fn from_document(id: Value, doc: &Value) -> Self {
        let text = |key: &str, default: &str| {
            doc.get(key)
                .and_then(Value::as_str)
                .unwrap_or(default)
                .to_string()
        };
        Self {
            id,
            title: text("title", "Untitled"),
            content: text("content", ""),
            source_type: text("source_type", "unknown"),
            source_item_id: text("source_item_id", ""),
            distance: doc.get("distance").and_then(Value::as_f64).unwrap_or(0.0),
            metadata: doc.get("metadata").cloned().unwrap_or(Value::Object(Default::default())),
            created_at: doc
                .get("created_at")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Utc::now().to_rfc3339()),
            last_synced_at: doc
                .get("last_synced_at")
                .and_then(Value::as_str)
                .map(str::to_string),
            visibility: text("visibility", "public"),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ProtocolEvent {
    Routing {
        routed_agent: String,
    },
    Documents {
        documents: Vec<KnowledgeItem>,
        total_documents: usize,
    },
    ToolCall {
        tool_invocation: ToolInvocation,
    },
    Answer {
        answer: String,
        /// 分块模式下的中间块
        #[serde(default, skip_serializing_if = "is_false")]
        partial: bool,
    },
    SuggestedQueries {
        suggested_queries: Vec<String>,
    },
    Error {
        error_code: u16,
        error_message: String,
        retryable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after: Option<f64>,
    },
    Reconnecting {
        message: String,
    },
}

impl ProtocolEvent {
    pub fn stage(&self) -> &'static str {
        match self {
            ProtocolEvent::Routing { .. } => "routing",
            ProtocolEvent::Documents { .. } => "documents",
            ProtocolEvent::ToolCall { .. } => "tool_call",
            ProtocolEvent::Answer { .. } => "answer",
            ProtocolEvent::SuggestedQueries { .. } => "suggested_queries",
            ProtocolEvent::Error { .. } => "error",
            ProtocolEvent::Reconnecting { .. } => "reconnecting",
        }
    }

    pub fn answer(text: impl Into<String>) -> Self {
        ProtocolEvent::Answer {
            answer: text.into(),
            partial: false,
        }
    }

    pub fn error(failure: &StreamFailure) -> Self {
        ProtocolEvent::Error {
            error_code: failure.code,
            error_message: failure.message.clone(),
            retryable: failure.retryable,
            retry_after: failure.retry_after,
        }
    }
}

/// 事件帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub seq: u64,
    pub query: String,
    pub processing_time_ms: f64,
    #[serde(flatten)]
    pub event: ProtocolEvent,
}

/// 流上的一帧
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Start { message_id: String },
    Event(EventFrame),
    Done,
}

impl StreamFrame {
    pub fn event(&self) -> Option<&ProtocolEvent> {
        match self {
            StreamFrame::Event(f) => Some(&f.event),
            _ => None,
        }
    }

    /// 帧的 JSON 载荷；结束标记为 `[DONE]`
    pub fn payload(&self) -> String {
        match self {
            StreamFrame::Start { message_id } => {
                serde_json::json!({ "type": "start", "message_id": message_id }).to_string()
            }
            StreamFrame::Event(frame) => serde_json::to_string(frame).unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to encode event frame");
                serde_json::json!({
                    "seq": frame.seq,
                    "stage": "error",
                    "query": frame.query,
                    "error_code": 500,
                    "error_message": "Failed to encode event",
                    "retryable": false,
                })
                .to_string()
            }),
            StreamFrame::Done => DONE_SENTINEL.to_string(),
        }
    }

    /// SSE 编码：`data: <payload>\n\n`
    pub fn to_sse(&self) -> String {
        format!("data: {}\n\n", self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_frame_is_flat() {
        let frame = StreamFrame::Event(EventFrame {
            seq: 3,
            query: "hi".into(),
            processing_time_ms: 1.5,
            event: ProtocolEvent::Routing {
                routed_agent: "research".into(),
            },
        });
        let v: Value = serde_json::from_str(&frame.payload()).unwrap();
        assert_eq!(
            v,
            json!({"seq": 3, "query": "hi", "processing_time_ms": 1.5, "stage": "routing", "routed_agent": "research"})
        );
    }

    #[test]
    fn test_tool_invocation_field_names() {
        let v = serde_json::to_value(ProtocolEvent::ToolCall {
            tool_invocation: ToolInvocation::call("c1", "echo", json!({"text": "x"})),
        })
        .unwrap();
        assert_eq!(v["tool_invocation"]["toolCallId"], "c1");
        assert_eq!(v["tool_invocation"]["toolName"], "echo");
        assert_eq!(v["tool_invocation"]["state"], "call");
        assert!(v["tool_invocation"].get("result").is_none());
    }

    #[test]
    fn test_partial_flag_only_when_set() {
        let full = serde_json::to_value(ProtocolEvent::answer("done")).unwrap();
        assert!(full.get("partial").is_none());
        let part = serde_json::to_value(ProtocolEvent::Answer {
            answer: "do".into(),
            partial: true,
        })
        .unwrap();
        assert_eq!(part["partial"], true);
    }

    #[test]
    fn test_sse_encoding() {
        assert_eq!(StreamFrame::Done.to_sse(), "data: [DONE]\n\n");
        let start = StreamFrame::Start {
            message_id: "m1".into(),
        }
        .to_sse();
        assert!(start.starts_with("data: {"));
        assert!(start.ends_with("}\n\n"));
        assert!(start.contains("\"type\":\"start\""));
    }

    #[test]
    fn test_knowledge_item_defaults() {
        let item = KnowledgeItem::from_document(json!(7), &json!({"content": "body"}));
        assert_eq!(item.title, "Untitled");
        assert_eq!(item.source_type, "unknown");
        assert_eq!(item.id, json!(7));
        assert_eq!(item.visibility, "public");
        assert!(item.last_synced_at.is_none());
        assert!(chrono::DateTime::parse_from_rfc3339(&item.created_at).is_ok());

        let wire = serde_json::to_value(&item).unwrap();
        assert_eq!(wire["last_synced_at"], Value::Null);
        assert_eq!(wire["visibility"], json!("public"));
    }

    #[test]
    fn test_knowledge_item_keeps_document_timestamps() {
        let item = KnowledgeItem::from_document(
            json!("d1"),
            &json!({
                "created_at": "2024-01-02T03:04:05Z",
                "last_synced_at": "2024-02-01T00:00:00Z",
                "visibility": "private"
            }),
        );
        assert_eq!(item.created_at, "2024-01-02T03:04:05Z");
        assert_eq!(item.last_synced_at.as_deref(), Some("2024-02-01T00:00:00Z"));
        assert_eq!(item.visibility, "private");
    }
}
