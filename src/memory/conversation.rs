//! 消息日志
//!
//! 日志只追加：新增消息写入 `LogEntry::Append`，删除写入 `LogEntry::Remove(id)` 标记。
//! `effective()` 是纯归约，折叠删除标记得到执行器实际可见的消息列表；
//! 观察者（事件翻译器）读到的永远是某一时刻的完整日志快照，不会与修改方共享可变状态。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::ChatMessage;

/// 执行器请求的一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            args,
        }
    }
}

/// 消息体
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    User {
        content: String,
    },
    /// tool_calls 非空表示仍有待执行的工具调用
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    /// 合成的步骤指令，步骤切换时整体移除
    PlanInstruction {
        content: String,
    },
    SystemPreamble {
        content: String,
    },
}

/// 日志中的一条消息（id 全局唯一）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(flatten)]
    pub kind: MessageKind,
}

impl Message {
    fn with_kind(kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_kind(MessageKind::User {
            content: content.into(),
        })
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_kind(MessageKind::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        })
    }

    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::with_kind(MessageKind::Assistant {
            content: content.into(),
            tool_calls,
        })
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::with_kind(MessageKind::ToolResult {
            call_id: call_id.into(),
            name: name.into(),
            content: content.into(),
            is_error,
        })
    }

    pub fn plan_instruction(content: impl Into<String>) -> Self {
        Self::with_kind(MessageKind::PlanInstruction {
            content: content.into(),
        })
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_kind(MessageKind::SystemPreamble {
            content: content.into(),
        })
    }

    pub fn content(&self) -> &str {
        match &self.kind {
            MessageKind::User { content }
            | MessageKind::Assistant { content, .. }
            | MessageKind::ToolResult { content, .. }
            | MessageKind::PlanInstruction { content }
            | MessageKind::SystemPreamble { content } => content,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self.kind, MessageKind::User { .. })
    }

    /// 步骤切换时应被移除的合成消息（指令与工具结果）
    pub fn is_prunable(&self) -> bool {
        matches!(
            self.kind,
            MessageKind::PlanInstruction { .. } | MessageKind::ToolResult { .. }
        )
    }

    /// 叙述性消息：用户消息，或不带待执行工具调用的非空 Assistant 回复
    pub fn is_narrative(&self) -> bool {
        match &self.kind {
            MessageKind::User { content } => !content.trim().is_empty(),
            MessageKind::Assistant {
                content,
                tool_calls,
            } => tool_calls.is_empty() && !content.trim().is_empty(),
            _ => false,
        }
    }

    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        match &self.kind {
            MessageKind::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// 转为发往 LLM 的消息；工具调用与结果以文本形式回放，步骤指令以用户身份出现
    pub fn to_chat(&self) -> ChatMessage {
        match &self.kind {
            MessageKind::User { content } => ChatMessage::user(content.clone()),
            MessageKind::Assistant {
                content,
                tool_calls,
            } if tool_calls.is_empty() => ChatMessage::assistant(content.clone()),
            MessageKind::Assistant { tool_calls, .. } => {
                let calls: Vec<serde_json::Value> = tool_calls
                    .iter()
                    .map(|c| serde_json::json!({"id": c.id, "tool": c.name, "args": c.args}))
                    .collect();
                ChatMessage::assistant(serde_json::json!({ "tool_calls": calls }).to_string())
            }
            MessageKind::ToolResult {
                call_id,
                name,
                content,
                ..
            } => ChatMessage::user(format!("Observation from {name} ({call_id}): {content}")),
            MessageKind::PlanInstruction { content } => ChatMessage::user(content.clone()),
            MessageKind::SystemPreamble { content } => ChatMessage::system(content.clone()),
        }
    }
}

/// 日志条目
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LogEntry {
    Append { message: Message },
    Remove { id: String },
}

/// 只追加的消息日志
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageLog {
    entries: Vec<LogEntry>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn push(&mut self, message: Message) {
        self.entries.push(LogEntry::Append { message });
    }

    /// 为当前仍可见的 id 写入删除标记，返回实际写入的数量；已删除或不存在的 id 被忽略
    pub fn remove(&mut self, ids: &[String]) -> usize {
        let visible: HashSet<String> = self.effective().into_iter().map(|m| m.id).collect();
        let mut written = HashSet::new();
        for id in ids {
            if visible.contains(id) && written.insert(id.clone()) {
                self.entries.push(LogEntry::Remove { id: id.clone() });
            }
        }
        written.len()
    }

    /// 折叠删除标记得到的可见消息列表（按追加顺序）
    pub fn effective(&self) -> Vec<Message> {
        let removed: HashSet<&str> = self
            .entries
            .iter()
            .filter_map(|e| match e {
                LogEntry::Remove { id } => Some(id.as_str()),
                LogEntry::Append { .. } => None,
            })
            .collect();
        self.entries
            .iter()
            .filter_map(|e| match e {
                LogEntry::Append { message } if !removed.contains(message.id.as_str()) => {
                    Some(message.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// 最后一条真实用户消息及其之后的可见消息
    pub fn since_last_user(&self) -> Vec<Message> {
        let effective = self.effective();
        let start = effective.iter().rposition(Message::is_user).unwrap_or(0);
        effective[start..].to_vec()
    }

    pub fn last_user_content(&self) -> Option<String> {
        self.effective()
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(|m| m.content().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.effective().is_empty()
    }
}

/// 将消息列表转为 LLM 请求消息
pub fn to_chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages.iter().map(Message::to_chat).collect()
}
