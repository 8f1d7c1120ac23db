//! 推理输出解析
//!
//! 从文本中提取 JSON（```json 块或首个 `{`/`[` 到末尾），接受三种工具调用形态：
//! 单个 `{"tool": ..., "args": ...}`、`{"tool_calls": [...]}`、调用数组。
//! 没有可解析的工具调用即视为最终回答。

use serde::Deserialize;

use crate::llm::extract_json;
use crate::memory::ToolCall;

#[derive(Debug, Clone, PartialEq)]
pub enum ReasoningOutput {
    /// 最终回答（无待执行工具调用）
    Answer(String),
    /// 一批工具调用；preamble 为 JSON 之前的说明文字
    ToolCalls { preamble: String, calls: Vec<ToolCall> },
}

#[derive(Deserialize)]
struct RawCall {
    #[serde(alias = "name")]
    tool: String,
    #[serde(default, alias = "arguments")]
    args: serde_json::Value,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBatch {
    Batch { tool_calls: Vec<RawCall> },
    Many(Vec<RawCall>),
    Single(RawCall),
}

impl RawCall {
    fn into_call(self) -> Option<ToolCall> {
        let name = self.tool.trim().to_string();
        if name.is_empty() {
            return None;
        }
        let args = if self.args.is_null() {
            serde_json::json!({})
        } else {
            self.args
        };
        let mut call = ToolCall::new(name, args);
        if let Some(id) = self.id.filter(|id| !id.is_empty()) {
            call.id = id;
        }
        Some(call)
    }
}

pub fn parse_reasoning_output(output: &str) -> ReasoningOutput {
    let trimmed = output.trim();
    let Some(json) = extract_json(trimmed) else {
        return ReasoningOutput::Answer(trimmed.to_string());
    };
    let raw = match serde_json::from_str::<RawBatch>(json) {
        Ok(RawBatch::Batch { tool_calls }) => tool_calls,
        Ok(RawBatch::Many(calls)) => calls,
        Ok(RawBatch::Single(call)) => vec![call],
        Err(_) => return ReasoningOutput::Answer(trimmed.to_string()),
    };
    let calls: Vec<ToolCall> = raw.into_iter().filter_map(RawCall::into_call).collect();
    if calls.is_empty() {
        return ReasoningOutput::Answer(trimmed.to_string());
    }
    let preamble = trimmed
        .find(json)
        .map(|pos| trimmed[..pos].trim().trim_end_matches("```json").trim().to_string())
        .unwrap_or_default();
    ReasoningOutput::ToolCalls { preamble, calls }
}

/// 工具未绑定时模型仍输出了调用 JSON：去掉 JSON 部分，只保留文字
pub fn strip_tool_json(output: &str) -> String {
    match parse_reasoning_output(output) {
        ReasoningOutput::Answer(text) => text,
        ReasoningOutput::ToolCalls { preamble, .. } => preamble,
    }
}
