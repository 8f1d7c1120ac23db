//! 工具调用 JSON Schema（schemars 生成）
//!
//! 拼入绑定了工具的推理请求，约束模型输出 `{"tool_calls": [{"tool": ..., "args": {...}}]}`。

use schemars::{schema_for, JsonSchema};

#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名
    tool: String,
    /// 工具参数，依工具而定
    args: serde_json::Map<String, serde_json::Value>,
}

/// 一批工具调用；同批调用并发执行
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallBatchFormat {
    tool_calls: Vec<ToolCallFormat>,
}

pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallBatchFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
