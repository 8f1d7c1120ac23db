//! 结构化输出
//!
//! 用 schemars 生成目标类型的 JSON Schema 并拼入 system，要求模型只输出一个 JSON 对象；
//! 返回文本中提取 JSON 块（```json ... ``` 或首个 `{` 到末个 `}`）后反序列化。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

use crate::llm::{ChatMessage, CompletionRequest, LlmClient, LlmError};

/// 从模型输出中截取 JSON 片段；找不到 `{` 时返回 None
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let object = trimmed.find('{');
    // 仅当 `[` 后紧跟对象时视为 JSON 数组，避免把 [1] 这类引用标记当作 JSON
    let array = trimmed
        .find('[')
        .filter(|&i| trimmed[i + 1..].trim_start().starts_with('{'));
    let (start, close) = match (object, array) {
        (Some(o), Some(a)) if a < o => (a, ']'),
        (Some(o), _) => (o, '}'),
        (None, _) => return None,
    };
    let end = trimmed.rfind(close)?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 返回类型 T 的 JSON Schema 字符串
pub fn schema_json<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 一次结构化推理调用：不绑定工具，输出须符合 T 的 schema
pub async fn complete_structured<T>(
    llm: &dyn LlmClient,
    mut messages: Vec<ChatMessage>,
) -> Result<T, LlmError>
where
    T: DeserializeOwned + JsonSchema,
{
    messages.push(ChatMessage::system(format!(
        "Respond with ONLY one JSON object matching this JSON Schema, no prose:\n{}",
        schema_json::<T>()
    )));
    let output = llm.complete(&CompletionRequest::new(messages)).await?;
    let json = extract_json(&output)
        .ok_or_else(|| LlmError::InvalidResponse(format!("no JSON object in: {output}")))?;
    serde_json::from_str(json).map_err(|e| LlmError::InvalidResponse(format!("{e}: {json}")))
}
