//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。
//! 绑定的工具以文本形式附在 system 消息末尾，模型按约定输出 JSON 工具调用；未绑定工具时不附加。
//! complete_stream 走 SSE 流式接口，逐块产出 delta.content。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::llm::{ChatMessage, CompletionRequest, LlmClient, LlmError, Role, TokenStream, ToolSpec};
use crate::tools::tool_call_schema_json;

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// 将绑定工具渲染为 system 附加说明
pub fn render_tool_instructions(tools: &[ToolSpec]) -> String {
    let mut out = String::from(
        "You can call tools. To call tools, respond with ONLY JSON: \
         {\"tool_calls\": [{\"tool\": \"<name>\", \"args\": {...}}]}. \
         Several calls in one batch run concurrently. \
         When you have the final answer, respond with plain text and no JSON.\n\n",
    );
    out.push_str(&format!(
        "Tool call format (JSON Schema):\n{}\n\nAvailable tools:\n",
        tool_call_schema_json()
    ));
    for t in tools {
        out.push_str(&format!("- {}: {}\n  parameters: {}\n", t.name, t.description, t.parameters));
    }
    out
}

fn map_openai_error(err: OpenAIError) -> LlmError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("rate limit") || lower.contains("429") {
        LlmError::RateLimited { retry_after_ms: 60_000 }
    } else if lower.contains("timed out") || lower.contains("timeout") {
        LlmError::Timeout
    } else if lower.contains("connect") || lower.contains("dns") {
        LlmError::Network(msg)
    } else {
        LlmError::ApiError(msg)
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名，complete 时转 ChatMessage 为 API 格式并取首条 content
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    request_timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            request_timeout: Duration::from_secs(60),
            usage: TokenUsage::default(),
        }
    }

    /// 单次推理调用超时，超时映射为 LlmError::Timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.request_timeout = Duration::from_secs(secs);
        self
    }

    fn to_openai_messages(
        &self,
        request: &CompletionRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let mut messages: Vec<ChatMessage> = request.messages.clone();
        if !request.tools.is_empty() {
            messages.insert(0, ChatMessage::system(render_tool_instructions(&request.tools)));
        }
        messages
            .into_iter()
            .map(|m| {
                let built = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content)
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content)
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content)
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant),
                };
                built.map_err(|e| LlmError::ApiError(e.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let api_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(request)?)
            .build()
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        let response = tokio::time::timeout(self.request_timeout, self.client.chat().create(api_request))
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<TokenStream, LlmError> {
        let api_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(request)?)
            .stream(true)
            .build()
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        let chunks = tokio::time::timeout(self.request_timeout, self.client.chat().create_stream(api_request))
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(map_openai_error)?;

        Ok(Box::pin(chunks.map(|chunk| {
            chunk.map_err(map_openai_error).map(|c| {
                c.choices
                    .into_iter()
                    .filter_map(|choice| choice.delta.content)
                    .collect::<String>()
            })
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_instructions_list_every_tool() {
        let tools = vec![
            ToolSpec {
                name: "search_knowledge_hub".into(),
                description: "Search docs".into(),
                parameters: json!({"type": "object"}),
            },
            ToolSpec {
                name: "web_search".into(),
                description: "Search web".into(),
                parameters: json!({"type": "object"}),
            },
        ];
        let text = render_tool_instructions(&tools);
        assert!(text.contains("search_knowledge_hub: Search docs"));
        assert!(text.contains("web_search: Search web"));
    }

    #[test]
    fn test_no_tools_adds_no_instructions() {
        let client = OpenAiClient::new(Some("http://localhost:1"), "m", Some("k"));
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        let msgs = client.to_openai_messages(&req).unwrap();
        assert_eq!(msgs.len(), 1);
    }
}
