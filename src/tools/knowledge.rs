//! 知识库检索工具
//!
//! 进程内文档集上的关键词检索；结果为 `{"query": ..., "documents": [...]}`，
//! 事件翻译器按文档 id 累积本回合检索到的文档。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::Tool;

pub const KNOWLEDGE_SEARCH_TOOL: &str = "search_knowledge_hub";

/// 检索返回的文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    #[serde(default)]
    pub distance: f64,
}

fn default_source_type() -> String {
    "unknown".to_string()
}

impl KnowledgeDocument {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            source_type: default_source_type(),
            distance: 0.0,
        }
    }
}

pub struct KnowledgeSearchTool {
    corpus: Vec<KnowledgeDocument>,
    limit: usize,
}

impl KnowledgeSearchTool {
    pub fn new(corpus: Vec<KnowledgeDocument>) -> Self {
        Self { corpus, limit: 5 }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// 按命中词数排序；distance = 1 - 命中比例
    fn search(&self, query: &str) -> Vec<KnowledgeDocument> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| t.len() > 2)
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, &KnowledgeDocument)> = self
            .corpus
            .iter()
            .map(|d| {
                let haystack = format!("{} {}", d.title, d.content).to_lowercase();
                (terms.iter().filter(|t| haystack.contains(t.as_str())).count(), d)
            })
            .filter(|(hits, _)| *hits > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(self.limit)
            .map(|(hits, d)| KnowledgeDocument {
                distance: 1.0 - hits as f64 / terms.len() as f64,
                ..d.clone()
            })
            .collect()
    }
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        KNOWLEDGE_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search the organisation's knowledge hub. Args: {\"query\": \"search terms\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing 'query'".to_string())?;
        let documents = self.search(query);
        serde_json::to_string(&serde_json::json!({ "query": query, "documents": documents }))
            .map_err(|e| e.to_string())
    }
}
