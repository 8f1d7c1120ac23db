//! 回合引擎构建器
//!
//! 流畅 API 组装规划器、执行器、汇总与建议组件、检查点存储；未注册对话执行器时自动补上。

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::AgentError;
use crate::files::FileProcessor;
use crate::llm::LlmClient;
use crate::memory::{CheckpointStore, InMemoryCheckpointStore};
use crate::react::{ConversationalExecutor, Planner, SuggestionGenerator, Summarizer, TaskExecutor};
use crate::workflow::engine::TurnEngine;
use crate::workflow::live::LiveTurns;
use crate::workflow::types::AgentType;

pub struct TurnEngineBuilder {
    llm: Arc<dyn LlmClient>,
    max_steps: usize,
    planner_prompt: Option<String>,
    executors: HashMap<AgentType, Arc<dyn TaskExecutor>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    files: Option<Arc<dyn FileProcessor>>,
}

impl TurnEngineBuilder {
    /// llm 供规划、汇总、建议与默认对话执行器使用
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            max_steps: 3,
            planner_prompt: None,
            executors: HashMap::new(),
            checkpoints: None,
            files: None,
        }
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn planner_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.planner_prompt = Some(prompt.into());
        self
    }

    /// 注册执行器；同类型重复注册时后者覆盖前者
    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executors.insert(executor.agent_type(), executor);
        self
    }

    pub fn checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn file_processor(mut self, processor: Arc<dyn FileProcessor>) -> Self {
        self.files = Some(processor);
        self
    }

    pub fn build(mut self) -> Result<TurnEngine, AgentError> {
        if self.max_steps == 0 {
            return Err(AgentError::ConfigError("max_steps must be at least 1".to_string()));
        }

        let fallback = Arc::clone(
            self.executors
                .entry(AgentType::Conversational)
                .or_insert_with(|| Arc::new(ConversationalExecutor::new(Arc::clone(&self.llm)))),
        );
        let missing: Vec<&str> = AgentType::ALL
            .iter()
            .filter(|a| !self.executors.contains_key(*a))
            .map(AgentType::as_str)
            .collect();
        if !missing.is_empty() {
            tracing::warn!(?missing, "Agents without executor will fall back to conversational");
        }

        let mut planner = Planner::new(Arc::clone(&self.llm), self.max_steps);
        if let Some(prompt) = self.planner_prompt {
            planner = planner.with_prompt(prompt);
        }

        Ok(TurnEngine {
            planner,
            executors: self.executors,
            fallback,
            summarizer: Summarizer::new(Arc::clone(&self.llm)),
            suggestions: SuggestionGenerator::new(Arc::clone(&self.llm)),
            checkpoints: self
                .checkpoints
                .unwrap_or_else(|| Arc::new(InMemoryCheckpointStore::new())),
            files: self.files,
            live: LiveTurns::new(),
        })
    }
}
