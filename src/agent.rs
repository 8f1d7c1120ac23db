//! Headless 运行时装配
//!
//! 供命令行与 HTTP 前端调用：create_engine 按配置选择 LLM 后端与检查点存储，
//! 为每类执行器注册各自的工具子集并组装 TurnEngine。

use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::files::LocalFileProcessor;
use crate::llm::{EchoLlmClient, LlmClient, OpenAiClient};
use crate::memory::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
use crate::react::prompts::executor_prompt;
use crate::react::{ConversationalExecutor, ReactExecutor, TaskExecutor};
use crate::tools::{
    AppActionTool, ChartTool, EchoTool, KnowledgeDocument, KnowledgeSearchTool, ToolExecutor, ToolRegistry,
};
use crate::workflow::{AgentType, TurnEngine, TurnEngineBuilder};

pub const ONBOARDING_SUGGESTIONS: [&str; 2] = ["Continue with next onboarding step", "Skip this step"];

/// 按 provider 与 API Key 选择 LLM：openai 且有 OPENAI_API_KEY 时走真实端点，否则使用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = std::env::var("OPENAI_API_KEY").ok();
    match (provider.as_str(), api_key) {
        ("openai", Some(key)) => {
            tracing::info!(model = %cfg.llm.model, "Using OpenAI-compatible LLM");
            Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, Some(&key))
                    .with_timeout(cfg.llm.timeouts.request),
            )
        }
        _ => {
            tracing::warn!(provider = %provider, "No API key set or provider is mock, using Mock LLM");
            Arc::new(EchoLlmClient)
        }
    }
}

pub fn create_checkpoint_store(cfg: &AppConfig) -> Arc<dyn CheckpointStore> {
    match cfg.checkpoint.backend.to_lowercase().as_str() {
        "file" => {
            tracing::info!(dir = %cfg.checkpoint.dir.display(), "Using file checkpoints");
            Arc::new(FileCheckpointStore::new(&cfg.checkpoint.dir))
        }
        _ => Arc::new(InMemoryCheckpointStore::new()),
    }
}

/// 从 JSON 文件读取知识库文档；文件不存在或格式错误时返回空集
pub fn load_corpus(path: Option<&Path>) -> Vec<KnowledgeDocument> {
    let Some(path) = path else {
        return Vec::new();
    };
    match std::fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Invalid knowledge corpus");
            Vec::new()
        }),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Knowledge corpus unreadable");
            Vec::new()
        }
    }
}

/// 各执行器的工具集
fn registry_for(agent: AgentType, corpus: &[KnowledgeDocument]) -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    match agent {
        AgentType::KnowledgeHub => reg.register(KnowledgeSearchTool::new(corpus.to_vec())),
        AgentType::AppAutomation => {
            reg.register(AppActionTool::new(
                "create_program",
                "Create a program. Args: {\"name\": \"...\", \"description\": \"...\"}",
            ));
            reg.register(AppActionTool::new(
                "send_invite",
                "Invite a user to the organisation. Args: {\"email\": \"...\"}",
            ));
        }
        AgentType::Research => {
            reg.register(KnowledgeSearchTool::new(corpus.to_vec()));
            reg.register(EchoTool);
        }
        AgentType::DataAnalyst => reg.register(ChartTool),
        AgentType::Onboarding => reg.register(AppActionTool::new(
            "update_organization_profile",
            "Save onboarding answers to the organisation profile. Args: {\"field\": \"...\", \"value\": \"...\"}",
        )),
        AgentType::Conversational => {}
    }
    reg
}

fn create_executor(
    agent: AgentType,
    cfg: &AppConfig,
    llm: &Arc<dyn LlmClient>,
    corpus: &[KnowledgeDocument],
) -> Arc<dyn TaskExecutor> {
    if agent == AgentType::Conversational {
        return Arc::new(ConversationalExecutor::new(Arc::clone(llm)));
    }
    let tools = Arc::new(ToolExecutor::new(
        registry_for(agent, corpus),
        cfg.executor.tool_timeout_secs,
    ));
    let executor = ReactExecutor::new(agent, Arc::clone(llm), tools, executor_prompt(agent))
        .with_tool_call_cap(cfg.executor.tool_call_cap);
    if agent == AgentType::Onboarding {
        Arc::new(
            executor
                .terminal()
                .with_fixed_suggestions(ONBOARDING_SUGGESTIONS.iter().map(|s| s.to_string()).collect()),
        )
    } else {
        Arc::new(executor)
    }
}

/// 按配置组装回合引擎
pub fn create_engine(cfg: &AppConfig) -> Result<TurnEngine, AgentError> {
    let llm = create_llm_from_config(cfg);
    let corpus = load_corpus(cfg.knowledge.corpus_path.as_deref());
    create_engine_with(cfg, llm, corpus)
}

/// 使用给定 LLM 与文档集组装回合引擎
pub fn create_engine_with(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    corpus: Vec<KnowledgeDocument>,
) -> Result<TurnEngine, AgentError> {
    let mut builder = TurnEngineBuilder::new(Arc::clone(&llm))
        .max_steps(cfg.planner.max_steps)
        .checkpoints(create_checkpoint_store(cfg))
        .file_processor(Arc::new(LocalFileProcessor));
    for agent in AgentType::ALL {
        builder = builder.executor(create_executor(agent, cfg, &llm, &corpus));
    }
    builder.build()
}
