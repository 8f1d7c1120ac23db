//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__EXECUTOR__TOOL_CALL_CAP=4`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::stream::{AnswerMode, StreamOptions};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub planner: PlannerSection,
    pub executor: ExecutorSection,
    pub stream: StreamSection,
    pub checkpoint: CheckpointSection,
    pub server: ServerSection,
    pub knowledge: KnowledgeSection,
}

/// [app] 段
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai（任何 OpenAI 兼容端点）或 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次推理调用超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [planner] 段
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

fn default_max_steps() -> usize {
    3
}

/// [executor] 段：工具调用上限与单次工具超时
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    #[serde(default = "default_tool_call_cap")]
    pub tool_call_cap: usize,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            tool_call_cap: default_tool_call_cap(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_call_cap() -> usize {
    6
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [stream] 段：answer 输出方式
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    #[serde(default)]
    pub answer_mode: AnswerMode,
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            answer_mode: AnswerMode::default(),
            chunk_chars: default_chunk_chars(),
        }
    }
}

impl StreamSection {
    pub fn options(&self) -> StreamOptions {
        StreamOptions {
            answer_mode: self.answer_mode,
            chunk_chars: self.chunk_chars,
        }
    }
}

fn default_chunk_chars() -> usize {
    6
}

/// [checkpoint] 段：memory 或 file
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointSection {
    #[serde(default = "default_checkpoint_backend")]
    pub backend: String,
    #[serde(default = "default_checkpoint_dir")]
    pub dir: PathBuf,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: default_checkpoint_backend(),
            dir: default_checkpoint_dir(),
        }
    }
}

fn default_checkpoint_backend() -> String {
    "memory".to_string()
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("./data/checkpoints")
}

/// [server] 段：hive-server 监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// [knowledge] 段：知识库文档 JSON 文件（KnowledgeDocument 数组）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeSection {
    pub corpus_path: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置；调用方决定是否用新配置重建引擎
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
