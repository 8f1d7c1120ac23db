//! Hive - 多智能体对话编排
//!
//! 模块划分：
//! - **agent**: 无头运行时装配（按配置创建 LLM、检查点存储与回合引擎）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、错误分类、回合状态
//! - **files**: 附件读取与内联
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 追加式消息日志与检查点
//! - **observability**: tracing 初始化
//! - **react**: 规划器、ReAct 执行器、汇总与建议
//! - **stream**: 前端流协议、事件翻译与帧流
//! - **tools**: 工具注册表与并发执行器
//! - **workflow**: 执行图、人工审批中断、回合引擎

pub mod agent;
pub mod config;
pub mod core;
pub mod files;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod stream;
pub mod tools;
pub mod workflow;
