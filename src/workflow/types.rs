//! 工作流类型定义
//!
//! 执行器类型是封闭枚举；计划是线性步骤列表，每回合创建一次，之后只按游标读取。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 执行器类型（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// 闲聊与通用问答，不绑定工具
    Conversational,
    /// 内部知识库检索，累积检索文档
    KnowledgeHub,
    /// 第三方应用操作（写操作需人工审批）
    AppAutomation,
    /// 联网调研
    Research,
    /// 数据分析与图表
    DataAnalyst,
    /// 新手引导，直接产出最终回答
    Onboarding,
}

impl AgentType {
    pub const ALL: [AgentType; 6] = [
        AgentType::Conversational,
        AgentType::KnowledgeHub,
        AgentType::AppAutomation,
        AgentType::Research,
        AgentType::DataAnalyst,
        AgentType::Onboarding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Conversational => "conversational",
            AgentType::KnowledgeHub => "knowledge_hub",
            AgentType::AppAutomation => "app_automation",
            AgentType::Research => "research",
            AgentType::DataAnalyst => "data_analyst",
            AgentType::Onboarding => "onboarding",
        }
    }

    /// 严格解析（含别名）；未知标签返回 None
    pub fn parse(tag: &str) -> Option<AgentType> {
        match tag.trim().to_lowercase().as_str() {
            "conversational" | "conversation" => Some(AgentType::Conversational),
            "knowledge_hub" => Some(AgentType::KnowledgeHub),
            "app_automation" => Some(AgentType::AppAutomation),
            "research" => Some(AgentType::Research),
            "data_analyst" | "forse_analyzer" => Some(AgentType::DataAnalyst),
            "onboarding" => Some(AgentType::Onboarding),
            _ => None,
        }
    }

    /// 宽松解析：未知标签降级为 Conversational 并记录告警，从不失败
    pub fn parse_lenient(tag: &str) -> AgentType {
        AgentType::parse(tag).unwrap_or_else(|| {
            tracing::warn!(agent = %tag, "Unknown agent type, falling back to conversational");
            AgentType::Conversational
        })
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 计划中的一步
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub agent_type: AgentType,
    pub task_description: String,
}

impl PlanStep {
    pub fn new(agent_type: AgentType, task_description: impl Into<String>) -> Self {
        Self {
            agent_type,
            task_description: task_description.into(),
        }
    }
}

/// 线性计划：1..=max_steps 步，创建后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    steps: Vec<PlanStep>,
}

impl Plan {
    /// 空步骤列表时退化为单步对话计划；超出 max_steps 的部分被截断
    pub fn new(mut steps: Vec<PlanStep>, max_steps: usize) -> Self {
        if steps.is_empty() {
            steps.push(PlanStep::new(
                AgentType::Conversational,
                "Handle the user's request",
            ));
        }
        steps.truncate(max_steps.max(1));
        Self { steps }
    }

    pub fn single(agent_type: AgentType, task: impl Into<String>) -> Self {
        Self {
            steps: vec![PlanStep::new(agent_type, task)],
        }
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&PlanStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// 路由目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Agent(AgentType),
    Summarizer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases_and_case() {
        assert_eq!(AgentType::parse(" Conversation "), Some(AgentType::Conversational));
        assert_eq!(AgentType::parse("forse_analyzer"), Some(AgentType::DataAnalyst));
        assert_eq!(AgentType::parse("KNOWLEDGE_HUB"), Some(AgentType::KnowledgeHub));
        assert_eq!(AgentType::parse("wizard"), None);
    }

    #[test]
    fn test_lenient_defaults_to_conversational() {
        assert_eq!(AgentType::parse_lenient("wizard"), AgentType::Conversational);
    }

    #[test]
    fn test_plan_truncates_and_never_empty() {
        let steps = (0..5)
            .map(|i| PlanStep::new(AgentType::Research, format!("t{i}")))
            .collect();
        assert_eq!(Plan::new(steps, 3).len(), 3);

        let empty = Plan::new(Vec::new(), 3);
        assert_eq!(empty.len(), 1);
        assert_eq!(empty.steps()[0].agent_type, AgentType::Conversational);
    }

    #[test]
    fn test_serde_tag_matches_as_str() {
        for agent in AgentType::ALL {
            let json = serde_json::to_string(&agent).unwrap();
            assert_eq!(json, format!("\"{}\"", agent.as_str()));
        }
    }
}
