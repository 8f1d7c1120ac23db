//! 审批中断
//!
//! 执行器请求写操作时创建 Interrupt，回合挂起；调用方下一条输入须是 `{interrupt_id: decision}` 映射，
//! 覆盖全部待决 id 才能恢复。解析失败或缺 id 时回合以错误回答结束，中断保持未决。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::AgentError;
use crate::llm::extract_json;
use crate::memory::ToolCall;

pub const APPROVAL_PROMPT: &str = "Do you approve this action?";

/// 一个待审批的操作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    pub id: String,
    /// 请求执行的工具名
    pub requested_action: String,
    pub parameters: serde_json::Value,
    pub human_message: String,
}

impl Interrupt {
    pub fn new(action: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            requested_action: action.into(),
            parameters,
            human_message: APPROVAL_PROMPT.to_string(),
        }
    }

    /// 为一次待审批的工具调用创建中断，id 与调用 id 相同
    pub fn for_call(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            requested_action: call.name.clone(),
            parameters: call.args.clone(),
            human_message: APPROVAL_PROMPT.to_string(),
        }
    }
}

/// 单个中断的决策：action 为 "approve" 即批准，可选地替换参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl Decision {
    pub fn approve() -> Self {
        Self {
            action: "approve".to_string(),
            parameters: None,
        }
    }

    pub fn reject() -> Self {
        Self {
            action: "reject".to_string(),
            parameters: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.action.trim().eq_ignore_ascii_case("approve")
    }
}

pub type DecisionMap = HashMap<String, Decision>;

/// 解析恢复载荷并校验覆盖全部待决中断
pub fn parse_decision_map(payload: &str, pending: &[Interrupt]) -> Result<DecisionMap, AgentError> {
    let json = extract_json(payload).unwrap_or(payload.trim());
    let map: DecisionMap = serde_json::from_str(json)
        .map_err(|e| AgentError::InterruptParse(format!("{e}: {payload}")))?;
    if let Some(missing) = pending.iter().find(|i| !map.contains_key(&i.id)) {
        return Err(AgentError::InterruptParse(format!(
            "missing decision for interrupt {}",
            missing.id
        )));
    }
    Ok(map)
}

/// 面向用户的审批请求文本，末尾附可直接回传的决策模板
pub fn approval_request_text(interrupts: &[Interrupt]) -> String {
    let listed = interrupts
        .iter()
        .map(|i| {
            format!(
                "Action: {} (ID: {})\nParameters: {}\nMessage: {}",
                i.requested_action, i.id, i.parameters, i.human_message
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "⏸️ Approval required. Please approve or cancel the following actions.\n\n{listed}\n\nApproval string:\n{}",
        decision_template(interrupts)
    )
}

/// `{id: {"action": "approve"}}`，按中断顺序
pub fn decision_template(interrupts: &[Interrupt]) -> String {
    let mut map = serde_json::Map::new();
    for i in interrupts {
        map.insert(i.id.clone(), serde_json::json!({ "action": "approve" }));
    }
    serde_json::to_string_pretty(&serde_json::Value::Object(map)).unwrap_or_default()
}

/// 恢复载荷无法使用时返回给用户的回答
pub fn parse_failure_answer(payload: &str) -> String {
    format!("❌ Error parsing approval data: {payload}.\nTry again with the correct format.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_interrupts() -> Vec<Interrupt> {
        vec![
            Interrupt::new("create_program", json!({"name": "Grants"})),
            Interrupt::new("send_invite", json!({"email": "a@b.c"})),
        ]
    }

    #[test]
    fn test_template_round_trips_through_parser() {
        let pending = two_interrupts();
        let map = parse_decision_map(&decision_template(&pending), &pending).unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.values().all(Decision::is_approved));
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let pending = two_interrupts();
        let payload = json!({ pending[0].id.clone(): {"action": "approve"} }).to_string();
        let err = parse_decision_map(&payload, &pending).unwrap_err();
        assert!(matches!(err, AgentError::InterruptParse(_)));
    }

    #[test]
    fn test_non_json_is_rejected() {
        let pending = two_interrupts();
        assert!(matches!(
            parse_decision_map("yes please", &pending),
            Err(AgentError::InterruptParse(_))
        ));
    }

    #[test]
    fn test_approval_text_lists_each_action() {
        let pending = two_interrupts();
        let text = approval_request_text(&pending);
        assert!(text.starts_with("⏸️ Approval required."));
        assert!(text.contains("Action: create_program"));
        assert!(text.contains("Action: send_invite"));
        assert!(text.contains(&pending[1].id));
        assert!(text.contains("Approval string:"));
    }

    #[test]
    fn test_decision_with_replaced_parameters() {
        let d: Decision =
            serde_json::from_str(r#"{"action": "approve", "parameters": {"name": "New"}}"#).unwrap();
        assert!(d.is_approved());
        assert_eq!(d.parameters, Some(json!({"name": "New"})));
        assert!(!Decision::reject().is_approved());
    }
}
