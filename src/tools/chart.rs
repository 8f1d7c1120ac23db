//! 图表工具
//!
//! 把数据序列渲染为 ```chart-preview 代码块（内嵌 base64 数据），前端直接展示；
//! 该类大载荷在回放给后续推理前会被替换为占位符。

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

pub struct ChartTool;

#[async_trait]
impl Tool for ChartTool {
    fn name(&self) -> &str {
        "render_chart"
    }

    fn description(&self) -> &str {
        "Render a chart for the user. Args: {\"title\": \"...\", \"labels\": [..], \"values\": [..]}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "labels": { "type": "array", "items": { "type": "string" } },
                "values": { "type": "array", "items": { "type": "number" } }
            },
            "required": ["labels", "values"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let labels = args
            .get("labels")
            .and_then(|v| v.as_array())
            .ok_or_else(|| "missing 'labels'".to_string())?;
        let values = args
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| "missing 'values'".to_string())?;
        if labels.len() != values.len() {
            return Err("labels and values differ in length".to_string());
        }
        let title = args.get("title").and_then(|v| v.as_str()).unwrap_or("Chart");
        let series = serde_json::json!({ "labels": labels, "values": values }).to_string();
        let preview = serde_json::json!({
            "title": title,
            "format": "series+hex",
            "data": hex_encode(series.as_bytes()),
        });
        Ok(format!("Chart rendered.\n```chart-preview\n{preview}\n```"))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chart_block_carries_data() {
        let out = ChartTool
            .execute(serde_json::json!({"labels": ["a", "b"], "values": [1, 2]}))
            .await
            .unwrap();
        assert!(out.contains("```chart-preview"));
        assert!(out.contains("\"data\":\""));
    }

    #[tokio::test]
    async fn test_model_supplied_title_is_scrubbed_with_payload() {
        let out = ChartTool
            .execute(serde_json::json!({"title": "Growth {by} quarter }", "labels": ["a"], "values": [1]}))
            .await
            .unwrap();
        let scrubbed = crate::react::scrub_tool_payload(&out);
        assert_eq!(scrubbed, format!("Chart rendered.\n{}", crate::react::hygiene::CHART_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_length_mismatch_fails() {
        let out = ChartTool
            .execute(serde_json::json!({"labels": ["a"], "values": [1, 2]}))
            .await;
        assert!(out.is_err());
    }
}
