//! 载荷清理
//!
//! 工具结果中内嵌的大块产物（```chart-preview 代码块里的 data 字段）在回放给后续推理前替换为短占位符；
//! 原始结果仍经 ToolsExecuted 转发一次给事件翻译器展示给用户。

use std::sync::OnceLock;

use regex::Regex;

pub const CHART_PLACEHOLDER: &str = "[Chart was generated and displayed to user]";

static CHART_PREVIEW_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn chart_preview_re() -> Option<&'static Regex> {
    CHART_PREVIEW_RE
        .get_or_init(|| {
            Regex::new(r#"(?s)```chart-preview\s*\n\{.*?"data"\s*:\s*"[^"]*".*?\}\s*\n```"#).ok()
        })
        .as_ref()
}

/// 替换 chart-preview 块；无匹配时原样返回
pub fn scrub_tool_payload(content: &str) -> String {
    if !content.contains("```chart-preview") {
        return content.to_string();
    }
    match chart_preview_re() {
        Some(re) => {
            let replaced = re.replace_all(content, CHART_PLACEHOLDER);
            if replaced != content {
                tracing::debug!("Stripped chart-preview block from tool result");
            }
            replaced.into_owned()
        }
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_chart_block() {
        let content = "Chart rendered.\n```chart-preview\n{\"title\": \"x\", \"data\": \"89504e47\"}\n```\nDone";
        assert_eq!(
            scrub_tool_payload(content),
            format!("Chart rendered.\n{CHART_PLACEHOLDER}\nDone")
        );
    }

    #[test]
    fn test_braces_in_title_do_not_defeat_scrubbing() {
        let content = "```chart-preview\n{\"title\": \"Q{3} } totals\", \"data\": \"7b7d\", \"format\": \"x\"}\n```";
        assert_eq!(scrub_tool_payload(content), CHART_PLACEHOLDER);
    }

    #[test]
    fn test_leaves_other_content_alone() {
        let content = "```chart-preview\n{\"title\": \"no data field\"}\n```";
        assert_eq!(scrub_tool_payload(content), content);
        assert_eq!(scrub_tool_payload("plain"), "plain");
    }
}
