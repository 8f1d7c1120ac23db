//! 事件翻译器
//!
//! 按到达顺序把 Transition 映射为零或多个 ProtocolEvent，不重排、不缓冲整轮。
//! 唯一跨事件的状态是知识库执行器的文档累积器：在该执行器的完成转移被翻译前输出去重后的 `documents`，随后清空。

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::react::{Namespace, Node, Transition};
use crate::stream::protocol::{KnowledgeItem, ProtocolEvent, ToolInvocation};
use crate::tools::KNOWLEDGE_SEARCH_TOOL;
use crate::workflow::{approval_request_text, AgentType};

/// answer 输出方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// 一次输出完整回答
    #[default]
    Once,
    /// 先输出 partial 块（汇总器的流式增量；无增量时按固定字符数切分），再输出一条完整回答
    Chunked,
}

pub struct EventTranslator {
    mode: AnswerMode,
    chunk_chars: usize,
    documents: Vec<Value>,
    /// 本次汇总是否已收到增量
    streamed: bool,
}

impl EventTranslator {
    pub fn new(mode: AnswerMode, chunk_chars: usize) -> Self {
        Self {
            mode,
            chunk_chars: chunk_chars.max(1),
            documents: Vec::new(),
            streamed: false,
        }
    }

    pub fn translate(&mut self, transition: Transition) -> Vec<ProtocolEvent> {
        let Transition { namespace, node } = transition;
        match node {
            Node::Planned { first, .. } => vec![routing(first)],
            Node::StepAdvanced { next } => next.map(routing).into_iter().collect(),
            Node::ExecutorFinished {
                agent,
                terminal,
                final_text,
            } => self.executor_finished(agent, terminal, &final_text),
            Node::Reasoning { calls } => calls
                .into_iter()
                .map(|c| ProtocolEvent::ToolCall {
                    tool_invocation: ToolInvocation::call(c.id, c.name, c.args),
                })
                .collect(),
            Node::ToolsExecuted { results } => results
                .into_iter()
                .map(|r| {
                    let parsed = parse_result(&r.content);
                    if namespace == Namespace::Executor(AgentType::KnowledgeHub) && r.name == KNOWLEDGE_SEARCH_TOOL {
                        self.accumulate(&parsed);
                    }
                    ProtocolEvent::ToolCall {
                        tool_invocation: ToolInvocation::result(r.call_id, r.name, parsed),
                    }
                })
                .collect(),
            Node::AnswerDelta { text } => {
                if self.mode != AnswerMode::Chunked || text.is_empty() {
                    return Vec::new();
                }
                self.streamed = true;
                vec![ProtocolEvent::Answer {
                    answer: text,
                    partial: true,
                }]
            }
            Node::Summarized { answer } => {
                if std::mem::take(&mut self.streamed) {
                    let answer = answer.trim();
                    return if answer.is_empty() {
                        Vec::new()
                    } else {
                        vec![ProtocolEvent::answer(answer)]
                    };
                }
                self.answers(&answer)
            }
            Node::Suggested { queries } if !queries.is_empty() => {
                vec![ProtocolEvent::SuggestedQueries {
                    suggested_queries: queries,
                }]
            }
            Node::Interrupted { interrupts } => {
                tracing::info!(count = interrupts.len(), "Interrupts require approval");
                vec![ProtocolEvent::answer(approval_request_text(&interrupts))]
            }
            Node::InterruptRejected { answer } => vec![ProtocolEvent::answer(answer)],
            Node::Failed(failure) => vec![ProtocolEvent::error(&failure)],
            Node::Suggested { .. } => Vec::new(),
            Node::Other(name) => {
                tracing::debug!(node = %name, "Skipping unrecognised node");
                Vec::new()
            }
        }
    }

    /// 终结型执行器只输出 answer；其余执行器输出一条以自身命名的 result 轨迹
    fn executor_finished(&mut self, agent: AgentType, terminal: bool, text: &str) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        if agent == AgentType::KnowledgeHub && !self.documents.is_empty() {
            events.push(self.take_documents());
        }
        if terminal {
            events.extend(self.answers(text));
        } else if !text.trim().is_empty() {
            events.push(ProtocolEvent::ToolCall {
                tool_invocation: ToolInvocation::result(
                    Uuid::new_v4().to_string(),
                    agent.as_str(),
                    Value::String(text.trim().to_string()),
                ),
            });
        }
        events
    }

    fn accumulate(&mut self, parsed: &Value) {
        if let Some(docs) = parsed.get("documents").and_then(Value::as_array) {
            self.documents.extend(docs.iter().cloned());
        }
    }

    /// 按 id 去重（缺 id 时以其在累积列表中的位置为 id），保持首次出现顺序
    fn take_documents(&mut self) -> ProtocolEvent {
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for (idx, doc) in self.documents.drain(..).enumerate() {
            let id = doc.get("id").cloned().unwrap_or_else(|| Value::from(idx));
            if seen.insert(id.to_string()) {
                items.push(KnowledgeItem::from_document(id, &doc));
            }
        }
        ProtocolEvent::Documents {
            total_documents: items.len(),
            documents: items,
        }
    }

    fn answers(&self, text: &str) -> Vec<ProtocolEvent> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        let mut events = Vec::new();
        if self.mode == AnswerMode::Chunked {
            let chars: Vec<char> = text.chars().collect();
            events.extend(chars.chunks(self.chunk_chars).map(|c| ProtocolEvent::Answer {
                answer: c.iter().collect(),
                partial: true,
            }));
        }
        events.push(ProtocolEvent::answer(text));
        events
    }
}

fn routing(agent: AgentType) -> ProtocolEvent {
    ProtocolEvent::Routing {
        routed_agent: agent.as_str().to_string(),
    }
}

/// 结果是 JSON 则解析，否则作为字符串
fn parse_result(content: &str) -> Value {
    serde_json::from_str(content).unwrap_or_else(|_| Value::String(content.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::core::StreamFailure;
    use crate::memory::ToolCall;
    use crate::tools::ToolOutcome;
    use crate::workflow::{Interrupt, Plan};

    fn kb_result(ids: &[&str]) -> Transition {
        let docs: Vec<Value> = ids.iter().map(|id| json!({"id": id, "title": id})).collect();
        let call = ToolCall::new(KNOWLEDGE_SEARCH_TOOL, json!({}));
        Transition::executor(
            AgentType::KnowledgeHub,
            Node::ToolsExecuted {
                results: vec![ToolOutcome::ok(&call, json!({"documents": docs}).to_string())],
            },
        )
    }

    fn finished(agent: AgentType, terminal: bool, text: &str) -> Transition {
        Transition::root(Node::ExecutorFinished {
            agent,
            terminal,
            final_text: text.into(),
        })
    }

    #[test]
    fn test_documents_deduplicated_in_first_seen_order() {
        let mut tr = EventTranslator::new(AnswerMode::Once, 6);
        tr.translate(kb_result(&["1", "2"]));
        tr.translate(kb_result(&["2", "3"]));
        let events = tr.translate(finished(AgentType::KnowledgeHub, false, "answer [1]"));
        assert_eq!(events.len(), 2);
        match &events[0] {
            ProtocolEvent::Documents {
                documents,
                total_documents,
            } => {
                let ids: Vec<&Value> = documents.iter().map(|d| &d.id).collect();
                assert_eq!(ids, vec![&json!("1"), &json!("2"), &json!("3")]);
                assert_eq!(*total_documents, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(events[1].stage(), "tool_call");

        // 累积器已清空
        let again = tr.translate(finished(AgentType::KnowledgeHub, false, "x"));
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn test_documents_without_id_use_accumulated_position() {
        let mut tr = EventTranslator::new(AnswerMode::Once, 6);
        let call = ToolCall::new(KNOWLEDGE_SEARCH_TOOL, json!({}));
        let t = |docs: Value| {
            Transition::executor(
                AgentType::KnowledgeHub,
                Node::ToolsExecuted {
                    results: vec![ToolOutcome::ok(&call, json!({ "documents": docs }).to_string())],
                },
            )
        };
        tr.translate(t(json!([{"title": "a"}])));
        tr.translate(t(json!([{"title": "b"}])));
        let events = tr.translate(finished(AgentType::KnowledgeHub, false, "done"));
        match &events[0] {
            ProtocolEvent::Documents { documents, .. } => {
                assert_eq!(documents.len(), 2);
                assert_eq!(documents[1].id, json!(1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_other_executors_do_not_accumulate() {
        let mut tr = EventTranslator::new(AnswerMode::Once, 6);
        let call = ToolCall::new(KNOWLEDGE_SEARCH_TOOL, json!({}));
        tr.translate(Transition::executor(
            AgentType::Research,
            Node::ToolsExecuted {
                results: vec![ToolOutcome::ok(&call, json!({"documents": [{"id": 1}]}).to_string())],
            },
        ));
        let events = tr.translate(finished(AgentType::KnowledgeHub, false, "done"));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_call_and_result_share_id() {
        let mut tr = EventTranslator::new(AnswerMode::Once, 6);
        let call = ToolCall::new("echo", json!({"text": "hi"}));
        let calls = tr.translate(Transition::executor(
            AgentType::Research,
            Node::Reasoning { calls: vec![call.clone()] },
        ));
        let results = tr.translate(Transition::executor(
            AgentType::Research,
            Node::ToolsExecuted {
                results: vec![ToolOutcome::ok(&call, "plain text")],
            },
        ));
        match (&calls[0], &results[0]) {
            (
                ProtocolEvent::ToolCall { tool_invocation: c },
                ProtocolEvent::ToolCall { tool_invocation: r },
            ) => {
                assert_eq!(c.tool_call_id, r.tool_call_id);
                assert_eq!(r.result, Some(json!("plain text")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_routing_rules() {
        let mut tr = EventTranslator::new(AnswerMode::Once, 6);
        let planned = tr.translate(Transition::root(Node::Planned {
            plan: Plan::single(AgentType::Research, "t"),
            first: AgentType::Research,
        }));
        assert_eq!(
            planned,
            vec![ProtocolEvent::Routing { routed_agent: "research".into() }]
        );
        assert!(tr
            .translate(Transition::root(Node::StepAdvanced { next: None }))
            .is_empty());
        assert!(tr.translate(Transition::root(Node::Other("custom".into()))).is_empty());
        assert!(tr
            .translate(Transition::root(Node::Suggested { queries: vec![] }))
            .is_empty());
    }

    #[test]
    fn test_terminal_executor_emits_answer_only() {
        let mut tr = EventTranslator::new(AnswerMode::Once, 6);
        let events = tr.translate(finished(AgentType::Onboarding, true, "Welcome!"));
        assert_eq!(events, vec![ProtocolEvent::answer("Welcome!")]);
    }

    #[test]
    fn test_chunked_answer() {
        let mut tr = EventTranslator::new(AnswerMode::Chunked, 6);
        let events = tr.translate(Transition::root(Node::Summarized {
            answer: "Hello, world!".into(),
        }));
        let parts: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                ProtocolEvent::Answer { answer, partial: true } => Some(answer.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(parts, vec!["Hello,", " world", "!"]);
        assert_eq!(events.last(), Some(&ProtocolEvent::answer("Hello, world!")));
    }

    #[test]
    fn test_streamed_deltas_replace_fixed_chunks() {
        let mut tr = EventTranslator::new(AnswerMode::Chunked, 6);
        let mut events = Vec::new();
        for text in ["Hello, ", "world!"] {
            events.extend(tr.translate(Transition::root(Node::AnswerDelta { text: text.into() })));
        }
        events.extend(tr.translate(Transition::root(Node::Summarized {
            answer: "Hello, world!".into(),
        })));
        assert_eq!(
            events,
            vec![
                ProtocolEvent::Answer {
                    answer: "Hello, ".into(),
                    partial: true
                },
                ProtocolEvent::Answer {
                    answer: "world!".into(),
                    partial: true
                },
                ProtocolEvent::answer("Hello, world!"),
            ]
        );

        let mut once = EventTranslator::new(AnswerMode::Once, 6);
        assert!(once
            .translate(Transition::root(Node::AnswerDelta { text: "Hello".into() }))
            .is_empty());
    }

    #[test]
    fn test_interrupt_becomes_single_answer() {
        let mut tr = EventTranslator::new(AnswerMode::Chunked, 6);
        let interrupt = Interrupt::new("create_program", json!({"name": "G"}));
        let events = tr.translate(Transition::root(Node::Interrupted {
            interrupts: vec![interrupt.clone()],
        }));
        assert_eq!(events.len(), 1);
        match &events[0] {
            ProtocolEvent::Answer { answer, partial } => {
                assert!(!partial);
                assert!(answer.contains(&interrupt.id));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_failure_maps_to_error() {
        let mut tr = EventTranslator::new(AnswerMode::Once, 6);
        let failure = StreamFailure::new(429, "Rate limit", true).with_retry_after(60.0);
        let events = tr.translate(Transition::root(Node::Failed(failure)));
        assert_eq!(
            events,
            vec![ProtocolEvent::Error {
                error_code: 429,
                error_message: "Rate limit".into(),
                retryable: true,
                retry_after: Some(60.0),
            }]
        );
    }
}
