//! 流复用
//!
//! 回合在独立任务上运行，转移经 mpsc 送到这里逐条翻译为帧：
//! start -> 事件帧（seq 从 1 递增）-> [DONE]。
//! 丢弃返回的流不会取消回合；回合任务异常退出时补一条 500 error 帧再结束。

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::StreamFailure;
use crate::react::Transition;
use crate::stream::protocol::{EventFrame, ProtocolEvent, StreamFrame};
use crate::stream::translator::{AnswerMode, EventTranslator};
use crate::workflow::{TurnEngine, TurnInput};

pub type FrameStream = Pin<Box<dyn Stream<Item = StreamFrame> + Send>>;

/// 流的输出选项
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    pub answer_mode: AnswerMode,
    pub chunk_chars: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            answer_mode: AnswerMode::Once,
            chunk_chars: 6,
        }
    }
}

/// 开始一个回合并返回其帧流
pub fn stream_turn(
    engine: Arc<TurnEngine>,
    input: TurnInput,
    options: StreamOptions,
    cancel: CancellationToken,
) -> FrameStream {
    let query = input.message.clone();
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let _ = engine.run_turn(input, Some(tx), cancel).await;
    });
    frames(rx, handle, query, options, None)
}

/// 重连：先发 reconnecting；回合仍在运行时接上其后续事件，否则从检查点继续。已发送过的事件不重放
pub fn reconnect(
    engine: Arc<TurnEngine>,
    thread_id: String,
    options: StreamOptions,
    cancel: CancellationToken,
) -> FrameStream {
    let notice = ProtocolEvent::Reconnecting {
        message: format!("Resuming conversation {thread_id}..."),
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let _ = engine.continue_thread(&thread_id, Some(tx), cancel).await;
    });
    frames(rx, handle, String::new(), options, Some(notice))
}

struct MuxState {
    rx: mpsc::UnboundedReceiver<Transition>,
    handle: Option<JoinHandle<()>>,
    translator: EventTranslator,
    pending: VecDeque<StreamFrame>,
    query: String,
    seq: u64,
    started: Instant,
    finished: bool,
}

impl MuxState {
    fn push_event(&mut self, event: ProtocolEvent) {
        self.seq += 1;
        self.pending.push_back(StreamFrame::Event(EventFrame {
            seq: self.seq,
            query: self.query.clone(),
            processing_time_ms: self.started.elapsed().as_secs_f64() * 1000.0,
            event,
        }));
    }
}

fn frames(
    rx: mpsc::UnboundedReceiver<Transition>,
    handle: JoinHandle<()>,
    query: String,
    options: StreamOptions,
    first: Option<ProtocolEvent>,
) -> FrameStream {
    let mut state = MuxState {
        rx,
        handle: Some(handle),
        translator: EventTranslator::new(options.answer_mode, options.chunk_chars),
        pending: VecDeque::new(),
        query,
        seq: 0,
        started: Instant::now(),
        finished: false,
    };
    state.pending.push_back(StreamFrame::Start {
        message_id: Uuid::new_v4().to_string(),
    });
    if let Some(event) = first {
        state.push_event(event);
    }

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(frame) = st.pending.pop_front() {
                return Some((frame, st));
            }
            if st.finished {
                return None;
            }
            match st.rx.recv().await {
                Some(transition) => {
                    for event in st.translator.translate(transition) {
                        st.push_event(event);
                    }
                }
                None => {
                    if let Some(handle) = st.handle.take() {
                        if let Err(e) = handle.await {
                            tracing::error!(error = %e, "Turn task aborted");
                            let failure = StreamFailure::new(500, format!("Unexpected error: {e}"), true);
                            st.push_event(ProtocolEvent::error(&failure));
                        }
                    }
                    st.pending.push_back(StreamFrame::Done);
                    st.finished = true;
                }
            }
        }
    }))
}
