//! 进行中回合登记
//!
//! 每个 thread 同一时刻最多一个驱动者。驱动者在回合期间持有 LiveTurn，转移同时广播给旁听者；
//! 重连时若回合仍在运行就旁听其广播，不再从检查点重跑同一步骤。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::react::Transition;

const FEED_CAPACITY: usize = 256;

type Feeds = Arc<Mutex<HashMap<String, broadcast::Sender<Transition>>>>;

#[derive(Debug, Default)]
pub struct LiveTurns {
    feeds: Feeds,
}

/// 登记结果：成为驱动者，或旁听已有驱动者
pub enum Attach {
    Lead(LiveTurn),
    Follow(broadcast::Receiver<Transition>),
}

impl LiveTurns {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子地登记或旁听
    pub fn attach(&self, thread_id: &str) -> Attach {
        let mut feeds = match self.feeds.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(feed) = feeds.get(thread_id) {
            return Attach::Follow(feed.subscribe());
        }
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        feeds.insert(thread_id.to_string(), feed.clone());
        Attach::Lead(LiveTurn {
            thread_id: thread_id.to_string(),
            feed,
            feeds: Arc::clone(&self.feeds),
        })
    }

    pub fn is_live(&self, thread_id: &str) -> bool {
        self.feeds
            .lock()
            .map(|f| f.contains_key(thread_id))
            .unwrap_or(false)
    }
}

/// 驱动者凭证；drop 时注销，旁听者随之收到 Closed
pub struct LiveTurn {
    thread_id: String,
    feed: broadcast::Sender<Transition>,
    feeds: Feeds,
}

impl LiveTurn {
    /// 无旁听者时发送失败，忽略
    pub fn publish(&self, transition: Transition) {
        let _ = self.feed.send(transition);
    }
}

impl Drop for LiveTurn {
    fn drop(&mut self) {
        if let Ok(mut feeds) = self.feeds.lock() {
            feeds.remove(&self.thread_id);
        }
    }
}
