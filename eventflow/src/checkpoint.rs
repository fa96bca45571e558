//! 检查点与回放（Checkpoint / ReplayManager）
//!
//! 检查点记录“创建时某流尾部之前的全部条目”，以不透明令牌 `<stream>@<id>` 表示，
//! 可持久化并在重启后复用。回放按日志顺序读取检查点之后、调用时流尾之前的条目，
//! 只读旁路，不触碰任何消费组的待确认状态。
//!
use crate::consumer::EventHandler;
use crate::error::{StreamError, StreamResult as Result};
use crate::event::{EntryId, Event};
use crate::store::LogStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    stream: String,
    position: EntryId,
    created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(stream: impl Into<String>, position: EntryId) -> Self {
        Self {
            stream: stream.into(),
            position,
            created_at: Utc::now(),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn position(&self) -> EntryId {
        self.position
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 序列化为可持久化的不透明令牌
    pub fn token(&self) -> String {
        self.to_string()
    }

    /// 从令牌恢复检查点（`created_at` 不进入令牌，恢复时取当前时间）
    pub fn parse(token: &str) -> Result<Self> {
        token.parse()
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.stream, self.position)
    }
}

impl FromStr for Checkpoint {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        let (stream, position) = s.rsplit_once('@').ok_or_else(|| StreamError::InvalidCheckpoint {
            reason: format!("missing '@' in token: {s}"),
        })?;
        if stream.is_empty() {
            return Err(StreamError::InvalidCheckpoint {
                reason: "token has an empty stream name".to_string(),
            });
        }
        Ok(Self::new(stream, position.parse()?))
    }
}

/// 相等性只看流与位点，创建时间不参与
impl PartialEq for Checkpoint {
    fn eq(&self, other: &Self) -> bool {
        self.stream == other.stream && self.position == other.position
    }
}

impl Eq for Checkpoint {}

/// 仅同一流内的检查点可比较
impl PartialOrd for Checkpoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        (self.stream == other.stream).then(|| self.position.cmp(&other.position))
    }
}

pub struct ReplayManager {
    store: Arc<dyn LogStore>,
    page_size: usize,
}

impl ReplayManager {
    pub fn new(store: Arc<dyn LogStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// 捕获流当前尾部位点，与任何消费组的进度无关
    pub async fn create_checkpoint(&self, stream: &str) -> Result<Checkpoint> {
        let position = self.store.tail(stream).await?;
        tracing::debug!(stream, %position, "checkpoint created");
        Ok(Checkpoint::new(stream, position))
    }

    /// 回放检查点之后至调用时流尾的全部条目，返回回放条数。
    ///
    /// 上界取调用时刻的流尾，同一检查点可反复回放以获取“自 X 以来的全部新事件”。
    /// 处理器出错即中止回放。
    pub async fn replay(&self, checkpoint: &Checkpoint, handler: &dyn EventHandler) -> Result<u64> {
        let stream = checkpoint.stream();
        let upper = self.store.tail(stream).await?;
        tracing::info!(stream, from = %checkpoint.position(), to = %upper, "replay started");

        let mut cursor = checkpoint.position();
        let mut replayed = 0u64;
        'pages: while cursor < upper {
            let page = self
                .store
                .read_range(stream, cursor, self.page_size)
                .await
                .map_err(|err| match err {
                    StreamError::Trimmed {
                        first_available, ..
                    } => StreamError::CheckpointExpired {
                        stream: stream.to_string(),
                        position: checkpoint.position(),
                        first_available,
                    },
                    other => other,
                })?;
            if page.is_empty() {
                break;
            }

            for entry in page {
                if entry.id > upper {
                    break 'pages;
                }
                let event = Event::decode(entry.id, &entry.payload)?;
                handler
                    .handle(&event)
                    .await
                    .map_err(|err| StreamError::Handler {
                        handler: handler.handler_name().to_string(),
                        reason: err.to_string(),
                    })?;
                cursor = entry.id;
                replayed += 1;
            }
        }

        tracing::info!(stream, replayed, "replay finished");
        Ok(replayed)
    }
}
