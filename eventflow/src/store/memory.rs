//! 内存版日志存储（InMemoryLogStore）
//!
//! 基于互斥锁 + `tokio::sync::Notify` 实现的轻量日志存储，满足 `LogStore` 协议：
//! - `append`：分配严格递增位点并唤醒阻塞读取者；
//! - `read_group`：先认领空闲超过可见性超时的待确认条目（自动认领），再投递新条目；
//! - `max_len`：超出上限时裁剪最旧条目，并记录已裁剪的最高位点；
//! - 典型用途：测试环境、示例与本地开发。
//!
//! 注意：数据仅存在于进程内存中，重启即丢失。

use crate::error::{StreamError, StreamResult as Result};
use crate::event::EntryId;
use crate::store::{LogStore, StreamEntry};
use async_trait::async_trait;
use bon::Builder;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Builder)]
pub struct InMemoryLogStore {
    /// 已认领但未确认的条目在此时长后可被组内其他消费者重新认领
    #[builder(default = Duration::from_secs(30))]
    visibility_timeout: Duration,
    /// 每条流保留的最大条目数
    max_len: Option<usize>,
    #[builder(skip)]
    streams: Mutex<HashMap<String, StreamState>>,
    #[builder(skip)]
    notify: Notify,
    #[builder(skip = AtomicBool::new(true))]
    available: AtomicBool,
}

#[derive(Default)]
struct StreamState {
    entries: VecDeque<StreamEntry>,
    last_id: EntryId,
    trimmed_through: Option<EntryId>,
    groups: HashMap<String, GroupState>,
}

#[derive(Default)]
struct GroupState {
    last_delivered: EntryId,
    pending: BTreeMap<EntryId, PendingEntry>,
}

struct PendingEntry {
    consumer: String,
    delivered_at: Instant,
    deliveries: u32,
}

impl Default for InMemoryLogStore {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟存储不可用/恢复（测试用）
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// 某条目在组内被投递的次数（测试与诊断用）
    pub fn delivery_count(&self, stream: &str, group: &str, id: EntryId) -> Option<u32> {
        let streams = self.lock();
        streams
            .get(stream)?
            .groups
            .get(group)?
            .pending
            .get(&id)
            .map(|p| p.deliveries)
    }

    /// 某条目当前的认领者（测试与诊断用）
    pub fn pending_owner(&self, stream: &str, group: &str, id: EntryId) -> Option<String> {
        let streams = self.lock();
        streams
            .get(stream)?
            .groups
            .get(group)?
            .pending
            .get(&id)
            .map(|p| p.consumer.clone())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StreamState>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StreamError::store_unavailable("in-memory log store is offline"))
        }
    }

    fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> Result<Vec<StreamEntry>> {
        self.ensure_available()?;
        let mut streams = self.lock();
        let no_group = || {
            StreamError::store_unavailable(format!("NOGROUP stream={stream} group={group}"))
        };
        let StreamState {
            entries, groups, ..
        } = streams.get_mut(stream).ok_or_else(no_group)?;
        let state = groups.get_mut(group).ok_or_else(no_group)?;

        let now = Instant::now();
        let mut claimed = Vec::new();

        // 自动认领空闲超时的待确认条目；已被裁剪的条目直接移出待确认集合
        let mut vanished = Vec::new();
        for (id, pending) in state.pending.iter_mut() {
            if claimed.len() >= max_count {
                break;
            }
            if now.duration_since(pending.delivered_at) < self.visibility_timeout {
                continue;
            }
            match entries.binary_search_by_key(id, |e| e.id) {
                Ok(idx) => {
                    pending.consumer = consumer.to_string();
                    pending.delivered_at = now;
                    pending.deliveries += 1;
                    claimed.push(entries[idx].clone());
                }
                Err(_) => vanished.push(*id),
            }
        }
        for id in vanished {
            state.pending.remove(&id);
        }

        let start = entries.partition_point(|e| e.id <= state.last_delivered);
        for entry in entries.range(start..).take(max_count - claimed.len()) {
            state.pending.insert(
                entry.id,
                PendingEntry {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    deliveries: 1,
                },
            );
            state.last_delivered = entry.id;
            claimed.push(entry.clone());
        }

        Ok(claimed)
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn append(&self, stream: &str, payload: Vec<u8>) -> Result<EntryId> {
        self.ensure_available()?;
        let id = {
            let mut streams = self.lock();
            let state = streams.entry(stream.to_string()).or_default();
            let now_millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
            let id = EntryId::next_after(state.last_id, now_millis);
            state.entries.push_back(StreamEntry { id, payload });
            state.last_id = id;

            if let Some(max_len) = self.max_len {
                while state.entries.len() > max_len {
                    if let Some(old) = state.entries.pop_front() {
                        state.trimmed_through = Some(old.id);
                    }
                }
            }
            id
        };
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        self.ensure_available()?;
        if group.is_empty() {
            return Err(StreamError::GroupCreateFailed {
                stream: stream.to_string(),
                group: group.to_string(),
                reason: "group name must not be empty".to_string(),
            });
        }
        let mut streams = self.lock();
        // 新建的组从流起点开始投递，建组前已追加的条目同样可见
        streams
            .entry(stream.to_string())
            .or_default()
            .groups
            .entry(group.to_string())
            .or_default();
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>> {
        let deadline = Instant::now() + block;
        loop {
            // 先登记唤醒再检查，避免检查与等待之间的追加被错过
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let claimed = self.claim(stream, group, consumer, max_count)?;
            if !claimed.is_empty() || block.is_zero() {
                return Ok(claimed);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> Result<u64> {
        self.ensure_available()?;
        let mut streams = self.lock();
        let Some(state) = streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
        else {
            return Ok(0);
        };
        let acked = ids
            .iter()
            .filter(|id| state.pending.remove(*id).is_some())
            .count();
        Ok(acked as u64)
    }

    async fn read_range(
        &self,
        stream: &str,
        from: EntryId,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        self.ensure_available()?;
        let streams = self.lock();
        let Some(state) = streams.get(stream) else {
            return Ok(Vec::new());
        };
        if let Some(trimmed) = state.trimmed_through {
            if from < trimmed {
                return Err(StreamError::Trimmed {
                    stream: stream.to_string(),
                    requested: from,
                    first_available: state
                        .entries
                        .front()
                        .map(|e| e.id)
                        .unwrap_or(state.last_id),
                });
            }
        }
        let start = state.entries.partition_point(|e| e.id <= from);
        Ok(state.entries.range(start..).take(count).cloned().collect())
    }

    async fn tail(&self, stream: &str) -> Result<EntryId> {
        self.ensure_available()?;
        Ok(self
            .lock()
            .get(stream)
            .map(|s| s.last_id)
            .unwrap_or(EntryId::ZERO))
    }

    async fn length(&self, stream: &str) -> Result<u64> {
        self.ensure_available()?;
        Ok(self
            .lock()
            .get(stream)
            .map(|s| s.entries.len() as u64)
            .unwrap_or(0))
    }

    async fn pending_count(&self, stream: &str, group: &str) -> Result<u64> {
        self.ensure_available()?;
        Ok(self
            .lock()
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.pending.len() as u64)
            .unwrap_or(0))
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_available()
    }

    /// 内存存储由所有服务实例共享，没有按实例持有的连接可释放
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
