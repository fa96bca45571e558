//! 日志存储端口（LogStore）
//!
//! 引擎对外部持久化追加日志的唯一硬依赖，仅包含引擎所需的窄接口：
//! - 追加与按区间读取；
//! - 消费组的创建、认领、确认与待确认计数；
//! - 流尾位点与长度。
//!
//! 消费组的“单一认领者 + 崩溃后重投”语义委托给存储原生实现，引擎只负责编排调用。
//!
mod memory;

pub use memory::InMemoryLogStore;

use crate::error::StreamResult as Result;
use crate::event::EntryId;
use async_trait::async_trait;
use std::time::Duration;

/// 日志中的一个条目
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: EntryId,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait LogStore: Send + Sync {
    /// 追加载荷，返回存储分配的位点
    async fn append(&self, stream: &str, payload: Vec<u8>) -> Result<EntryId>;

    /// 确保消费组存在（幂等）
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()>;

    /// 为 `consumer` 认领至多 `max_count` 个条目；暂无可读条目时最多阻塞 `block`。
    ///
    /// 返回的 future 被丢弃时不得丢失已认领条目之外的状态。
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>>;

    /// 确认条目，将其移出组的待确认集合，返回实际确认数
    async fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> Result<u64>;

    /// 按日志顺序读取位点严格大于 `from` 的至多 `count` 个条目。
    ///
    /// 若 `from` 之后的条目已被裁剪，返回 `StreamError::Trimmed`。
    async fn read_range(&self, stream: &str, from: EntryId, count: usize)
    -> Result<Vec<StreamEntry>>;

    /// 当前流尾位点；空流返回 `EntryId::ZERO`
    async fn tail(&self, stream: &str) -> Result<EntryId>;

    async fn length(&self, stream: &str) -> Result<u64>;

    async fn pending_count(&self, stream: &str, group: &str) -> Result<u64>;

    async fn ping(&self) -> Result<()>;

    /// 释放调用方实例持有的连接；同一存储上的其他实例不受影响
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
