use super::AggregateWindow;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

/// 窗口存储：可插拔的窗口状态后端。
///
/// 实现必须保证同一窗口同一指标的计数与求和原子更新，且调用不阻塞于 I/O。
pub trait WindowStore: Send + Sync {
    fn record(&self, start: DateTime<Utc>, granularity: Duration, metric_key: &str, value: Option<f64>);

    /// 返回起始时间精确匹配的窗口快照
    fn get(&self, start: DateTime<Utc>) -> Option<AggregateWindow>;

    /// 已有窗口的起始时间，升序
    fn starts(&self) -> Vec<DateTime<Utc>>;

    /// 删除起始时间早于 `cutoff` 的窗口，返回删除数量
    fn evict_before(&self, cutoff: DateTime<Utc>) -> usize;
}

/// 基于 DashMap 的内存窗口存储，分片锁即窗口级锁
#[derive(Default)]
pub struct InMemoryWindowStore {
    windows: DashMap<i64, AggregateWindow>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl WindowStore for InMemoryWindowStore {
    fn record(&self, start: DateTime<Utc>, granularity: Duration, metric_key: &str, value: Option<f64>) {
        self.windows
            .entry(start.timestamp_millis())
            .or_insert_with(|| AggregateWindow::new(start, granularity))
            .accumulate(metric_key, value);
    }

    fn get(&self, start: DateTime<Utc>) -> Option<AggregateWindow> {
        self.windows
            .get(&start.timestamp_millis())
            .map(|w| w.value().clone())
    }

    fn starts(&self) -> Vec<DateTime<Utc>> {
        let mut starts: Vec<_> = self.windows.iter().map(|w| w.value().start()).collect();
        starts.sort();
        starts
    }

    fn evict_before(&self, cutoff: DateTime<Utc>) -> usize {
        let cutoff = cutoff.timestamp_millis();
        let mut evicted = 0;
        self.windows.retain(|start, _| {
            let keep = *start >= cutoff;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }
}
