use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// 服务实例级计数器，进程生命周期内单调递增
#[derive(Debug)]
pub struct Metrics {
    events_published: AtomicU64,
    events_consumed: AtomicU64,
    processing_errors: AtomicU64,
    last_event_time: Mutex<Option<DateTime<Utc>>>,
    started_at: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_published: AtomicU64::new(0),
            events_consumed: AtomicU64::new(0),
            processing_errors: AtomicU64::new(0),
            last_event_time: Mutex::new(None),
            started_at: Instant::now(),
        }
    }

    pub fn record_published(&self, at: DateTime<Utc>) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        let mut last = self
            .last_event_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // 并发发布下只前进不后退
        if last.is_none_or(|prev| prev < at) {
            *last = Some(at);
        }
    }

    pub fn record_consumed(&self) {
        self.events_consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.processing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let published = self.events_published.load(Ordering::Relaxed);
        let uptime = self.started_at.elapsed();
        let elapsed = uptime.max(Duration::from_millis(1)).as_secs_f64();

        MetricsSnapshot {
            events_published: published,
            events_consumed: self.events_consumed.load(Ordering::Relaxed),
            processing_errors: self.processing_errors.load(Ordering::Relaxed),
            last_event_time: *self
                .last_event_time
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            uptime,
            throughput: published as f64 / elapsed,
        }
    }
}

/// 计数器快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub events_published: u64,
    pub events_consumed: u64,
    pub processing_errors: u64,
    pub last_event_time: Option<DateTime<Utc>>,
    pub uptime: Duration,
    /// 每秒发布事件数（自服务启动起）
    pub throughput: f64,
}
