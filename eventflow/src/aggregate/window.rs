use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// 单个指标在窗口内的累计值
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MetricAggregate {
    pub count: i64,
    pub sum: f64,
}

impl MetricAggregate {
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// 以截断后的起始时间为键的固定粒度窗口；创建后只累加，不合并不拆分
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateWindow {
    start: DateTime<Utc>,
    granularity: Duration,
    metrics: BTreeMap<String, MetricAggregate>,
}

impl AggregateWindow {
    pub fn new(start: DateTime<Utc>, granularity: Duration) -> Self {
        Self {
            start,
            granularity,
            metrics: BTreeMap::new(),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn granularity(&self) -> Duration {
        self.granularity
    }

    pub fn metrics(&self) -> &BTreeMap<String, MetricAggregate> {
        &self.metrics
    }

    pub fn metric(&self, key: &str) -> Option<&MetricAggregate> {
        self.metrics.get(key)
    }

    /// 计数加一；`value` 为空时只计数
    pub fn accumulate(&mut self, metric_key: &str, value: Option<f64>) {
        let slot = self.metrics.entry(metric_key.to_string()).or_default();
        slot.count += 1;
        if let Some(value) = value {
            slot.sum += value;
        }
    }

    /// 窗口内所有指标的事件总数
    pub fn total_count(&self) -> i64 {
        self.metrics.values().map(|m| m.count).sum()
    }
}
