//! 时间窗口聚合器（EventAggregator）
//!
//! 将事件折叠进固定粒度的时间窗口：
//! - 窗口键：事件时间按粒度向下取整；
//! - 指标键：事件类型，可附加属性中的区分字段（如 `endpoint`），形如 `type:endpoint`；
//! - 数值：属性 `value` 为有限数值时计入 Sum，否则只计数。
//!
//! 聚合调用只触及内存结构，不阻塞调用方。
//!
use super::{AggregateWindow, InMemoryWindowStore, WindowStore};
use crate::config::AggregatorConfig;
use crate::consumer::{EventHandler, HandledEventType};
use crate::error::StreamResult;
use crate::event::{Event, PropertyValue};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct EventAggregator {
    config: AggregatorConfig,
    store: Arc<dyn WindowStore>,
}

impl EventAggregator {
    pub fn new(config: AggregatorConfig) -> StreamResult<Self> {
        Self::with_store(config, Arc::new(InMemoryWindowStore::new()))
    }

    pub fn with_store(config: AggregatorConfig, store: Arc<dyn WindowStore>) -> StreamResult<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// 将事件计入所属窗口；缺少时间戳的事件按当前时间归窗
    pub fn aggregate(&self, event: &Event) {
        let timestamp = event.timestamp.unwrap_or_else(Utc::now);
        let start = self.window_start(timestamp);
        let metric_key = self.metric_key(event);
        let value = event
            .property(&self.config.value_field)
            .and_then(PropertyValue::as_f64)
            .filter(|v| v.is_finite());

        self.store
            .record(start, self.config.granularity, &metric_key, value);
    }

    /// 按起始时间精确查找窗口
    pub fn get_window(&self, start: DateTime<Utc>) -> Option<AggregateWindow> {
        self.store.get(start)
    }

    /// 起始时间落在 `[from, to)` 内的窗口，升序
    pub fn windows_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<AggregateWindow> {
        self.store
            .starts()
            .into_iter()
            .filter(|start| *start >= from && *start < to)
            .filter_map(|start| self.store.get(start))
            .collect()
    }

    pub fn evict_before(&self, cutoff: DateTime<Utc>) -> usize {
        self.store.evict_before(cutoff)
    }

    /// 时间按粒度向下取整（不是四舍五入）
    pub fn window_start(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let granularity = i64::try_from(self.config.granularity.as_millis()).unwrap_or(i64::MAX);
        let millis = timestamp.timestamp_millis();
        let start = millis.div_euclid(granularity) * granularity;
        DateTime::from_timestamp_millis(start).unwrap_or(timestamp)
    }

    pub fn metric_key(&self, event: &Event) -> String {
        let discriminator = self
            .config
            .discriminator_field
            .as_deref()
            .and_then(|field| event.property(field))
            .and_then(label);

        match discriminator {
            Some(label) => format!("{}:{}", event.event_type, label),
            None => event.event_type.clone(),
        }
    }
}

fn label(value: &PropertyValue) -> Option<String> {
    match value {
        PropertyValue::String(s) if !s.is_empty() => Some(s.clone()),
        PropertyValue::Int(v) => Some(v.to_string()),
        PropertyValue::Bool(v) => Some(v.to_string()),
        _ => None,
    }
}

/// 以处理器形式驱动聚合器，便于挂在独立的聚合消费组上
pub struct AggregatingHandler {
    name: String,
    types: HandledEventType,
    aggregator: Arc<EventAggregator>,
}

impl AggregatingHandler {
    pub fn new(aggregator: Arc<EventAggregator>, types: HandledEventType) -> Self {
        Self {
            name: "aggregator".to_string(),
            types,
            aggregator,
        }
    }
}

#[async_trait]
impl EventHandler for AggregatingHandler {
    fn handler_name(&self) -> &str {
        &self.name
    }

    fn handled_event_type(&self) -> HandledEventType {
        self.types.clone()
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self.aggregator.aggregate(event);
        Ok(())
    }
}
