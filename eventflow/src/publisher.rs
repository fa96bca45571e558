//! 事件发布（Publisher）
//!
//! 为事件打上时间戳、编码并追加到所属逻辑流；追加成功即对该流的消费者可见，
//! 发布端不缓冲也不重试，重试策略由调用方决定。
//!
use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult as Result};
use crate::event::{EntryId, Event, Metrics};
use crate::store::LogStore;
use chrono::Utc;
use std::sync::Arc;

pub struct Publisher {
    store: Arc<dyn LogStore>,
    config: StreamConfig,
    metrics: Arc<Metrics>,
}

impl Publisher {
    pub fn new(store: Arc<dyn LogStore>, config: StreamConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            config,
            metrics,
        }
    }

    /// 发布事件，成功后将存储分配的位点与时间戳写回 `event`。
    ///
    /// 调用方预先设置的 `id`/`timestamp` 会被覆盖。
    pub async fn publish(&self, event: &mut Event) -> Result<EntryId> {
        if event.event_type.trim().is_empty() {
            return Err(StreamError::invalid_event("event type is required"));
        }
        if let Some((key, _)) = event.properties.iter().find(|(_, v)| !v.is_finite()) {
            return Err(StreamError::invalid_event(format!(
                "property {key} holds a non-finite number"
            )));
        }
        if event.id.is_some() || event.timestamp.is_some() {
            tracing::debug!(
                event_type = %event.event_type,
                "overwriting caller-supplied id/timestamp"
            );
        }

        let timestamp = Utc::now();
        let mut stamped = Event {
            id: None,
            timestamp: Some(timestamp),
            ..event.clone()
        };
        let payload = stamped.encode()?;
        let stream = self.config.stream_name(&stamped.event_type);

        let id = self
            .store
            .append(&stream, payload)
            .await
            .map_err(|err| match err {
                StreamError::StoreUnavailable { .. } => err,
                other => StreamError::store_unavailable(other.to_string()),
            })?;

        stamped.id = Some(id);
        *event = stamped;
        self.metrics.record_published(timestamp);
        tracing::debug!(stream = %stream, %id, "event published");
        Ok(id)
    }
}
