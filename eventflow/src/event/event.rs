use super::{EntryId, PropertyValue};
use crate::error::StreamResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 传输单元：一条应用事件
///
/// `id` 与 `timestamp` 由发布端在追加时写入，此后不再改变；
/// `id` 不进入载荷编码，而是在读取时由条目位点回填。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(skip)]
    pub id: Option<EntryId>,
    /// 事件类型，同时决定所属逻辑流
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 指定事件时间（仅对直接聚合等不经发布的路径有意义，发布时会被覆盖）
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// 编码为日志载荷
    pub fn encode(&self) -> StreamResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// 从日志载荷解码，并回填存储分配的位点
    pub fn decode(id: EntryId, payload: &[u8]) -> StreamResult<Self> {
        let mut event: Event = serde_json::from_slice(payload)?;
        event.id = Some(id);
        Ok(event)
    }
}
