//! 引擎配置
//!
//! 各组件配置均为公开字段的普通结构体，`Default` 给出文档约定的默认值，
//! 并可经 serde 从 JSON 加载（时长字段以毫秒表示）。
//!
use crate::error::{StreamError, StreamResult};
use serde::Deserialize;
use std::time::Duration;

/// 流与消费组配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// 逻辑流名前缀，完整流名为 `prefix + event_type`
    pub stream_prefix: String,
    /// 消费组名
    pub group: String,
    /// 处理器订阅 `All` 时消费的事件类型
    pub subscriptions: Vec<String>,
    /// 单次认领的最大条目数
    pub batch_size: usize,
    /// 无新条目时阻塞读取的最长时间
    #[serde(rename = "block_timeout_ms", with = "duration_ms")]
    pub block_timeout: Duration,
    /// 回放时每页读取的条目数
    pub replay_page_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_prefix: "events:".to_string(),
            group: "eventflow".to_string(),
            subscriptions: vec!["default".to_string()],
            batch_size: 10,
            block_timeout: Duration::from_secs(1),
            replay_page_size: 100,
        }
    }
}

impl StreamConfig {
    pub fn stream_name(&self, event_type: &str) -> String {
        format!("{}{}", self.stream_prefix, event_type)
    }

    pub fn validate(&self) -> StreamResult<()> {
        if self.group.is_empty() {
            return Err(StreamError::invalid_config("group must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(StreamError::invalid_config("batch_size must be >= 1"));
        }
        if self.replay_page_size == 0 {
            return Err(StreamError::invalid_config("replay_page_size must be >= 1"));
        }
        if self.subscriptions.iter().any(String::is_empty) {
            return Err(StreamError::invalid_config(
                "subscriptions must not contain empty types",
            ));
        }
        Ok(())
    }
}

/// 熔断器配置
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// 连续失败达到该值即熔断
    pub threshold: u32,
    /// 熔断后进入半开前的冷却时间
    #[serde(rename = "cooldown_ms", with = "duration_ms")]
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl BreakerConfig {
    pub fn validate(&self) -> StreamResult<()> {
        if self.threshold == 0 {
            return Err(StreamError::invalid_config("breaker threshold must be >= 1"));
        }
        Ok(())
    }
}

/// 时间窗口聚合配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// 窗口粒度（向下取整）
    #[serde(rename = "granularity_ms", with = "duration_ms")]
    pub granularity: Duration,
    /// 从属性中提取的指标区分字段
    pub discriminator_field: Option<String>,
    /// 数值字段
    pub value_field: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            granularity: Duration::from_secs(60),
            discriminator_field: Some("endpoint".to_string()),
            value_field: "value".to_string(),
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> StreamResult<()> {
        if self.granularity.as_millis() == 0 {
            return Err(StreamError::invalid_config(
                "granularity must be at least one millisecond",
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
