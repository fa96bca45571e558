//! 事件流服务（EventStreamService）
//!
//! 对外的服务门面，组合发布、消费组协调、检查点回放、熔断与聚合：
//! - 一个服务实例拥有唯一的 `ConsumerId` 与一组单调计数器；
//! - 熔断器按服务实例划分，由该实例上所有消费循环共享；
//! - `close` 取消该实例上运行中的全部消费循环并关闭存储连接。
//!
use crate::aggregate::EventAggregator;
use crate::breaker::CircuitBreaker;
use crate::checkpoint::{Checkpoint, ReplayManager};
use crate::config::{BreakerConfig, StreamConfig};
use crate::consumer::{ConsumerId, Coordinator, EventHandler};
use crate::error::{StreamError, StreamResult as Result};
use crate::event::{EntryId, Event, Metrics, MetricsSnapshot};
use crate::publisher::Publisher;
use crate::store::LogStore;
use bon::bon;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 单条流的概况
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub stream: String,
    pub length: u64,
    pub last_id: EntryId,
}

pub struct EventStreamService {
    store: Arc<dyn LogStore>,
    config: StreamConfig,
    metrics: Arc<Metrics>,
    publisher: Publisher,
    coordinator: Coordinator,
    replay: ReplayManager,
    aggregator: Option<Arc<EventAggregator>>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

#[bon]
impl EventStreamService {
    #[builder]
    pub fn new(
        store: Arc<dyn LogStore>,
        #[builder(default)] config: StreamConfig,
        aggregator: Option<Arc<EventAggregator>>,
        consumer_id: Option<ConsumerId>,
    ) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(Metrics::new());
        let consumer_id = consumer_id.unwrap_or_else(ConsumerId::generate);

        Ok(Self {
            publisher: Publisher::new(store.clone(), config.clone(), metrics.clone()),
            coordinator: Coordinator::new(
                store.clone(),
                config.clone(),
                consumer_id,
                metrics.clone(),
            ),
            replay: ReplayManager::new(store.clone(), config.replay_page_size),
            store,
            config,
            metrics,
            aggregator,
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }
}

impl EventStreamService {
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// 发布事件；挂载了聚合器时同步计入窗口
    pub async fn publish_event(&self, event: &mut Event) -> Result<EntryId> {
        self.ensure_open()?;
        let id = self.publisher.publish(event).await?;
        if let Some(aggregator) = &self.aggregator {
            aggregator.aggregate(event);
        }
        Ok(id)
    }

    /// 以本实例的消费者身份运行消费循环，直到 `token` 或服务被关闭。
    ///
    /// 返回 `Ok(())` 表示正常取消；任何错误都意味着需要外部介入（重启、告警）。
    pub async fn consume_events(
        &self,
        token: CancellationToken,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        self.ensure_open()?;
        let scoped = self.shutdown.child_token();

        // 调用方取消时转发给本次循环；该分支自身永不完成
        let forward = async {
            token.cancelled().await;
            scoped.cancel();
            std::future::pending::<()>().await
        };

        tokio::select! {
            result = self.coordinator.consume(&scoped, handler.as_ref()) => result,
            _ = forward => Ok(()),
        }
    }

    pub async fn create_checkpoint(&self, event_type: &str) -> Result<Checkpoint> {
        self.ensure_open()?;
        self.replay
            .create_checkpoint(&self.config.stream_name(event_type))
            .await
    }

    /// 回放检查点之后的事件，返回回放条数
    pub async fn replay_from_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        handler: &dyn EventHandler,
    ) -> Result<u64> {
        self.ensure_open()?;
        self.replay.replay(checkpoint, handler).await
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn get_stream_info(&self, event_type: &str) -> Result<StreamInfo> {
        let stream = self.config.stream_name(event_type);
        Ok(StreamInfo {
            length: self.store.length(&stream).await?,
            last_id: self.store.tail(&stream).await?,
            stream,
        })
    }

    /// 本消费组已认领未确认的条目总数，覆盖订阅流与本实例消费循环打开过的全部流
    pub async fn get_consumer_lag(&self) -> Result<u64> {
        let mut streams: BTreeSet<String> = self
            .config
            .subscriptions
            .iter()
            .map(|t| self.config.stream_name(t))
            .collect();
        streams.extend(self.coordinator.opened_streams());

        let mut lag = 0;
        for stream in &streams {
            lag += self.store.pending_count(stream, &self.config.group).await?;
        }
        Ok(lag)
    }

    pub fn get_consumer_id(&self) -> &str {
        self.coordinator.consumer_id().as_str()
    }

    /// 启用（或以新参数替换）本实例的熔断器
    pub fn enable_circuit_breaker(&self, threshold: u32, cooldown: Duration) -> Result<()> {
        let config = BreakerConfig {
            threshold,
            cooldown,
        };
        config.validate()?;
        self.coordinator
            .set_breaker(Arc::new(CircuitBreaker::new(config)));
        tracing::info!(threshold, cooldown_ms = cooldown.as_millis() as u64, "circuit breaker enabled");
        Ok(())
    }

    pub fn circuit_breaker(&self) -> Option<Arc<CircuitBreaker>> {
        self.coordinator.breaker()
    }

    pub fn aggregator(&self) -> Option<&Arc<EventAggregator>> {
        self.aggregator.as_ref()
    }

    pub async fn ping(&self) -> Result<()> {
        self.ensure_open()?;
        self.store.ping().await
    }

    /// 关闭服务：取消本实例运行中的消费循环并释放本实例的存储连接；可重复调用
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.cancel();
        tracing::info!(consumer = self.get_consumer_id(), "event stream service closed");
        self.store.close().await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StreamError::Closed)
        } else {
            Ok(())
        }
    }
}
