//! 消费组协调器（Coordinator）
//!
//! 统一编排“建组 → 认领 → 分发处理 → 确认/记账”的长驻消费循环：
//! - 同组多实例竞争消费，同一条目在组内只交给一个存活实例；
//! - 不同组各自完整消费同一条流（扇出）；
//! - 处理失败的条目保持待确认，由存储在可见性超时后重投；
//! - 每轮认领前咨询熔断器，熔断时立即返回 `CircuitOpen`。
//!
use super::{ConsumerId, EventHandler};
use crate::breaker::CircuitBreaker;
use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult as Result};
use crate::event::{Event, Metrics};
use crate::store::{LogStore, StreamEntry};
use dashmap::DashSet;
use futures_util::future::select_all;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Coordinator {
    store: Arc<dyn LogStore>,
    config: StreamConfig,
    consumer_id: ConsumerId,
    metrics: Arc<Metrics>,
    breaker: RwLock<Option<Arc<CircuitBreaker>>>,
    /// 消费循环实际打开过的流（含处理器自选的类型）
    opened: DashSet<String>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn LogStore>,
        config: StreamConfig,
        consumer_id: ConsumerId,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            config,
            consumer_id,
            metrics,
            breaker: RwLock::new(None),
            opened: DashSet::new(),
        }
    }

    pub fn consumer_id(&self) -> &ConsumerId {
        &self.consumer_id
    }

    /// 安装（或替换）熔断器；运行中的消费循环在下一轮认领前生效
    pub fn set_breaker(&self, breaker: Arc<CircuitBreaker>) {
        *self.breaker.write().unwrap_or_else(PoisonError::into_inner) = Some(breaker);
    }

    pub fn breaker(&self) -> Option<Arc<CircuitBreaker>> {
        self.breaker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 已建组并开始消费的流，升序
    pub fn opened_streams(&self) -> Vec<String> {
        let mut streams: Vec<_> = self.opened.iter().map(|s| s.key().clone()).collect();
        streams.sort();
        streams
    }

    /// 处理器订阅的完整流名列表
    pub fn streams_for(&self, handler: &dyn EventHandler) -> Vec<String> {
        handler
            .handled_event_type()
            .resolve(&self.config.subscriptions)
            .iter()
            .map(|t| self.config.stream_name(t))
            .collect()
    }

    /// 运行消费循环，直到 `token` 被取消（返回 `Ok(())`）或发生致命错误。
    ///
    /// 单条处理失败只计入指标与熔断器，不终止循环。
    pub async fn consume(
        &self,
        token: &CancellationToken,
        handler: &dyn EventHandler,
    ) -> Result<()> {
        let streams = self.streams_for(handler);
        if streams.is_empty() {
            return Err(StreamError::invalid_config(format!(
                "handler {} subscribes to no event types",
                handler.handler_name()
            )));
        }

        for stream in &streams {
            self.ensure_group(stream).await?;
            self.opened.insert(stream.clone());
        }

        tracing::info!(
            consumer = %self.consumer_id,
            group = %self.config.group,
            handler = handler.handler_name(),
            streams = ?streams,
            "consumer loop started"
        );

        loop {
            if token.is_cancelled() {
                return Ok(());
            }

            let breaker = self.breaker();
            if let Some(breaker) = &breaker {
                if !breaker.allow() {
                    return Err(StreamError::CircuitOpen);
                }
            }

            let claimed = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                claimed = self.claim(&streams) => claimed,
            };
            let batch = match claimed {
                Ok(batch) => batch,
                // 关闭过程中存储先于循环退出而报错，视为正常取消
                Err(_) if token.is_cancelled() => return Ok(()),
                Err(err) => return Err(err),
            };

            for (stream, entry) in batch {
                // 已认领未处理的条目留在待确认集合，超时后重投
                if token.is_cancelled() {
                    return Ok(());
                }
                self.process(&stream, entry, handler, breaker.as_deref())
                    .await?;
            }
        }
    }

    async fn ensure_group(&self, stream: &str) -> Result<()> {
        let group = &self.config.group;
        match self.store.ensure_group(stream, group).await {
            Ok(()) => {
                tracing::debug!(stream, group = %group, "consumer group ready");
                Ok(())
            }
            Err(err @ (StreamError::StoreUnavailable { .. } | StreamError::GroupCreateFailed { .. })) => {
                Err(err)
            }
            Err(other) => Err(StreamError::GroupCreateFailed {
                stream: stream.to_string(),
                group: group.clone(),
                reason: other.to_string(),
            }),
        }
    }

    /// 先对所有流做一次非阻塞认领；均为空时在各流上并发阻塞读取，取最先返回者
    async fn claim(&self, streams: &[String]) -> Result<Vec<(String, StreamEntry)>> {
        let group = &self.config.group;
        let consumer = self.consumer_id.as_str();
        let batch_size = self.config.batch_size;

        let mut claimed = Vec::new();
        for stream in streams {
            let entries = self
                .store
                .read_group(stream, group, consumer, batch_size, Duration::ZERO)
                .await?;
            claimed.extend(entries.into_iter().map(|e| (stream.clone(), e)));
        }
        if !claimed.is_empty() {
            return Ok(claimed);
        }

        let reads = streams.iter().map(|stream| {
            self.store
                .read_group(stream, group, consumer, batch_size, self.config.block_timeout)
        });
        let (entries, idx, _pending_reads) = select_all(reads).await;
        let stream = &streams[idx];
        Ok(entries?
            .into_iter()
            .map(|e| (stream.clone(), e))
            .collect())
    }

    async fn process(
        &self,
        stream: &str,
        entry: StreamEntry,
        handler: &dyn EventHandler,
        breaker: Option<&CircuitBreaker>,
    ) -> Result<()> {
        let group = &self.config.group;

        let event = match Event::decode(entry.id, &entry.payload) {
            Ok(event) => event,
            Err(err) => {
                // 无法解码的条目重投也不会成功，计错后确认丢弃
                self.metrics.record_error();
                tracing::error!(stream, id = %entry.id, error = %err, "dropping undecodable entry");
                self.store.ack(stream, group, &[entry.id]).await?;
                return Ok(());
            }
        };

        match handler.handle(&event).await {
            Ok(()) => {
                self.store.ack(stream, group, &[entry.id]).await?;
                self.metrics.record_consumed();
                if let Some(breaker) = breaker {
                    breaker.record_success();
                }
            }
            Err(err) => {
                self.metrics.record_error();
                if let Some(breaker) = breaker {
                    breaker.record_failure();
                }
                tracing::warn!(
                    handler = handler.handler_name(),
                    stream,
                    id = %entry.id,
                    error = %err,
                    "event handler failed, entry left pending"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::HandledEventType;
    use crate::store::InMemoryLogStore;
    use async_trait::async_trait;

    struct Typed(HandledEventType);

    #[async_trait]
    impl EventHandler for Typed {
        fn handler_name(&self) -> &str {
            "typed"
        }

        fn handled_event_type(&self) -> HandledEventType {
            self.0.clone()
        }

        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn coordinator(subscriptions: Vec<String>) -> Coordinator {
        Coordinator::new(
            Arc::new(InMemoryLogStore::new()),
            StreamConfig {
                subscriptions,
                ..Default::default()
            },
            ConsumerId::from("c-1".to_string()),
            Arc::new(Metrics::new()),
        )
    }

    #[test]
    fn handler_types_map_to_prefixed_streams() {
        let coordinator = coordinator(vec!["a".into(), "b".into()]);
        assert_eq!(
            coordinator.streams_for(&Typed(HandledEventType::All)),
            vec!["events:a", "events:b"]
        );
        assert_eq!(
            coordinator.streams_for(&Typed(HandledEventType::One("c".into()))),
            vec!["events:c"]
        );
    }

    #[tokio::test]
    async fn empty_subscription_is_a_config_error() {
        let coordinator = coordinator(vec![]);
        let result = coordinator
            .consume(&CancellationToken::new(), &Typed(HandledEventType::All))
            .await;
        assert!(matches!(result, Err(StreamError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn undecodable_entries_are_counted_and_acked() {
        let store = Arc::new(InMemoryLogStore::new());
        store.append("events:a", b"garbage".to_vec()).await.unwrap();
        let metrics = Arc::new(Metrics::new());
        let coordinator = Coordinator::new(
            store.clone(),
            StreamConfig {
                subscriptions: vec!["a".into()],
                block_timeout: Duration::from_millis(20),
                ..Default::default()
            },
            ConsumerId::from("c-1".to_string()),
            metrics.clone(),
        );

        let token = CancellationToken::new();
        let run = coordinator.consume(&token, &Typed(HandledEventType::All));
        let stop = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        };
        let (result, ()) = tokio::join!(run, stop);

        result.unwrap();
        assert_eq!(metrics.snapshot().processing_errors, 1);
        assert_eq!(store.pending_count("events:a", "eventflow").await.unwrap(), 0);
    }
}
