use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use eventflow::EventStreamService;
use eventflow::aggregate::EventAggregator;
use eventflow::config::{AggregatorConfig, StreamConfig};
use eventflow::consumer::EventHandler;
use eventflow::event::Event;
use eventflow::store::InMemoryLogStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// 打印并计数收到的事件
struct PrintHandler {
    seen: AtomicU64,
}

#[async_trait]
impl EventHandler for PrintHandler {
    fn handler_name(&self) -> &str {
        "print"
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            id = ?event.id,
            event_type = %event.event_type,
            user = ?event.user_id,
            "handled"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let aggregator = Arc::new(EventAggregator::new(AggregatorConfig::default())?);
    let service = Arc::new(
        EventStreamService::builder()
            .store(Arc::new(InMemoryLogStore::new()))
            .config(StreamConfig {
                subscriptions: vec!["api_call".into(), "click".into()],
                block_timeout: Duration::from_millis(200),
                ..Default::default()
            })
            .aggregator(aggregator.clone())
            .build()?,
    );
    service.enable_circuit_breaker(5, Duration::from_secs(30))?;
    println!("consumer id: {}", service.get_consumer_id());

    // 启动消费循环
    let handler = Arc::new(PrintHandler {
        seen: AtomicU64::new(0),
    });
    let token = CancellationToken::new();
    let consumer = tokio::spawn({
        let service = service.clone();
        let handler: Arc<dyn EventHandler> = handler.clone();
        let token = token.clone();
        async move { service.consume_events(token, handler).await }
    });

    // 发布
    for (i, endpoint) in ["/login", "/orders", "/login"].iter().enumerate() {
        let mut event = Event::new("api_call")
            .with_user(format!("u-{i}"))
            .with_property("endpoint", *endpoint)
            .with_property("value", 120.0 + i as f64 * 10.0);
        let id = service.publish_event(&mut event).await?;
        println!("published api_call at {id}");
    }

    let checkpoint = service.create_checkpoint("click").await?;
    println!("checkpoint: {checkpoint}");
    for button in ["buy", "share"] {
        let mut event = Event::new("click").with_property("button", button);
        service.publish_event(&mut event).await?;
    }

    // 等待消费完成
    while handler.seen.load(Ordering::SeqCst) < 5 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // 回放检查点之后的点击
    let replayed = service
        .replay_from_checkpoint(&checkpoint, handler.as_ref())
        .await?;
    println!("replayed: {replayed} events");

    let info = service.get_stream_info("api_call").await?;
    println!("stream info: {info:?}");
    println!("consumer lag: {}", service.get_consumer_lag().await?);
    println!("metrics: {:?}", service.get_metrics());

    let now = Utc::now();
    for window in aggregator.windows_between(now - TimeDelta::minutes(5), now + TimeDelta::minutes(1)) {
        for (key, metric) in window.metrics() {
            println!(
                "window {} {key}: count={}, sum={}, avg={:?}",
                window.start(),
                metric.count,
                metric.sum,
                metric.average()
            );
        }
    }

    token.cancel();
    consumer.await??;
    service.close().await?;
    Ok(())
}
