use anyhow::Result as AnyResult;
use chrono::{TimeZone, Utc};
use eventflow::aggregate::{AggregatingHandler, EventAggregator};
use eventflow::config::{AggregatorConfig, StreamConfig};
use eventflow::consumer::{EventHandler, HandledEventType};
use eventflow::event::{EntryId, Event};
use eventflow::store::{InMemoryLogStore, LogStore};
use eventflow::{EventStreamService, StreamError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Idle;

#[async_trait::async_trait]
impl EventHandler for Idle {
    fn handler_name(&self) -> &str {
        "idle"
    }

    async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
        Ok(())
    }
}

fn service(store: Arc<InMemoryLogStore>) -> EventStreamService {
    EventStreamService::builder()
        .store(store)
        .config(StreamConfig {
            subscriptions: vec!["page.view".to_string()],
            block_timeout: Duration::from_millis(50),
            ..Default::default()
        })
        .build()
        .expect("valid config")
}

#[tokio::test]
async fn high_volume_publishing_updates_metrics() -> AnyResult<()> {
    let svc = service(Arc::new(InMemoryLogStore::new()));
    for n in 0..1000 {
        let mut event = Event::new("page.view")
            .with_user(format!("u-{}", n % 7))
            .with_property("value", n);
        svc.publish_event(&mut event).await?;
    }

    let metrics = svc.get_metrics();
    assert_eq!(metrics.events_published, 1000);
    assert!(metrics.throughput > 0.0);
    assert!(metrics.last_event_time.is_some());

    let info = svc.get_stream_info("page.view").await?;
    assert_eq!(info.stream, "events:page.view");
    assert_eq!(info.length, 1000);
    assert!(info.last_id > EntryId::ZERO);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_publishers_are_all_counted() -> AnyResult<()> {
    let svc = Arc::new(service(Arc::new(InMemoryLogStore::new())));
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let svc = svc.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..50 {
                svc.publish_event(&mut Event::new("page.view")).await?;
            }
            Ok::<_, StreamError>(())
        }));
    }
    for task in tasks {
        task.await??;
    }
    assert_eq!(svc.get_metrics().events_published, 400);
    assert_eq!(svc.get_stream_info("page.view").await?.length, 400);
    Ok(())
}

#[tokio::test]
async fn consumer_lag_counts_claimed_but_unacked_entries() -> AnyResult<()> {
    let store = Arc::new(InMemoryLogStore::new());
    let svc = service(store.clone());
    for _ in 0..3 {
        svc.publish_event(&mut Event::new("page.view")).await?;
    }
    store.ensure_group("events:page.view", "eventflow").await?;
    store
        .read_group("events:page.view", "eventflow", "other", 2, Duration::ZERO)
        .await?;

    assert_eq!(svc.get_consumer_lag().await?, 2);
    Ok(())
}

/// 只处理自选类型、且始终失败的处理器
struct RejectClicks;

#[async_trait::async_trait]
impl EventHandler for RejectClicks {
    fn handler_name(&self) -> &str {
        "reject-clicks"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::One("click".to_string())
    }

    async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
        anyhow::bail!("click sink offline")
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn consumer_lag_covers_streams_chosen_by_typed_handlers() -> AnyResult<()> {
    let store = Arc::new(InMemoryLogStore::new());
    let svc = Arc::new(service(store.clone()));
    for _ in 0..3 {
        svc.publish_event(&mut Event::new("click")).await?;
    }

    let token = CancellationToken::new();
    let task = {
        let svc = svc.clone();
        let token = token.clone();
        tokio::spawn(async move { svc.consume_events(token, Arc::new(RejectClicks)).await })
    };
    tokio::time::timeout(Duration::from_secs(2), async {
        while svc.get_metrics().processing_errors < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    token.cancel();
    task.await??;

    assert_eq!(store.pending_count("events:click", "eventflow").await?, 3);
    assert_eq!(svc.get_consumer_lag().await?, 3);
    Ok(())
}

#[tokio::test]
async fn closing_one_instance_leaves_siblings_on_the_same_store_running() -> AnyResult<()> {
    let store = Arc::new(InMemoryLogStore::new());
    let first = service(store.clone());
    let second = service(store.clone());

    first.close().await?;
    assert!(matches!(first.ping().await, Err(StreamError::Closed)));

    second.ping().await?;
    second.publish_event(&mut Event::new("page.view")).await?;
    assert_eq!(second.get_stream_info("page.view").await?.length, 1);
    Ok(())
}

#[tokio::test]
async fn close_stops_the_service() -> AnyResult<()> {
    let svc = service(Arc::new(InMemoryLogStore::new()));
    svc.ping().await?;
    svc.close().await?;
    svc.close().await?;

    assert!(matches!(svc.ping().await, Err(StreamError::Closed)));
    let err = svc
        .publish_event(&mut Event::new("page.view"))
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::Closed));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn close_cancels_running_consumers() -> AnyResult<()> {
    let svc = Arc::new(service(Arc::new(InMemoryLogStore::new())));
    let task = {
        let svc = svc.clone();
        tokio::spawn(async move {
            svc.consume_events(CancellationToken::new(), Arc::new(Idle))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    svc.close().await?;

    let result = tokio::time::timeout(Duration::from_secs(1), task).await??;
    assert!(result.is_ok());
    Ok(())
}

#[tokio::test]
async fn invalid_config_is_rejected_at_build_time() {
    let result = EventStreamService::builder()
        .store(Arc::new(InMemoryLogStore::new()))
        .config(StreamConfig {
            batch_size: 0,
            ..Default::default()
        })
        .build();
    assert!(matches!(result, Err(StreamError::InvalidConfig { .. })));
}

#[tokio::test]
async fn attached_aggregator_sees_published_events() -> AnyResult<()> {
    let aggregator = Arc::new(EventAggregator::new(AggregatorConfig::default())?);
    let svc = EventStreamService::builder()
        .store(Arc::new(InMemoryLogStore::new()))
        .aggregator(aggregator.clone())
        .build()?;

    let mut event = Event::new("api.request")
        .with_property("endpoint", "/login")
        .with_property("value", 120);
    svc.publish_event(&mut event).await?;

    let start = aggregator.window_start(event.timestamp.expect("stamped"));
    let window = aggregator.get_window(start).expect("window exists");
    let metric = window.metric("api.request:/login").expect("metric exists");
    assert_eq!(metric.count, 1);
    assert_eq!(metric.sum, 120.0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn dedicated_aggregation_group_builds_windows() -> AnyResult<()> {
    let store = Arc::new(InMemoryLogStore::new());
    let producer = service(store.clone());
    let aggregation = Arc::new(
        EventStreamService::builder()
            .store(store)
            .config(StreamConfig {
                group: "aggregation".to_string(),
                block_timeout: Duration::from_millis(50),
                ..Default::default()
            })
            .build()?,
    );
    for _ in 0..4 {
        producer
            .publish_event(&mut Event::new("page.view").with_property("value", 1.5))
            .await?;
    }

    let aggregator = Arc::new(EventAggregator::new(AggregatorConfig::default())?);
    let handler = Arc::new(AggregatingHandler::new(
        aggregator.clone(),
        HandledEventType::One("page.view".into()),
    ));
    let token = CancellationToken::new();
    let task = {
        let aggregation = aggregation.clone();
        let token = token.clone();
        tokio::spawn(async move { aggregation.consume_events(token, handler).await })
    };

    let _ = tokio::time::timeout(Duration::from_secs(2), async {
        while aggregation.get_metrics().events_consumed < 4 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    token.cancel();
    task.await??;

    let windows = aggregator.windows_between(
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
        Utc::now() + chrono::TimeDelta::minutes(1),
    );
    let (count, sum) = windows
        .iter()
        .filter_map(|w| w.metric("page.view"))
        .fold((0, 0.0), |(c, s), m| (c + m.count, s + m.sum));
    assert_eq!(count, 4);
    assert_eq!(sum, 6.0);
    Ok(())
}
