use anyhow::Result as AnyResult;
use eventflow::checkpoint::Checkpoint;
use eventflow::config::StreamConfig;
use eventflow::consumer::EventHandler;
use eventflow::event::{EntryId, Event};
use eventflow::store::{InMemoryLogStore, LogStore};
use eventflow::{EventStreamService, StreamError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Collector {
    names: Mutex<Vec<String>>,
}

impl Collector {
    fn names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EventHandler for Collector {
    fn handler_name(&self) -> &str {
        "collector"
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let name = event
            .property("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.names.lock().unwrap().push(name);
        Ok(())
    }
}

struct Rejecting;

#[async_trait::async_trait]
impl EventHandler for Rejecting {
    fn handler_name(&self) -> &str {
        "rejecting"
    }

    async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
        anyhow::bail!("not today")
    }
}

fn service(store: Arc<InMemoryLogStore>) -> EventStreamService {
    EventStreamService::builder()
        .store(store)
        .config(StreamConfig {
            subscriptions: vec!["order".to_string()],
            replay_page_size: 2,
            block_timeout: Duration::from_millis(50),
            ..Default::default()
        })
        .build()
        .expect("valid config")
}

async fn publish(svc: &EventStreamService, name: &str) -> AnyResult<EntryId> {
    let mut event = Event::new("order").with_property("name", name);
    Ok(svc.publish_event(&mut event).await?)
}

#[tokio::test]
async fn replay_yields_exactly_the_entries_after_the_checkpoint() -> AnyResult<()> {
    let svc = service(Arc::new(InMemoryLogStore::new()));
    publish(&svc, "e1").await?;
    publish(&svc, "e2").await?;
    let checkpoint = svc.create_checkpoint("order").await?;
    publish(&svc, "e3").await?;
    publish(&svc, "e4").await?;

    let collector = Collector::default();
    let replayed = svc.replay_from_checkpoint(&checkpoint, &collector).await?;

    assert_eq!(replayed, 2);
    assert_eq!(collector.names(), vec!["e3", "e4"]);
    Ok(())
}

#[tokio::test]
async fn replay_upper_bound_is_the_tail_at_call_time() -> AnyResult<()> {
    let svc = service(Arc::new(InMemoryLogStore::new()));
    let checkpoint = svc.create_checkpoint("order").await?;
    assert_eq!(checkpoint.position(), EntryId::ZERO);

    publish(&svc, "a").await?;
    let first = Collector::default();
    svc.replay_from_checkpoint(&checkpoint, &first).await?;

    publish(&svc, "b").await?;
    let second = Collector::default();
    svc.replay_from_checkpoint(&checkpoint, &second).await?;

    assert_eq!(first.names(), vec!["a"]);
    assert_eq!(second.names(), vec!["a", "b"]);
    Ok(())
}

#[tokio::test]
async fn persisted_token_replays_after_restart() -> AnyResult<()> {
    let store = Arc::new(InMemoryLogStore::new());
    let token = {
        let svc = service(store.clone());
        publish(&svc, "before").await?;
        let token = svc.create_checkpoint("order").await?.token();
        publish(&svc, "after").await?;
        token
    };

    let restarted = service(store);
    let checkpoint = Checkpoint::parse(&token)?;
    let collector = Collector::default();
    restarted
        .replay_from_checkpoint(&checkpoint, &collector)
        .await?;
    assert_eq!(collector.names(), vec!["after"]);
    Ok(())
}

#[tokio::test]
async fn trimmed_checkpoint_is_reported_as_expired() -> AnyResult<()> {
    let store = Arc::new(InMemoryLogStore::builder().max_len(2).build());
    let svc = service(store);
    publish(&svc, "e1").await?;
    let checkpoint = svc.create_checkpoint("order").await?;
    for name in ["e2", "e3", "e4"] {
        publish(&svc, name).await?;
    }

    let err = svc
        .replay_from_checkpoint(&checkpoint, &Collector::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::CheckpointExpired { .. }));
    Ok(())
}

#[tokio::test]
async fn replay_does_not_touch_consumer_group_state() -> AnyResult<()> {
    let store = Arc::new(InMemoryLogStore::new());
    let svc = service(store.clone());
    store.ensure_group("events:order", "eventflow").await?;
    let checkpoint = svc.create_checkpoint("order").await?;
    publish(&svc, "x").await?;

    svc.replay_from_checkpoint(&checkpoint, &Collector::default())
        .await?;

    assert_eq!(store.pending_count("events:order", "eventflow").await?, 0);
    let claimable = store
        .read_group("events:order", "eventflow", "c1", 10, Duration::ZERO)
        .await?;
    assert_eq!(claimable.len(), 1);
    Ok(())
}

#[tokio::test]
async fn handler_error_aborts_replay() -> AnyResult<()> {
    let svc = service(Arc::new(InMemoryLogStore::new()));
    let checkpoint = svc.create_checkpoint("order").await?;
    publish(&svc, "x").await?;

    let err = svc
        .replay_from_checkpoint(&checkpoint, &Rejecting)
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::Handler { ref handler, .. } if handler == "rejecting"));
    Ok(())
}
