use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use converge_core::error::QueueError;
use converge_core::queue::{DrainSummary, QueueBackend, QueueEvents};
use converge_core::CommitQueueConsumer;
use converge_proto::{ChangeId, CollectionId, ItemId, OperationId, QueuedOperation, QueuedOperationStatus};
use converge_storage_memory::{Item, MemoryEngine, MemoryTransaction};

fn ts(day: u32, hour: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(2021, 7, day, hour, 0, 0).unwrap() }

fn queued(id: &str, item_id: Option<&str>, operation: &str, data: serde_json::Value, timestamp: DateTime<Utc>) -> QueuedOperation {
    QueuedOperation {
        id: id.into(),
        item_id: item_id.map(Into::into),
        collection_name: Some("books".into()),
        operation: operation.to_string(),
        data,
        timestamp,
        status: QueuedOperationStatus::Pending,
    }
}

#[derive(Default)]
struct RecordingEvents {
    batches: AtomicUsize,
    errors: Mutex<Vec<OperationId>>,
}

#[async_trait]
impl QueueEvents for RecordingEvents {
    async fn on_changes_committed(&self) { self.batches.fetch_add(1, Ordering::SeqCst); }

    async fn on_error(&self, operation: &QueuedOperation, _error: &QueueError) {
        self.errors.lock().unwrap().push(operation.id.clone());
    }
}

#[tokio::test]
async fn drains_pending_operations_in_timestamp_order() -> Result<()> {
    let engine = Arc::new(MemoryEngine::new("provider-a"));

    // Enqueued out of order on purpose; timestamps decide processing order.
    engine.enqueue(queued("op-update", Some("item1"), "UPDATE", serde_json::json!({"title": "owls", "pages": 260}), ts(28, 9)));
    engine.enqueue(queued("op-insert", Some("item1"), "INSERT", serde_json::json!({"title": "owls", "pages": 250}), ts(27, 10)));

    let events = Arc::new(RecordingEvents::default());
    let consumer = CommitQueueConsumer::with_events(engine.clone(), events.clone());
    let summary = consumer.drain().await?;
    assert_eq!(summary, DrainSummary { committed: 2, skipped: 0, failed: 0 });

    let changes = engine.item_changes().await?;
    assert_eq!(changes.len(), 2);
    // Change ids are derived from the operation ids, and the insert point of
    // the later change is the earlier change's clock item.
    assert_eq!(changes[0].id, ChangeId::from(&OperationId::from("op-insert")));
    assert_eq!(changes[1].id, ChangeId::from(&OperationId::from("op-update")));
    assert_eq!(changes[0].date_created, ts(27, 10));
    assert_eq!(changes[1].date_created, ts(28, 9));
    assert_eq!(changes[1].insert_vector_clock_item, changes[0].change_vector_clock_item);

    for id in ["op-insert", "op-update"] {
        assert_eq!(engine.operation(&id.into()).map(|op| op.status), Some(QueuedOperationStatus::Done));
    }
    assert_eq!(events.batches.load(Ordering::SeqCst), 1);
    assert!(events.errors.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn a_failing_operation_is_parked_without_blocking_the_rest() -> Result<()> {
    let engine = Arc::new(MemoryEngine::new("provider-a"));

    engine.enqueue(queued("op-1", Some("item1"), "INSERT", serde_json::json!({"title": "owls"}), ts(27, 10)));
    engine.enqueue(queued("op-2", None, "INSERT", serde_json::json!({"title": "no item id"}), ts(27, 11)));
    engine.enqueue(queued("op-3", Some("item2"), "INSERT", serde_json::json!({"title": "crows"}), ts(27, 12)));

    let events = Arc::new(RecordingEvents::default());
    let consumer = CommitQueueConsumer::with_events(engine.clone(), events.clone());
    let summary = consumer.drain().await?;
    assert_eq!(summary, DrainSummary { committed: 2, skipped: 0, failed: 1 });

    assert_eq!(engine.operation(&"op-1".into()).map(|op| op.status), Some(QueuedOperationStatus::Done));
    assert_eq!(engine.operation(&"op-2".into()).map(|op| op.status), Some(QueuedOperationStatus::Error));
    assert_eq!(engine.operation(&"op-3".into()).map(|op| op.status), Some(QueuedOperationStatus::Done));

    // Nothing from the failed operation reached the change log.
    let changes = engine.item_changes().await?;
    assert_eq!(changes.len(), 2);

    assert_eq!(events.errors.lock().unwrap().as_slice(), &[OperationId::from("op-2")]);
    assert_eq!(events.batches.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn malformed_payloads_fail_validation_per_operation() -> Result<()> {
    let engine = Arc::new(MemoryEngine::new("provider-a"));
    engine.enqueue(queued("op-1", Some("item1"), "INSERT", serde_json::json!(["not", "an", "object"]), ts(27, 10)));

    let summary = CommitQueueConsumer::new(engine.clone()).drain().await?;
    assert_eq!(summary, DrainSummary { committed: 0, skipped: 0, failed: 1 });
    assert_eq!(engine.operation(&"op-1".into()).map(|op| op.status), Some(QueuedOperationStatus::Error));
    assert!(engine.item_changes().await?.is_empty());
    Ok(())
}

/// Replays a pending list captured before another invocation ran, so every
/// entry it hands the consumer is stale.
struct StaleSnapshot {
    engine: Arc<MemoryEngine>,
    pending: Vec<QueuedOperation>,
}

#[async_trait]
impl QueueBackend for StaleSnapshot {
    type Txn = MemoryTransaction;

    async fn pending_operations(&self) -> Result<Vec<QueuedOperation>, QueueError> { Ok(self.pending.clone()) }

    async fn begin(&self) -> Result<MemoryTransaction, QueueError> { self.engine.begin().await }

    async fn mark_error(&self, id: &OperationId) -> Result<(), QueueError> { self.engine.mark_error(id).await }

    fn build_item(&self, operation: &QueuedOperation, item_id: &ItemId, collection: &CollectionId) -> Result<Item, QueueError> {
        self.engine.build_item(operation, item_id, collection)
    }
}

#[tokio::test]
async fn operations_claimed_by_another_invocation_are_skipped() -> Result<()> {
    let engine = Arc::new(MemoryEngine::new("provider-a"));
    engine.enqueue(queued("op-1", Some("item1"), "INSERT", serde_json::json!({"title": "owls"}), ts(27, 10)));

    let stale = engine.pending_operations().await?;
    assert_eq!(stale.len(), 1);

    // First invocation wins and commits the operation.
    let summary = CommitQueueConsumer::new(engine.clone()).drain().await?;
    assert_eq!(summary.committed, 1);

    // The overlapping invocation re-reads the entry in its transaction, sees
    // it is no longer pending and backs off without writing a second change.
    let overlapping = CommitQueueConsumer::new(Arc::new(StaleSnapshot { engine: engine.clone(), pending: stale }));
    let summary = overlapping.drain().await?;
    assert_eq!(summary, DrainSummary { committed: 0, skipped: 1, failed: 0 });
    assert_eq!(engine.item_changes().await?.len(), 1);
    Ok(())
}
