use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use converge_proto::{ChangeId, CollectionId, EntityName, ItemId, Operation, OperationId, QueuedOperation, QueuedOperationStatus};
use tracing::{debug, error, info, warn};

use crate::error::QueueError;
use crate::store::DataStore;

/// Host callback surface of the consumer. `on_changes_committed` fires once
/// per drained batch regardless of per-item errors; `on_error` fires once per
/// failed operation.
#[async_trait]
pub trait QueueEvents: Send + Sync {
    async fn on_changes_committed(&self) {}

    async fn on_error(&self, _operation: &QueuedOperation, _error: &QueueError) {}
}

pub struct NoopQueueEvents;

#[async_trait]
impl QueueEvents for NoopQueueEvents {}

/// Backend capabilities the consumer drains against: listing pending entries,
/// opening per-operation transactions, parking a failed entry in `error` state
/// outside the aborted transaction, and turning a queue payload into an item
/// the backend's data store understands.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    type Txn: QueueTransaction;

    /// All operations with `status = pending`, ordered by ascending timestamp.
    async fn pending_operations(&self) -> Result<Vec<QueuedOperation>, QueueError>;

    async fn begin(&self) -> Result<Self::Txn, QueueError>;

    /// Runs outside any transaction; the operation's transaction has already
    /// been rolled back when this is called.
    async fn mark_error(&self, id: &OperationId) -> Result<(), QueueError>;

    fn build_item(
        &self,
        operation: &QueuedOperation,
        item_id: &ItemId,
        collection: &CollectionId,
    ) -> Result<<<Self::Txn as QueueTransaction>::Store as DataStore>::Item, QueueError>;
}

/// One backend transaction scoped to a single queued operation. Dropping the
/// transaction without committing rolls back everything staged in it,
/// including the data store writes.
#[async_trait]
pub trait QueueTransaction: Send + Sync + Sized {
    type Store: DataStore;

    /// The data store whose writes are staged inside this transaction.
    fn data_store(&self) -> &Self::Store;

    /// Re-read the operation inside the transaction. `None` means the entry
    /// vanished from the queue entirely.
    async fn operation(&self, id: &OperationId) -> Result<Option<QueuedOperation>, QueueError>;

    async fn set_status(&self, id: &OperationId, status: QueuedOperationStatus) -> Result<(), QueueError>;

    async fn commit(self) -> Result<(), QueueError>;
}

/// What `drain` did with the batch it found.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainSummary {
    pub committed: usize,
    /// Entries that were no longer pending by the time their transaction
    /// re-read them; another invocation already handled them.
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug)]
struct ValidOperation {
    collection: CollectionId,
    item_id: ItemId,
    operation: Operation,
}

fn validate(operation: &QueuedOperation) -> Result<ValidOperation, QueueError> {
    let collection = operation
        .collection_name
        .as_ref()
        .filter(|name| !name.as_str().is_empty())
        .cloned()
        .ok_or_else(|| QueueError::MissingCollectionName(operation.id.clone()))?;

    let item_id = operation
        .item_id
        .as_ref()
        .filter(|id| !id.as_str().is_empty())
        .cloned()
        .ok_or_else(|| QueueError::MissingItemId(operation.id.clone()))?;

    let kind = Operation::from_str(&operation.operation)
        .map_err(|_| QueueError::InvalidOperation { id: operation.id.clone(), operation: operation.operation.clone() })?;

    Ok(ValidOperation { collection, item_id, operation: kind })
}

enum Outcome {
    Committed,
    Skipped,
}

/// Drains externally submitted pending operations against the data store, one
/// at a time, each inside its own backend transaction.
///
/// Multiple invocations may overlap; the in-transaction status re-read is what
/// keeps an operation from being applied twice. A failed operation is parked
/// in `error` state and never blocks the rest of the queue.
pub struct CommitQueueConsumer<B: QueueBackend> {
    backend: Arc<B>,
    events: Arc<dyn QueueEvents>,
}

impl<B: QueueBackend> CommitQueueConsumer<B> {
    pub fn new(backend: Arc<B>) -> Self { Self { backend, events: Arc::new(NoopQueueEvents) } }

    pub fn with_events(backend: Arc<B>, events: Arc<dyn QueueEvents>) -> Self { Self { backend, events } }

    /// Process every currently pending operation in submission-timestamp
    /// order. Returns an error only when the pending list itself cannot be
    /// fetched; per-operation failures are absorbed into the summary.
    pub async fn drain(&self) -> Result<DrainSummary, QueueError> {
        let pending = self.backend.pending_operations().await?;
        debug!(count = pending.len(), "draining commit queue");

        let mut summary = DrainSummary::default();
        for operation in &pending {
            match self.process(operation).await {
                Ok(Outcome::Committed) => {
                    info!(operation = %operation.id, "queued operation committed");
                    summary.committed += 1;
                }
                Ok(Outcome::Skipped) => summary.skipped += 1,
                Err(err) => {
                    summary.failed += 1;
                    error!(operation = %operation.id, error = %err, "error committing queued operation");
                    if let Err(mark_err) = self.backend.mark_error(&operation.id).await {
                        warn!(operation = %operation.id, error = %mark_err, "failed to park queued operation in error state");
                    }
                    self.events.on_error(operation, &err).await;
                }
            }
        }

        self.events.on_changes_committed().await;
        Ok(summary)
    }

    async fn process(&self, operation: &QueuedOperation) -> Result<Outcome, QueueError> {
        let txn = self.backend.begin().await?;

        // Guard against another invocation having claimed this entry between
        // the pending query and now.
        let current = txn.operation(&operation.id).await?.ok_or_else(|| QueueError::OperationNotFound(operation.id.clone()))?;
        if current.status != QueuedOperationStatus::Pending {
            info!(operation = %operation.id, status = %current.status, "skipping queued operation, already handled");
            return Ok(Outcome::Skipped);
        }

        let valid = validate(operation)?;
        let item = self.backend.build_item(operation, &valid.item_id, &valid.collection)?;
        let entity_name = EntityName::from(&valid.collection);

        debug!(
            operation = %operation.id,
            kind = %valid.operation,
            item = %valid.item_id,
            timestamp = %operation.timestamp,
            "processing queued operation"
        );

        txn.data_store()
            .commit_item_change(
                valid.operation,
                &entity_name,
                &valid.item_id,
                &item,
                Some(operation.timestamp),
                Some(ChangeId::from(&operation.id)),
            )
            .await?;

        txn.set_status(&operation.id, QueuedOperationStatus::Done).await?;
        txn.commit().await?;
        Ok(Outcome::Committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn queued(item_id: Option<&str>, collection: Option<&str>, operation: &str) -> QueuedOperation {
        QueuedOperation {
            id: "op-1".into(),
            item_id: item_id.map(Into::into),
            collection_name: collection.map(Into::into),
            operation: operation.to_string(),
            data: serde_json::json!({}),
            timestamp: Utc::now(),
            status: QueuedOperationStatus::Pending,
        }
    }

    #[test]
    fn validate_accepts_known_operations() {
        let valid = validate(&queued(Some("item1"), Some("my_collection"), "UPDATE")).unwrap();
        assert_eq!(valid.operation, Operation::Update);
        assert_eq!(valid.item_id, ItemId::from("item1"));
        assert_eq!(valid.collection, CollectionId::from("my_collection"));
    }

    #[test]
    fn validate_rejects_missing_collection() {
        assert!(matches!(validate(&queued(Some("item1"), None, "INSERT")), Err(QueueError::MissingCollectionName(_))));
        assert!(matches!(validate(&queued(Some("item1"), Some(""), "INSERT")), Err(QueueError::MissingCollectionName(_))));
    }

    #[test]
    fn validate_rejects_missing_item_id() {
        assert!(matches!(validate(&queued(None, Some("my_collection"), "INSERT")), Err(QueueError::MissingItemId(_))));
    }

    #[test]
    fn validate_rejects_unknown_operation() {
        let err = validate(&queued(Some("item1"), Some("my_collection"), "UPSERT")).unwrap_err();
        assert!(matches!(err, QueueError::InvalidOperation { .. }));
    }
}
