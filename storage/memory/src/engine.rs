use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use converge_core::converter::{ChangeLookup, ItemChangeMetadataConverter, ItemVersionMetadataConverter, MetadataConverter};
use converge_core::error::{ConvertError, MutationError, QueueError, RetrievalError};
use converge_core::metadata::{ItemChange, ItemVersion};
use converge_core::queue::QueueBackend;
use converge_core::serializer::ItemSerializer;
use converge_core::store::DataStore;
use converge_proto::{
    ChangeId, CollectionId, ItemChangeRecord, ItemId, ItemVersionRecord, OperationId, ProviderId, QueuedOperation, QueuedOperationStatus,
    VectorClock,
};

use crate::item::Item;
use crate::serializer::JsonItemSerializer;
use crate::transaction::MemoryTransaction;

/// Typed record collections, the in-memory equivalent of the document
/// collections a real backend would keep.
#[derive(Debug, Default)]
pub(crate) struct State {
    pub item_changes: BTreeMap<ChangeId, ItemChangeRecord>,
    pub item_versions: BTreeMap<ItemId, ItemVersionRecord>,
    pub provider_ids: BTreeMap<ProviderId, DateTime<Utc>>,
    pub commit_queue: BTreeMap<OperationId, QueuedOperation>,
}

/// A write staged inside a transaction, applied to the shared state atomically
/// on commit.
#[derive(Debug, Clone)]
pub(crate) enum StagedWrite {
    ItemChange(ItemChangeRecord),
    ItemVersion(ItemVersionRecord),
    Provider(ProviderId, DateTime<Utc>),
    OperationStatus(OperationId, QueuedOperationStatus),
}

struct Inner {
    provider_id: ProviderId,
    serializer: JsonItemSerializer,
    state: Mutex<State>,
    txn_lock: Arc<tokio::sync::Mutex<()>>,
}

/// In-memory document backend. Cheap to clone; clones share state.
///
/// Transactions are serialized by a permit and stage their writes, so each
/// queued operation gets read-then-conditionally-write isolation without any
/// in-process locking beyond the permit.
#[derive(Clone)]
pub struct MemoryEngine(Arc<Inner>);

impl MemoryEngine {
    pub fn new(provider_id: impl Into<ProviderId>) -> Self {
        Self(Arc::new(Inner {
            provider_id: provider_id.into(),
            serializer: JsonItemSerializer,
            state: Mutex::new(State::default()),
            txn_lock: Arc::new(tokio::sync::Mutex::new(())),
        }))
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.0.state.lock().unwrap();
        f(&mut state)
    }

    pub(crate) fn apply(&self, writes: Vec<StagedWrite>) {
        self.with_state(|state| {
            for write in writes {
                match write {
                    StagedWrite::ItemChange(record) => {
                        state.item_changes.insert(record.id.clone(), record);
                    }
                    StagedWrite::ItemVersion(record) => {
                        state.item_versions.insert(record.id.clone(), record);
                    }
                    StagedWrite::Provider(provider_id, timestamp) => {
                        state.provider_ids.insert(provider_id, timestamp);
                    }
                    StagedWrite::OperationStatus(id, status) => {
                        if let Some(operation) = state.commit_queue.get_mut(&id) {
                            operation.status = status;
                        }
                    }
                }
            }
        })
    }

    pub(crate) fn version_record(&self, item_id: &ItemId) -> Option<ItemVersionRecord> {
        self.with_state(|state| state.item_versions.get(item_id).cloned())
    }

    pub(crate) fn change_records(&self, ids: &[ChangeId]) -> Vec<ItemChangeRecord> {
        self.with_state(|state| ids.iter().filter_map(|id| state.item_changes.get(id).cloned()).collect())
    }

    pub(crate) fn txn_lock(&self) -> Arc<tokio::sync::Mutex<()>> { self.0.txn_lock.clone() }

    /// Submit an operation to the commit queue, the way an external writer
    /// would. The entry starts out `pending`.
    pub fn enqueue(&self, operation: QueuedOperation) {
        self.with_state(|state| {
            state.commit_queue.insert(operation.id.clone(), operation);
        })
    }

    pub fn operation(&self, id: &OperationId) -> Option<QueuedOperation> {
        self.with_state(|state| state.commit_queue.get(id).cloned())
    }

    /// The change log, in creation order. Queryable independently of the
    /// version pointers so a stale pointer after a partial commit can always
    /// be reconciled against it.
    pub async fn item_changes(&self) -> Result<Vec<ItemChange>, RetrievalError> {
        let mut records: Vec<_> = self.with_state(|state| state.item_changes.values().cloned().collect());
        records.sort_by_key(|record| record.date_created);

        let mut changes = Vec::with_capacity(records.len());
        for record in &records {
            changes.push(ItemChangeMetadataConverter.to_metadata(record).await.map_err(convert_err)?);
        }
        Ok(changes)
    }

    pub async fn get_item_change(&self, id: &ChangeId) -> Result<ItemChange, RetrievalError> {
        let record = self
            .with_state(|state| state.item_changes.get(id).cloned())
            .ok_or_else(|| RetrievalError::ItemChangeNotFound(id.clone()))?;
        ItemChangeMetadataConverter.to_metadata(&record).await.map_err(convert_err)
    }

    pub async fn item_versions(&self) -> Result<Vec<ItemVersion>, RetrievalError> {
        let mut records: Vec<_> = self.with_state(|state| state.item_versions.values().cloned().collect());
        records.sort_by_key(|record| record.date_created);

        let converter = self.version_converter();
        let mut versions = Vec::with_capacity(records.len());
        for record in &records {
            versions.push(converter.to_metadata(record).await.map_err(convert_err)?);
        }
        Ok(versions)
    }

    /// The provider high-water marks recorded through first-seen bookkeeping,
    /// as a vector clock.
    pub fn local_vector_clock(&self) -> VectorClock {
        let mut clock = VectorClock::create_empty([self.0.provider_id.clone()]);
        self.with_state(|state| {
            for (provider_id, timestamp) in &state.provider_ids {
                clock.update(provider_id, *timestamp);
            }
        });
        clock
    }

    pub(crate) fn version_converter(&self) -> ItemVersionMetadataConverter { ItemVersionMetadataConverter::new(Arc::new(self.clone())) }
}

pub(crate) fn convert_err(err: ConvertError) -> RetrievalError { RetrievalError::StorageError(Box::new(err)) }

#[async_trait]
impl ChangeLookup for MemoryEngine {
    async fn find_item_changes(&self, ids: &[ChangeId]) -> Result<Vec<ItemChange>, RetrievalError> {
        let records = self.change_records(ids);
        let mut changes = Vec::with_capacity(records.len());
        for record in &records {
            changes.push(ItemChangeMetadataConverter.to_metadata(record).await.map_err(convert_err)?);
        }
        Ok(changes)
    }
}

/// Direct, non-transactional store access. The commit queue path goes through
/// [`MemoryTransaction`] instead, which stages the same writes.
#[async_trait]
impl DataStore for MemoryEngine {
    type Item = Item;

    fn provider_id(&self) -> &ProviderId { &self.0.provider_id }

    fn serializer(&self) -> &dyn ItemSerializer<Item = Item> { &self.0.serializer }

    async fn get_item_version(&self, item_id: &ItemId) -> Result<ItemVersion, RetrievalError> {
        let record = self.version_record(item_id).ok_or_else(|| RetrievalError::ItemVersionNotFound(item_id.clone()))?;
        self.version_converter().to_metadata(&record).await.map_err(convert_err)
    }

    async fn save_item_change(&self, change: &ItemChange, is_creating: bool) -> Result<(), MutationError> {
        let record = ItemChangeMetadataConverter.to_record(change).await?;
        let mut writes = vec![StagedWrite::ItemChange(record)];
        if is_creating {
            let item = &change.change_vector_clock_item;
            writes.push(StagedWrite::Provider(item.provider_id.clone(), item.timestamp));
        }
        self.apply(writes);
        Ok(())
    }

    async fn save_item_version(&self, version: &ItemVersion) -> Result<(), MutationError> {
        let record = self.version_converter().to_record(version).await?;
        self.apply(vec![StagedWrite::ItemVersion(record)]);
        Ok(())
    }
}

#[async_trait]
impl QueueBackend for MemoryEngine {
    type Txn = MemoryTransaction;

    async fn pending_operations(&self) -> Result<Vec<QueuedOperation>, QueueError> {
        let mut operations: Vec<_> = self.with_state(|state| {
            state.commit_queue.values().filter(|operation| operation.status == QueuedOperationStatus::Pending).cloned().collect()
        });
        operations.sort_by_key(|operation| operation.timestamp);
        Ok(operations)
    }

    async fn begin(&self) -> Result<MemoryTransaction, QueueError> {
        let permit = self.txn_lock().lock_owned().await;
        Ok(MemoryTransaction::new(self.clone(), permit))
    }

    async fn mark_error(&self, id: &OperationId) -> Result<(), QueueError> {
        self.apply(vec![StagedWrite::OperationStatus(id.clone(), QueuedOperationStatus::Error)]);
        Ok(())
    }

    fn build_item(&self, operation: &QueuedOperation, item_id: &ItemId, collection: &CollectionId) -> Result<Item, QueueError> {
        Item::from_payload(item_id.clone(), collection.clone(), &operation.data)
            .map_err(|reason| QueueError::InvalidPayload(operation.id.clone(), reason))
    }
}
