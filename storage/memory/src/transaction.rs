use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use converge_core::converter::{ChangeLookup, ItemChangeMetadataConverter, ItemVersionMetadataConverter, MetadataConverter};
use converge_core::error::{MutationError, QueueError, RetrievalError};
use converge_core::metadata::{ItemChange, ItemVersion};
use converge_core::queue::QueueTransaction;
use converge_core::serializer::ItemSerializer;
use converge_core::store::DataStore;
use converge_proto::{ChangeId, ItemChangeRecord, ItemId, OperationId, ProviderId, QueuedOperation, QueuedOperationStatus};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::engine::{convert_err, MemoryEngine, StagedWrite};
use crate::item::Item;

/// A transaction over the shared in-memory state. Holds the engine's
/// transaction permit for its whole lifetime and buffers every write; `commit`
/// applies the buffer in one step, dropping without committing discards it.
pub struct MemoryTransaction {
    engine: MemoryEngine,
    staged: Mutex<Vec<StagedWrite>>,
    _permit: OwnedMutexGuard<()>,
}

impl MemoryTransaction {
    pub(crate) fn new(engine: MemoryEngine, permit: OwnedMutexGuard<()>) -> Self {
        Self { engine, staged: Mutex::new(Vec::new()), _permit: permit }
    }

    fn stage(&self, write: StagedWrite) { self.staged.lock().unwrap().push(write) }

    fn staged_changes(&self) -> Vec<ItemChangeRecord> {
        self.staged
            .lock()
            .unwrap()
            .iter()
            .filter_map(|write| match write {
                StagedWrite::ItemChange(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    /// Reads inside the transaction see staged changes layered over the
    /// committed state.
    fn version_converter(&self) -> ItemVersionMetadataConverter {
        ItemVersionMetadataConverter::new(Arc::new(TxnChangeLookup { engine: self.engine.clone(), staged: self.staged_changes() }))
    }
}

struct TxnChangeLookup {
    engine: MemoryEngine,
    staged: Vec<ItemChangeRecord>,
}

#[async_trait]
impl ChangeLookup for TxnChangeLookup {
    async fn find_item_changes(&self, ids: &[ChangeId]) -> Result<Vec<ItemChange>, RetrievalError> {
        let mut changes = Vec::new();
        for id in ids {
            let record = match self.staged.iter().rev().find(|record| &record.id == id) {
                Some(staged) => Some(staged.clone()),
                None => self.engine.change_records(std::slice::from_ref(id)).into_iter().next(),
            };
            if let Some(record) = record {
                changes.push(ItemChangeMetadataConverter.to_metadata(&record).await.map_err(convert_err)?);
            }
        }
        Ok(changes)
    }
}

#[async_trait]
impl DataStore for MemoryTransaction {
    type Item = Item;

    fn provider_id(&self) -> &ProviderId { self.engine.provider_id() }

    fn serializer(&self) -> &dyn ItemSerializer<Item = Item> { self.engine.serializer() }

    async fn get_item_version(&self, item_id: &ItemId) -> Result<ItemVersion, RetrievalError> {
        let staged = self.staged.lock().unwrap().iter().rev().find_map(|write| match write {
            StagedWrite::ItemVersion(record) if &record.id == item_id => Some(record.clone()),
            _ => None,
        });
        let record = match staged.or_else(|| self.engine.version_record(item_id)) {
            Some(record) => record,
            None => return Err(RetrievalError::ItemVersionNotFound(item_id.clone())),
        };
        self.version_converter().to_metadata(&record).await.map_err(convert_err)
    }

    async fn save_item_change(&self, change: &ItemChange, is_creating: bool) -> Result<(), MutationError> {
        let record = ItemChangeMetadataConverter.to_record(change).await?;
        self.stage(StagedWrite::ItemChange(record));
        if is_creating {
            let item = &change.change_vector_clock_item;
            self.stage(StagedWrite::Provider(item.provider_id.clone(), item.timestamp));
        }
        Ok(())
    }

    async fn save_item_version(&self, version: &ItemVersion) -> Result<(), MutationError> {
        let record = self.version_converter().to_record(version).await?;
        self.stage(StagedWrite::ItemVersion(record));
        Ok(())
    }
}

#[async_trait]
impl QueueTransaction for MemoryTransaction {
    type Store = Self;

    fn data_store(&self) -> &Self { self }

    async fn operation(&self, id: &OperationId) -> Result<Option<QueuedOperation>, QueueError> {
        let mut operation = self.engine.operation(id);
        if let Some(operation) = operation.as_mut() {
            let staged = self.staged.lock().unwrap().iter().rev().find_map(|write| match write {
                StagedWrite::OperationStatus(staged_id, status) if staged_id == id => Some(status.clone()),
                _ => None,
            });
            if let Some(status) = staged {
                operation.status = status;
            }
        }
        Ok(operation)
    }

    async fn set_status(&self, id: &OperationId, status: QueuedOperationStatus) -> Result<(), QueueError> {
        self.stage(StagedWrite::OperationStatus(id.clone(), status));
        Ok(())
    }

    async fn commit(self) -> Result<(), QueueError> {
        let writes = self.staged.into_inner().unwrap();
        debug!(writes = writes.len(), "committing staged writes");
        self.engine.apply(writes);
        Ok(())
    }
}
