use async_trait::async_trait;
use chrono::{DateTime, Utc};
use converge_proto::{ChangeId, EntityName, ItemId, Operation, ProviderId, VectorClockItem};
use tracing::debug;

use crate::error::{CommitError, MutationError, RetrievalError};
use crate::metadata::{ItemChange, ItemVersion};
use crate::serializer::ItemSerializer;

/// The abstract data store: turns a mutation into a durable, causally ordered
/// change record plus a superseding version pointer.
///
/// Backends implement the raw persistence methods; the commit protocol itself
/// is provided. `get_item_version` must report a missing version as
/// [`RetrievalError::ItemVersionNotFound`] so the protocol can distinguish
/// "first change for this item" from real failures.
#[async_trait]
pub trait DataStore: Send + Sync {
    type Item: Send + Sync;

    fn provider_id(&self) -> &ProviderId;

    fn serializer(&self) -> &dyn ItemSerializer<Item = Self::Item>;

    async fn get_item_version(&self, item_id: &ItemId) -> Result<ItemVersion, RetrievalError>;

    /// Persist a change record. `is_creating` is true for the very first
    /// change of an item; backends use it to record first-seen provider
    /// bookkeeping.
    async fn save_item_change(&self, change: &ItemChange, is_creating: bool) -> Result<(), MutationError>;

    async fn save_item_version(&self, version: &ItemVersion) -> Result<(), MutationError>;

    /// The item's persisted version, or a synthesized empty one when the item
    /// has never been seen locally. Only "not found" is absorbed; every other
    /// failure propagates.
    async fn get_local_version(&self, item_id: &ItemId) -> Result<ItemVersion, RetrievalError> {
        match self.get_item_version(item_id).await {
            Ok(version) => Ok(version),
            Err(RetrievalError::ItemVersionNotFound(_)) => Ok(ItemVersion::empty(item_id.clone(), Utc::now(), self.provider_id())),
            Err(other) => Err(other),
        }
    }

    /// Commit one local mutation: advance the item's vector clock for the
    /// local provider, record an immutable [`ItemChange`] and supersede the
    /// item's [`ItemVersion`].
    ///
    /// The change is saved before the version. A crash between the two leaves
    /// the version pointer stale, which is why the change log stays queryable
    /// on its own.
    async fn commit_item_change(
        &self,
        operation: Operation,
        entity_name: &EntityName,
        item_id: &ItemId,
        item: &Self::Item,
        timestamp: Option<DateTime<Utc>>,
        change_id: Option<ChangeId>,
    ) -> Result<ItemChange, CommitError> {
        let old_version = self.get_local_version(item_id).await?;
        let timestamp = timestamp.unwrap_or_else(Utc::now);

        let mut local_vector_clock = old_version.vector_clock().clone();
        let change_vector_clock_item = VectorClockItem::new(self.provider_id().clone(), timestamp);
        local_vector_clock.update(self.provider_id(), timestamp);

        // The insert item never advances after the creating change.
        let insert_vector_clock_item = match old_version.current_item_change() {
            Some(previous) => previous.insert_vector_clock_item.clone(),
            None => change_vector_clock_item.clone(),
        };
        let is_creating = old_version.current_item_change().is_none();

        let serialization_result = self.serializer().serialize_item(item, entity_name)?;

        let change = ItemChange {
            id: change_id.unwrap_or_else(ChangeId::generate),
            operation,
            serialization_result,
            change_vector_clock_item,
            insert_vector_clock_item,
            should_ignore: false,
            is_applied: true,
            vector_clock: local_vector_clock,
            date_created: timestamp,
        };

        debug!(change = %change.id, item = %item_id, %operation, is_creating, "committing item change");

        self.save_item_change(&change, is_creating).await?;

        let new_version = ItemVersion::new(item_id.clone(), old_version.date_created(), None, Some(change.clone()))?;
        self.save_item_version(&new_version).await?;

        Ok(change)
    }
}
