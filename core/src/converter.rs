use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use converge_proto::{
    ChangeId, CollectionId, EntityName, ItemChangeRecord, ItemVersionRecord, Operation, VectorClock, VectorClockItem, VectorClockItemRecord,
};

use crate::error::{ConvertError, RetrievalError};
use crate::metadata::{ItemChange, ItemVersion, SerializationResult};

/// Translates between a metadata entity and a backend's native record shape.
#[async_trait]
pub trait MetadataConverter: Send + Sync {
    type Metadata;
    type Record;

    async fn to_metadata(&self, record: &Self::Record) -> Result<Self::Metadata, ConvertError>;
    async fn to_record(&self, metadata: &Self::Metadata) -> Result<Self::Record, ConvertError>;
}

/// Resolves item changes by id through the data store's change log. The back
/// reference from a version to its change goes through this capability, never
/// through an owning pointer into storage.
#[async_trait]
pub trait ChangeLookup: Send + Sync {
    async fn find_item_changes(&self, ids: &[ChangeId]) -> Result<Vec<ItemChange>, RetrievalError>;
}

fn clock_item_to_record(item: &VectorClockItem) -> VectorClockItemRecord {
    VectorClockItemRecord { provider_id: item.provider_id.clone(), timestamp: item.timestamp }
}

fn clock_item_from_record(record: &VectorClockItemRecord) -> VectorClockItem {
    VectorClockItem::new(record.provider_id.clone(), record.timestamp)
}

/// Maps a vector clock to and from an ordered list of per-provider records.
/// The order mirrors the clock's own iteration order; it is reproducible but
/// carries no causal meaning.
#[derive(Debug, Default, Clone, Copy)]
pub struct VectorClockMetadataConverter;

#[async_trait]
impl MetadataConverter for VectorClockMetadataConverter {
    type Metadata = VectorClock;
    type Record = Vec<VectorClockItemRecord>;

    async fn to_metadata(&self, record: &Self::Record) -> Result<VectorClock, ConvertError> {
        Ok(VectorClock::from_items(record.iter().map(clock_item_from_record))?)
    }

    async fn to_record(&self, metadata: &VectorClock) -> Result<Self::Record, ConvertError> {
        Ok(metadata.iter().map(clock_item_to_record).collect())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ItemChangeMetadataConverter;

#[async_trait]
impl MetadataConverter for ItemChangeMetadataConverter {
    type Metadata = ItemChange;
    type Record = ItemChangeRecord;

    async fn to_metadata(&self, record: &ItemChangeRecord) -> Result<ItemChange, ConvertError> {
        let vector_clock = VectorClockMetadataConverter.to_metadata(&record.vector_clock).await?;
        let entity_name = EntityName::from(&record.collection_name);

        Ok(ItemChange {
            id: record.id.clone(),
            operation: Operation::from_str(&record.operation).map_err(ConvertError::Decode)?,
            serialization_result: SerializationResult {
                item_id: record.item_id.clone(),
                entity_name,
                serialized_item: record.serialized_item.clone(),
            },
            change_vector_clock_item: clock_item_from_record(&record.change_vector_clock_item),
            insert_vector_clock_item: clock_item_from_record(&record.insert_vector_clock_item),
            should_ignore: record.should_ignore,
            is_applied: record.is_applied,
            vector_clock,
            date_created: record.date_created,
        })
    }

    async fn to_record(&self, metadata: &ItemChange) -> Result<ItemChangeRecord, ConvertError> {
        let vector_clock = VectorClockMetadataConverter.to_record(&metadata.vector_clock).await?;

        Ok(ItemChangeRecord {
            id: metadata.id.clone(),
            operation: metadata.operation.as_str().to_string(),
            item_id: metadata.serialization_result.item_id.clone(),
            collection_name: CollectionId::from(&metadata.serialization_result.entity_name),
            date_created: metadata.date_created,
            change_vector_clock_item: clock_item_to_record(&metadata.change_vector_clock_item),
            insert_vector_clock_item: clock_item_to_record(&metadata.insert_vector_clock_item),
            serialized_item: metadata.serialization_result.serialized_item.clone(),
            should_ignore: metadata.should_ignore,
            is_applied: metadata.is_applied,
            vector_clock,
        })
    }
}

pub struct ItemVersionMetadataConverter {
    lookup: Arc<dyn ChangeLookup>,
}

impl ItemVersionMetadataConverter {
    pub fn new(lookup: Arc<dyn ChangeLookup>) -> Self { Self { lookup } }
}

#[async_trait]
impl MetadataConverter for ItemVersionMetadataConverter {
    type Metadata = ItemVersion;
    type Record = ItemVersionRecord;

    async fn to_metadata(&self, record: &ItemVersionRecord) -> Result<ItemVersion, ConvertError> {
        let changes = self.lookup.find_item_changes(std::slice::from_ref(&record.current_item_change_id)).await?;
        let current_item_change = changes
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::ItemChangeNotFound(record.current_item_change_id.clone()))?;
        let vector_clock = VectorClockMetadataConverter.to_metadata(&record.vector_clock).await?;

        Ok(ItemVersion::new(record.id.clone(), record.date_created, Some(vector_clock), Some(current_item_change))?)
    }

    async fn to_record(&self, metadata: &ItemVersion) -> Result<ItemVersionRecord, ConvertError> {
        let current_item_change =
            metadata.current_item_change().ok_or_else(|| ConvertError::MissingCurrentChange(metadata.item_id().clone()))?;
        let vector_clock = VectorClockMetadataConverter.to_record(metadata.vector_clock()).await?;

        Ok(ItemVersionRecord {
            id: metadata.item_id().clone(),
            date_created: metadata.date_created(),
            current_item_change_id: current_item_change.id.clone(),
            collection_name: CollectionId::from(&current_item_change.serialization_result.entity_name),
            vector_clock,
        })
    }
}
