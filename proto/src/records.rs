use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ChangeId, CollectionId, ItemId, ProviderId};

/// One entry of a persisted vector clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClockItemRecord {
    pub provider_id: ProviderId,
    pub timestamp: DateTime<Utc>,
}

/// Persisted shape of a committed change, flattened for document storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemChangeRecord {
    pub id: ChangeId,
    pub operation: String,
    pub item_id: ItemId,
    pub collection_name: CollectionId,
    pub date_created: DateTime<Utc>,
    pub change_vector_clock_item: VectorClockItemRecord,
    pub insert_vector_clock_item: VectorClockItemRecord,
    pub serialized_item: String,
    pub should_ignore: bool,
    pub is_applied: bool,
    pub vector_clock: Vec<VectorClockItemRecord>,
}

/// Persisted shape of an item's current-version pointer. `id` is the item id;
/// the record references its latest change by id rather than embedding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemVersionRecord {
    pub id: ItemId,
    pub date_created: DateTime<Utc>,
    pub current_item_change_id: ChangeId,
    pub collection_name: CollectionId,
    pub vector_clock: Vec<VectorClockItemRecord>,
}
