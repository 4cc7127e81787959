use chrono::{DateTime, Utc};
use converge_proto::{ChangeId, EntityName, ItemId, Operation, ProviderId, VectorClock, VectorClockItem};

use crate::error::MetadataError;

/// Backend-neutral payload produced by an item serializer. Opaque to the data
/// store; only the serializer that produced it can read `serialized_item`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializationResult {
    pub item_id: ItemId,
    pub entity_name: EntityName,
    pub serialized_item: String,
}

/// An immutable record of one committed mutation to one item. Created once by
/// the data store and retained indefinitely as the append-only change log.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemChange {
    pub id: ChangeId,
    pub operation: Operation,
    pub serialization_result: SerializationResult,
    /// The provider + timestamp that produced this change.
    pub change_vector_clock_item: VectorClockItem,
    /// The provider + timestamp of the item's original creation, carried
    /// forward unchanged across every later change to the same item.
    pub insert_vector_clock_item: VectorClockItem,
    /// Advisory conflict flag, set by higher-level policy. The core always
    /// authors changes with `false`.
    pub should_ignore: bool,
    /// Advisory conflict flag. The core always authors changes with `true`.
    pub is_applied: bool,
    pub vector_clock: VectorClock,
    pub date_created: DateTime<Utc>,
}

impl ItemChange {
    pub fn item_id(&self) -> &ItemId { &self.serialization_result.item_id }
}

/// The current materialized pointer for one item: which change is its latest,
/// and the clock that change advanced to. Superseded, never mutated, on every
/// commit; `date_created` is preserved from the first version of the item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemVersion {
    item_id: ItemId,
    date_created: DateTime<Utc>,
    vector_clock: VectorClock,
    current_item_change: Option<ItemChange>,
}

impl ItemVersion {
    /// At least one of `vector_clock` and `current_item_change` must be given;
    /// if both are, their clocks must agree. When only the change is given the
    /// version's clock is taken from it.
    pub fn new(
        item_id: ItemId,
        date_created: DateTime<Utc>,
        vector_clock: Option<VectorClock>,
        current_item_change: Option<ItemChange>,
    ) -> Result<Self, MetadataError> {
        let vector_clock = match (vector_clock, &current_item_change) {
            (None, None) => return Err(MetadataError::MissingVectorClock),
            (Some(clock), Some(change)) => {
                if clock != change.vector_clock {
                    return Err(MetadataError::VectorClockMismatch);
                }
                clock
            }
            (Some(clock), None) => clock,
            (None, Some(change)) => change.vector_clock.clone(),
        };

        Ok(Self { item_id, date_created, vector_clock, current_item_change })
    }

    /// A version for an item this store has never seen: an epoch entry for the
    /// local provider and no current change.
    pub fn empty(item_id: ItemId, date_created: DateTime<Utc>, provider_id: &ProviderId) -> Self {
        Self { item_id, date_created, vector_clock: VectorClock::create_empty([provider_id.clone()]), current_item_change: None }
    }

    pub fn item_id(&self) -> &ItemId { &self.item_id }

    pub fn date_created(&self) -> DateTime<Utc> { self.date_created }

    pub fn vector_clock(&self) -> &VectorClock { &self.vector_clock }

    pub fn current_item_change(&self) -> Option<&ItemChange> { self.current_item_change.as_ref() }
}
