use converge_proto::EntityName;

use crate::error::SerializationError;
use crate::metadata::SerializationResult;

/// Converts domain items to and from the backend-neutral serialized form.
///
/// `serialize_item` extracts the item's primary key, drops backend bookkeeping
/// fields, canonicalizes date values to a fixed textual form and packages the
/// remaining fields as an opaque string keyed by entity name.
/// `deserialize_item` is the inverse: it reattaches the primary key and
/// backend tag and turns recognized date/date-time text back into native date
/// values. The two must round-trip for items limited to primitives, strings
/// and dates.
pub trait ItemSerializer: Send + Sync {
    type Item;

    fn serialize_item(&self, item: &Self::Item, entity_name: &EntityName) -> Result<SerializationResult, SerializationError>;

    fn deserialize_item(&self, result: &SerializationResult) -> Result<Self::Item, SerializationError>;
}
