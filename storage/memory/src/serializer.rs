use converge_core::error::SerializationError;
use converge_core::metadata::SerializationResult;
use converge_core::serializer::ItemSerializer;
use converge_proto::{CollectionId, EntityName};

use crate::item::{FieldValue, Item};

/// Serializes items to a JSON field map. The primary key and collection tag
/// are carried by the [`SerializationResult`] itself, not the payload, and
/// date fields travel as canonical RFC 3339 text.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonItemSerializer;

impl ItemSerializer for JsonItemSerializer {
    type Item = Item;

    fn serialize_item(&self, item: &Item, entity_name: &EntityName) -> Result<SerializationResult, SerializationError> {
        let mut fields = serde_json::Map::new();
        for (name, value) in &item.fields {
            let value =
                value.to_json().map_err(|reason| SerializationError::UnsupportedField { field: name.clone(), reason })?;
            fields.insert(name.clone(), value);
        }
        let serialized_item = serde_json::to_string(&serde_json::Value::Object(fields))?;

        Ok(SerializationResult { item_id: item.id.clone(), entity_name: entity_name.clone(), serialized_item })
    }

    fn deserialize_item(&self, result: &SerializationResult) -> Result<Item, SerializationError> {
        let value: serde_json::Value = serde_json::from_str(&result.serialized_item)?;
        let object = value.as_object().ok_or_else(|| SerializationError::UnsupportedField {
            field: "<root>".to_string(),
            reason: "serialized item is not an object".to_string(),
        })?;

        let mut item = Item::new(result.item_id.clone(), CollectionId::from(&result.entity_name));
        for (name, value) in object {
            let field = FieldValue::from_json(value)
                .map_err(|reason| SerializationError::UnsupportedField { field: name.clone(), reason })?;
            item.fields.insert(name.clone(), field);
        }
        Ok(item)
    }
}
