use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use converge_proto::{CollectionId, ItemId};
use serde_json::Value;

/// Scalar value of one item field. Dates are first-class so the serializer can
/// canonicalize them to text and recover them on the way back.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
}

impl FieldValue {
    /// Convert an incoming JSON value. Strings matching the recognized date or
    /// date-time patterns become native dates; nested arrays and objects are
    /// rejected with a reason.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(FieldValue::Null),
            Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(FieldValue::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(FieldValue::Float(f))
                } else {
                    Err(format!("number out of range: {}", n))
                }
            }
            Value::String(s) => match parse_date(s) {
                Some(date) => Ok(FieldValue::DateTime(date)),
                None => Ok(FieldValue::String(s.clone())),
            },
            Value::Array(_) => Err("nested arrays are not supported".to_string()),
            Value::Object(_) => Err("nested objects are not supported".to_string()),
        }
    }

    /// The JSON form used in serialized items: dates become canonical RFC 3339
    /// text, everything else maps directly. Non-finite floats have no JSON
    /// representation and are rejected rather than degraded to null.
    pub fn to_json(&self) -> Result<Value, String> {
        match self {
            FieldValue::Null => Ok(Value::Null),
            FieldValue::Bool(b) => Ok(Value::Bool(*b)),
            FieldValue::Integer(i) => Ok(Value::from(*i)),
            FieldValue::Float(f) if f.is_finite() => Ok(Value::from(*f)),
            FieldValue::Float(f) => Err(format!("non-finite number: {}", f)),
            FieldValue::String(s) => Ok(Value::String(s.clone())),
            FieldValue::DateTime(date) => Ok(Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true))),
        }
    }
}

/// Textual dates the deserializer recognizes: RFC 3339 date-times and plain
/// `YYYY-MM-DD` dates (taken as midnight UTC).
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date_time) = DateTime::parse_from_rfc3339(value) {
        return Some(date_time.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    None
}

/// A document held in a named collection. `id` and `collection` are backend
/// bookkeeping; only `fields` travels through serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub collection: CollectionId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Item {
    pub fn new(id: ItemId, collection: CollectionId) -> Self { Self { id, collection, fields: BTreeMap::new() } }

    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Build an item from a queued operation's opaque payload. The payload
    /// must be a JSON object; `id` and `collection_name` keys are bookkeeping
    /// and dropped in favor of the resolved identifiers.
    pub fn from_payload(id: ItemId, collection: CollectionId, data: &Value) -> Result<Self, String> {
        let object = data.as_object().ok_or_else(|| "payload is not an object".to_string())?;

        let mut item = Item::new(id, collection);
        for (name, value) in object {
            if name == "id" || name == "collection_name" {
                continue;
            }
            let field = FieldValue::from_json(value).map_err(|reason| format!("field {:?}: {}", name, reason))?;
            item.fields.insert(name.clone(), field);
        }
        Ok(item)
    }
}
