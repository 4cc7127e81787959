use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::DecodeError,
    id::{CollectionId, ItemId, OperationId},
};

/// The kind of mutation a change performs on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = DecodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "INSERT" => Ok(Operation::Insert),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(DecodeError::UnknownOperation(other.to_string())),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.as_str()) }
}

/// Lifecycle of a commit-queue entry. `Done` and `Error` are terminal; errored
/// entries are never retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueuedOperationStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "done")]
    Done,
}

impl std::fmt::Display for QueuedOperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QueuedOperationStatus::Pending => "pending",
            QueuedOperationStatus::Error => "error",
            QueuedOperationStatus::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// An externally submitted, not-yet-applied mutation request.
///
/// `item_id` and `collection_name` are optional and `operation` stays textual
/// at the wire level: external writers produce these records, and a malformed
/// entry must fail validation of that one operation rather than fail decoding
/// of the whole queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: OperationId,
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub collection_name: Option<CollectionId>,
    pub operation: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub status: QueuedOperationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_round_trip() {
        for (op, text) in [(Operation::Insert, "INSERT"), (Operation::Update, "UPDATE"), (Operation::Delete, "DELETE")] {
            assert_eq!(op.as_str(), text);
            assert_eq!(text.parse::<Operation>().unwrap(), op);
        }
        assert!(matches!("UPSERT".parse::<Operation>(), Err(DecodeError::UnknownOperation(_))));
    }

    #[test]
    fn queued_operation_tolerates_missing_fields() {
        let op: QueuedOperation = serde_json::from_value(serde_json::json!({
            "id": "op-1",
            "operation": "INSERT",
            "data": {"hello": "world"},
            "timestamp": "2021-07-27T00:00:00Z",
            "status": "pending",
        }))
        .unwrap();
        assert!(op.item_id.is_none());
        assert!(op.collection_name.is_none());
        assert_eq!(op.status, QueuedOperationStatus::Pending);
    }
}
