use converge_proto::{ChangeId, DecodeError, ItemId, OperationId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("no version recorded for item {0}")]
    ItemVersionNotFound(ItemId),

    #[error("item change {0} not found")]
    ItemChangeNotFound(ChangeId),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("storage error: {0}")]
    StorageError(Box<dyn std::error::Error + Send + Sync + 'static>),
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("convert error: {0}")]
    Convert(#[from] ConvertError),

    #[error("storage error: {0}")]
    StorageError(Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// Failures constructing metadata entities from inconsistent parts.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("item version requires a vector clock or a current change")]
    MissingVectorClock,

    #[error("item version vector clock differs from its change's vector clock")]
    VectorClockMismatch,
}

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("field {field:?}: {reason}")]
    UnsupportedField { field: String, reason: String },

    #[error("malformed serialized item: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("version for item {0} carries no current change to persist")]
    MissingCurrentChange(ItemId),
}

/// Failure of a single `commit_item_change` invocation.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Failure of a single queued operation. Never fatal to the batch: the
/// consumer parks the entry in `error` state and moves on.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queued operation {0} was submitted without a 'collection_name' field")]
    MissingCollectionName(OperationId),

    #[error("queued operation {0} was submitted without an 'item_id' field")]
    MissingItemId(OperationId),

    #[error("queued operation {id} was submitted with an invalid operation: {operation:?}")]
    InvalidOperation { id: OperationId, operation: String },

    #[error("queued operation {0} has an invalid payload: {1}")]
    InvalidPayload(OperationId, String),

    #[error("queued operation {0} disappeared while being processed")]
    OperationNotFound(OperationId),

    #[error("commit failed: {0}")]
    Commit(#[from] CommitError),

    #[error("storage error: {0}")]
    StorageError(Box<dyn std::error::Error + Send + Sync + 'static>),
}
