pub mod converter;
pub mod error;
pub mod metadata;
pub mod queue;
pub mod serializer;
pub mod store;

pub use converge_proto as proto;

pub use metadata::{ItemChange, ItemVersion, SerializationResult};
pub use queue::CommitQueueConsumer;
pub use store::DataStore;
