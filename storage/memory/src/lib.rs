pub mod engine;
pub mod item;
pub mod serializer;
pub mod transaction;

pub use engine::MemoryEngine;
pub use item::{FieldValue, Item};
pub use serializer::JsonItemSerializer;
pub use transaction::MemoryTransaction;
