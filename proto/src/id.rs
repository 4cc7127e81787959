use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl From<&str> for $name {
            fn from(val: &str) -> Self { $name(val.to_string()) }
        }

        impl From<String> for $name {
            fn from(val: String) -> Self { $name(val) }
        }

        impl From<$name> for String {
            fn from(val: $name) -> Self { val.0 }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str { &self.0 }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool { self.0 == other }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
        }
    };
}

string_id!(
    /// Identity of a replica/writer participating in synchronization.
    ProviderId
);

string_id!(
    /// Primary key of a synced item, as assigned by the backend.
    ItemId
);

string_id!(
    /// Primary key of an [`crate::records::ItemChangeRecord`]. Externally supplied
    /// when a queued operation's id doubles as the change id, otherwise freshly
    /// generated.
    ChangeId
);

string_id!(
    /// Primary key of a commit-queue entry.
    OperationId
);

string_id!(
    /// Name of a backend collection/table holding app items.
    CollectionId
);

string_id!(
    /// Backend-neutral logical name for an item's type.
    EntityName
);

impl ChangeId {
    pub fn generate() -> Self { ChangeId(Uuid::new_v4().to_string()) }
}

// Entity names map 1:1 onto collection names. The indirection exists so a
// backend can prefix or otherwise namespace its physical collections.
impl From<&CollectionId> for EntityName {
    fn from(val: &CollectionId) -> Self { EntityName(val.0.clone()) }
}

impl From<&EntityName> for CollectionId {
    fn from(val: &EntityName) -> Self { CollectionId(val.0.clone()) }
}

impl From<&OperationId> for ChangeId {
    fn from(val: &OperationId) -> Self { ChangeId(val.0.clone()) }
}
