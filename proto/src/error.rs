use thiserror::Error;

use crate::id::ProviderId;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown operation kind: {0:?}")]
    UnknownOperation(String),

    #[error("duplicate provider id in vector clock: {0}")]
    DuplicateProvider(ProviderId),
}
