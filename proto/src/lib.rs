pub mod clock;
pub mod error;
pub mod id;
pub mod operation;
pub mod records;

pub use clock::*;
pub use error::*;
pub use id::*;
pub use operation::*;
pub use records::*;
