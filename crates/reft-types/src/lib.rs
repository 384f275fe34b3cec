//! Foundation types for reftable.
//!
//! Every other crate in the workspace depends on `reft-types` for the object
//! identifier that reference records point at.
//!
//! # Key Types
//!
//! - [`HashAlgorithm`] — which hash function produced an id, and therefore its raw size
//! - [`ObjectId`] — fixed-size, opaque object identifier
//! - [`TypeError`] — parse and length failures

pub mod error;
pub mod object;

pub use error::TypeError;
pub use object::{HashAlgorithm, ObjectId, MAX_RAW_SIZE};
