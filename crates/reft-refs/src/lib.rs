//! Reference updates for reftable.
//!
//! A reference maps a name such as `refs/heads/main` to an object id. A
//! [`ReferenceUpdate`] is one entry of a reftable: the new value of one
//! reference, or its deletion, stamped with the update index of the
//! transaction that produced it.
//!
//! # Modules
//!
//! - [`error`] — Error types for ref validation
//! - [`types`] — [`ReferenceUpdate`] and its constructors
//! - [`names`] — Reference name validation

pub mod error;
pub mod names;
pub mod types;

pub use error::{RefError, Result};
pub use names::{check_sorted, validate_ref_name};
pub use types::ReferenceUpdate;
