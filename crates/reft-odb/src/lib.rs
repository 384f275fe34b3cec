//! Object database interface consumed by reftable.
//!
//! Reftable does not store objects; it only needs to know, for each object a
//! reference points at, whether that object is an annotated tag and, if so,
//! which non-tag object the tag ultimately resolves to. That question is
//! called *peeling* and is answered by a [`Peeler`].
//!
//! # Implementations
//!
//! - [`InMemoryObjectDatabase`] -- `HashMap`-based kinds and tag targets for
//!   tests and tools
//! - [`NonTagPeeler`] -- treats every object as a non-tag
//! - any `Fn(&ObjectId) -> PeelOutcome` closure

pub mod error;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{OdbError, OdbResult};
pub use memory::InMemoryObjectDatabase;
pub use object::ObjectKind;
pub use traits::{NonTagPeeler, PeelOutcome, Peeler};
