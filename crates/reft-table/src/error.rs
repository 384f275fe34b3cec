use reft_odb::PeelOutcome;
use reft_types::{HashAlgorithm, ObjectId};
use thiserror::Error;

/// Low-level failures of the integer codecs.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("value {value} does not fit in {bits} bits")]
    ValueTooLarge { value: u64, bits: u32 },

    #[error("truncated varint")]
    TruncatedVarint,

    #[error("varint overflows 64 bits")]
    VarintOverflow,

    #[error("buffer too short: need {needed} bytes, have {available}")]
    BufferTooShort { needed: usize, available: usize },
}

#[derive(Debug, Error)]
pub enum ReftableError {
    /// Bad signature, version or block size in the file header.
    #[error("corrupt reftable header: {reason}")]
    CorruptHeader { reason: String },

    /// Bad block tag, length or restart table. `offset` is the block's
    /// position in the file.
    #[error("corrupt block at offset {offset}: {reason}")]
    CorruptBlock { offset: u64, reason: String },

    /// A record that cannot be decoded. `offset` is relative to the start
    /// of its block.
    #[error("corrupt record at block offset {offset}: {reason}")]
    CorruptRecord { offset: usize, reason: String },

    /// A single record does not fit in an empty block.
    #[error("block size {block_size} is too small to hold ref {name:?}")]
    BlockSizeTooSmall { block_size: u32, name: String },

    #[error("symbolic ref {name:?} cannot be stored in a reftable")]
    UnsupportedSymref { name: String },

    #[error("cannot peel {id} for ref {name:?}: {outcome:?}")]
    PeelError {
        name: String,
        id: ObjectId,
        outcome: PeelOutcome,
    },

    #[error("ref {name:?} uses a {actual} id but the table stores {expected} ids")]
    HashMismatch {
        name: String,
        expected: HashAlgorithm,
        actual: HashAlgorithm,
    },

    #[error("refs out of order: {previous:?} must sort before {name:?}")]
    UnsortedUpdates { previous: String, name: String },

    #[error("invalid ref update {name:?}: {reason}")]
    InvalidUpdate { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("writer is {0}")]
    InvalidState(&'static str),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReftableError {
    pub(crate) fn corrupt_block(offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptBlock {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt_record(offset: usize, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that mean the file content is damaged, as
    /// opposed to I/O failures or caller mistakes.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptHeader { .. } | Self::CorruptBlock { .. } | Self::CorruptRecord { .. }
        )
    }
}

pub type ReftableResult<T> = Result<T, ReftableError>;
