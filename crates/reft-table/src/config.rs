use reft_types::HashAlgorithm;
use serde::{Deserialize, Serialize};

use crate::block::{BLOCK_LEN_SIZE, BLOCK_TYPE_SIZE, RESTART_COUNT_SIZE, RESTART_OFFSET_SIZE};
use crate::error::{ReftableError, ReftableResult};
use crate::header::{HEADER_SIZE, MAX_BLOCK_SIZE};

/// Default block size: 16 KiB.
pub const DEFAULT_BLOCK_SIZE: u32 = 16 * 1024;

/// A restart point is added at most this many records apart.
pub const DEFAULT_RESTART_GAP: usize = 16;

/// Size of the writer's staging buffer.
pub const WRITE_BUFFER_SIZE: usize = 8192;

/// Smallest block that can carry the header, block framing and one restart.
/// Real tables need room for records on top of this.
pub const MIN_BLOCK_SIZE: u32 =
    (HEADER_SIZE + BLOCK_TYPE_SIZE + BLOCK_LEN_SIZE + RESTART_OFFSET_SIZE + RESTART_COUNT_SIZE)
        as u32;

/// Configuration for writing a reftable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Size of every block, padding included.
    pub block_size: u32,
    /// Maximum number of records between restart points.
    pub restart_gap: usize,
    /// Hash algorithm of every object id in the table.
    pub hash: HashAlgorithm,
    /// Append index blocks when the refs span more than one block.
    pub write_index: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            restart_gap: DEFAULT_RESTART_GAP,
            hash: HashAlgorithm::default(),
            write_index: true,
        }
    }
}

impl WriterConfig {
    pub fn with_block_size(block_size: u32) -> Self {
        Self {
            block_size,
            ..Default::default()
        }
    }

    /// Check the configuration can produce a well-formed table.
    pub fn validate(&self) -> ReftableResult<()> {
        validate_block_size(self.block_size)?;
        if self.restart_gap == 0 {
            return Err(ReftableError::InvalidConfig(
                "restart gap must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for reading a reftable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Expected block size. `None` trusts the file header.
    pub block_size: Option<u32>,
    /// Hash algorithm of the object ids in the table.
    pub hash: HashAlgorithm,
}

impl ReaderConfig {
    pub fn new(block_size: u32, hash: HashAlgorithm) -> Self {
        Self {
            block_size: Some(block_size),
            hash,
        }
    }

    pub fn validate(&self) -> ReftableResult<()> {
        match self.block_size {
            Some(block_size) => validate_block_size(block_size),
            None => Ok(()),
        }
    }
}

fn validate_block_size(block_size: u32) -> ReftableResult<()> {
    if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
        return Err(ReftableError::InvalidConfig(format!(
            "block size {block_size} outside {MIN_BLOCK_SIZE}..={MAX_BLOCK_SIZE}"
        )));
    }
    Ok(())
}
