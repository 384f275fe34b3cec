//! Index blocks: one record per ref block, keyed by the block's last name.
//!
//! The index is written after the ref blocks, in as many `'i'` blocks as it
//! needs. A lookup loads the index, picks the first entry whose key is not
//! less than the wanted name and reads only that ref block.

use reft_types::HashAlgorithm;
use tracing::debug;

use crate::block::{Block, BlockBuilder, BlockType};
use crate::error::{ReftableError, ReftableResult};
use crate::record::IndexRecord;

/// Pack `entries[start..]` into one index block.
///
/// Returns the block bytes and the index of the first entry that did not
/// fit.
pub fn write_index_block(
    entries: &[IndexRecord],
    start: usize,
    block_size: u32,
    restart_gap: usize,
) -> ReftableResult<(Vec<u8>, usize)> {
    let mut builder = BlockBuilder::new(BlockType::Index, block_size, restart_gap, None)?;

    let mut next = start;
    for entry in &entries[start..] {
        if !builder.add_index(&entry.last_name, entry.block_position) {
            break;
        }
        next += 1;
    }

    if builder.is_empty() {
        if let Some(entry) = entries.get(start) {
            return Err(ReftableError::BlockSizeTooSmall {
                block_size,
                name: String::from_utf8_lossy(&entry.last_name).into_owned(),
            });
        }
    }

    Ok((builder.finish()?, next))
}

/// Pack all of `entries` into consecutive index blocks.
pub fn write_index_blocks(
    entries: &[IndexRecord],
    block_size: u32,
    restart_gap: usize,
) -> ReftableResult<Vec<Vec<u8>>> {
    let mut blocks = Vec::new();
    let mut start = 0;
    while start < entries.len() {
        let (block, next) = write_index_block(entries, start, block_size, restart_gap)?;
        blocks.push(block);
        start = next;
    }
    debug!(entries = entries.len(), blocks = blocks.len(), "packed index");
    Ok(blocks)
}

/// Decode the index block at the front of `buf`.
pub fn read_index_block(
    buf: &[u8],
    position: u64,
    block_size: u32,
) -> ReftableResult<Vec<IndexRecord>> {
    let buf = buf.get(..block_size as usize).ok_or_else(|| {
        ReftableError::corrupt_block(
            position,
            format!("need {block_size} bytes, got {}", buf.len()),
        )
    })?;
    let block = Block::parse(buf, position, false)?;
    if block.block_type() != BlockType::Index {
        return Err(ReftableError::corrupt_block(
            position,
            format!("expected index block, found {}", block.block_type()),
        ));
    }
    // Index records carry no object ids; the hash is irrelevant.
    block.decode_records(HashAlgorithm::default())
}

/// The entry for the ref block that would hold `name`, if any.
///
/// `index` must be sorted by key, as read from a table.
pub fn find_block<'i>(index: &'i [IndexRecord], name: &[u8]) -> Option<&'i IndexRecord> {
    let at = index.partition_point(|entry| entry.last_name.as_slice() < name);
    index.get(at)
}
