//! Fixed-size blocks of prefix-compressed records.
//!
//! ```text
//! [24 bytes: file header]          first block only
//! [1 byte:  block type 'r' | 'i']
//! [3 bytes: block length]          header included, padding excluded
//! [records ...]
//! [3 bytes * N: restart offsets]   from the start of the block
//! [2 bytes: restart count N]
//! [zero padding to block size]
//! ```

use std::marker::PhantomData;

use reft_odb::Peeler;
use reft_refs::ReferenceUpdate;
use reft_types::HashAlgorithm;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WriterConfig;
use crate::error::{ReftableError, ReftableResult};
use crate::fixed::{decode_u16_be, decode_u24_be, encode_u16_be, encode_u24_be, push_u24_be};
use crate::header::{Header, HEADER_SIZE};
use crate::record::{
    decode_key, encode_index_record, encode_ref_record, resolve_value, BlockRecord, RefRecord,
    RefValue,
};

pub const BLOCK_TYPE_SIZE: usize = 1;
pub const BLOCK_LEN_SIZE: usize = 3;
pub const RESTART_OFFSET_SIZE: usize = 3;
pub const RESTART_COUNT_SIZE: usize = 2;

/// The restart count is a 16-bit field.
const MAX_RESTARTS: usize = u16::MAX as usize;

/// Block type tag, the first byte after the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Ref,
    Index,
}

impl BlockType {
    pub fn tag(self) -> u8 {
        match self {
            Self::Ref => b'r',
            Self::Index => b'i',
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'r' => Some(Self::Ref),
            b'i' => Some(Self::Index),
            _ => None,
        }
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ref => write!(f, "ref"),
            Self::Index => write!(f, "index"),
        }
    }
}

/// Incrementally fills one block under its size budget.
///
/// Records are appended until one no longer fits; [`finish`](Self::finish)
/// then writes the restart table and pads to the block size.
#[derive(Debug)]
pub struct BlockBuilder {
    block_size: usize,
    restart_gap: usize,
    buf: Vec<u8>,
    header_len: usize,
    restarts: Vec<u32>,
    entries: usize,
    last_name: Vec<u8>,
}

impl BlockBuilder {
    /// Start a block. `header` is only passed for the first block of a file.
    pub fn new(
        block_type: BlockType,
        block_size: u32,
        restart_gap: usize,
        header: Option<&Header>,
    ) -> ReftableResult<Self> {
        let block_size = block_size as usize;
        let mut buf = Vec::with_capacity(block_size);
        if let Some(header) = header {
            buf.extend_from_slice(&header.encode()?);
        }
        let header_len = buf.len();
        buf.push(block_type.tag());
        buf.extend_from_slice(&[0u8; BLOCK_LEN_SIZE]);

        Ok(Self {
            block_size,
            restart_gap: restart_gap.max(1),
            buf,
            header_len,
            restarts: Vec::new(),
            entries: 0,
            last_name: Vec::new(),
        })
    }

    /// Append a ref record. Returns `false` if it does not fit.
    pub fn add_ref(&mut self, name: &[u8], value: &RefValue, update_index_delta: u64) -> bool {
        self.add_with(name, |out, budget, previous, is_restart| {
            encode_ref_record(out, budget, previous, name, value, update_index_delta, is_restart)
        })
    }

    /// Append an index record. Returns `false` if it does not fit.
    pub fn add_index(&mut self, last_name: &[u8], block_position: u64) -> bool {
        self.add_with(last_name, |out, budget, previous, is_restart| {
            encode_index_record(out, budget, previous, last_name, block_position, is_restart)
        })
    }

    fn add_with<F>(&mut self, name: &[u8], encode: F) -> bool
    where
        F: FnOnce(&mut Vec<u8>, usize, &[u8], bool) -> Option<usize>,
    {
        let is_restart = self.entries % self.restart_gap == 0;
        let restarts = self.restarts.len() + usize::from(is_restart);
        if restarts > MAX_RESTARTS {
            return false;
        }

        let reserved = RESTART_OFFSET_SIZE * restarts + RESTART_COUNT_SIZE;
        let budget = self.block_size.saturating_sub(self.buf.len() + reserved);
        let offset = self.buf.len();
        if encode(&mut self.buf, budget, &self.last_name, is_restart).is_none() {
            return false;
        }

        if is_restart {
            self.restarts.push(offset as u32);
        }
        self.entries += 1;
        self.last_name.clear();
        self.last_name.extend_from_slice(name);
        true
    }

    /// Number of records added so far.
    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Key of the most recently added record.
    pub fn last_name(&self) -> &[u8] {
        &self.last_name
    }

    /// Write the restart table, patch the block length and pad the block.
    ///
    /// An empty block still carries one restart at its record area start.
    pub fn finish(mut self) -> ReftableResult<Vec<u8>> {
        if self.restarts.is_empty() {
            self.restarts
                .push((self.header_len + BLOCK_TYPE_SIZE + BLOCK_LEN_SIZE) as u32);
        }
        let mut buf = self.buf;
        for &offset in &self.restarts {
            push_u24_be(offset, &mut buf)?;
        }
        let mut count = [0u8; RESTART_COUNT_SIZE];
        encode_u16_be(self.restarts.len() as u16, &mut count)?;
        buf.extend_from_slice(&count);

        let block_len = buf.len();
        if block_len > self.block_size {
            return Err(ReftableError::InvalidConfig(format!(
                "block size {} cannot hold {block_len} bytes of block framing",
                self.block_size
            )));
        }
        let len_at = self.header_len + BLOCK_TYPE_SIZE;
        encode_u24_be(block_len as u32, &mut buf[len_at..len_at + BLOCK_LEN_SIZE])?;
        buf.resize(self.block_size, 0);
        Ok(buf)
    }
}

/// A parsed view of one block.
#[derive(Debug)]
pub struct Block<'a> {
    data: &'a [u8],
    position: u64,
    block_type: BlockType,
    header: Option<Header>,
    block_len: usize,
    restart_offsets: Vec<usize>,
    records_start: usize,
    records_end: usize,
}

impl<'a> Block<'a> {
    /// Parse and validate the framing of the block in `data`.
    ///
    /// `position` is the block's offset in the file and is only used in
    /// error reports. The first block of a file starts with the header.
    pub fn parse(data: &'a [u8], position: u64, is_first_block: bool) -> ReftableResult<Self> {
        let corrupt = |reason: String| ReftableError::corrupt_block(position, reason);

        let header = if is_first_block {
            Some(Header::decode(data)?)
        } else {
            None
        };
        let header_len = if is_first_block { HEADER_SIZE } else { 0 };

        let tag = *data
            .get(header_len)
            .ok_or_else(|| corrupt("missing block type".into()))?;
        let block_type = BlockType::from_tag(tag)
            .ok_or_else(|| corrupt(format!("unknown block type 0x{tag:02x}")))?;

        let records_start = header_len + BLOCK_TYPE_SIZE + BLOCK_LEN_SIZE;
        let len_field = data
            .get(header_len + BLOCK_TYPE_SIZE..records_start)
            .ok_or_else(|| corrupt("truncated block length".into()))?;
        let block_len = decode_u24_be(len_field)? as usize;
        if block_len > data.len() {
            return Err(corrupt(format!(
                "block length {block_len} exceeds {} available bytes",
                data.len()
            )));
        }
        if block_len < records_start + RESTART_COUNT_SIZE {
            return Err(corrupt(format!("block length {block_len} is too short")));
        }

        let count_at = block_len - RESTART_COUNT_SIZE;
        let restart_count = decode_u16_be(&data[count_at..block_len])? as usize;
        let records_end = count_at
            .checked_sub(restart_count * RESTART_OFFSET_SIZE)
            .filter(|&end| end >= records_start)
            .ok_or_else(|| {
                corrupt(format!(
                    "restart table of {restart_count} entries does not fit"
                ))
            })?;

        let mut restart_offsets = Vec::with_capacity(restart_count);
        if records_end == records_start && restart_count == 1 {
            // An empty block keeps one restart at the end of its record area.
            let offset = decode_u24_be(&data[records_end..records_end + RESTART_OFFSET_SIZE])?;
            if offset as usize != records_start {
                return Err(corrupt(format!(
                    "restart offset {offset} in an empty block, expected {records_start}"
                )));
            }
        } else {
            for i in 0..restart_count {
                let at = records_end + i * RESTART_OFFSET_SIZE;
                let offset = decode_u24_be(&data[at..at + RESTART_OFFSET_SIZE])? as usize;
                if offset < records_start || offset >= records_end {
                    return Err(corrupt(format!(
                        "restart offset {offset} outside record area \
                         {records_start}..{records_end}"
                    )));
                }
                if restart_offsets.last().is_some_and(|&prev| offset <= prev) {
                    return Err(corrupt(format!("restart offset {offset} out of order")));
                }
                restart_offsets.push(offset);
            }
        }
        if records_end > records_start && restart_offsets.first() != Some(&records_start) {
            return Err(corrupt("first record is not a restart point".into()));
        }

        Ok(Self {
            data: &data[..block_len],
            position,
            block_type,
            header,
            block_len,
            restart_offsets,
            records_start,
            records_end,
        })
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    /// The file header, for the first block.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    pub fn restart_offsets(&self) -> &[usize] {
        &self.restart_offsets
    }

    /// Byte range of the record area within the block.
    pub fn record_area(&self) -> std::ops::Range<usize> {
        self.records_start..self.records_end
    }

    /// Iterate over every record from the start of the block.
    pub fn records<R: BlockRecord>(
        &self,
        hash: HashAlgorithm,
    ) -> ReftableResult<BlockRecords<'_, R>> {
        self.records_from(0, hash)
    }

    /// Iterate from the `restart`-th restart point.
    fn records_from<R: BlockRecord>(
        &self,
        restart: usize,
        hash: HashAlgorithm,
    ) -> ReftableResult<BlockRecords<'_, R>> {
        if R::BLOCK_TYPE != self.block_type {
            return Err(ReftableError::corrupt_block(
                self.position,
                format!("expected {} block, found {}", R::BLOCK_TYPE, self.block_type),
            ));
        }
        let pos = self
            .restart_offsets
            .get(restart)
            .copied()
            .unwrap_or(self.records_end);
        Ok(BlockRecords {
            data: self.data,
            records_end: self.records_end,
            restarts: &self.restart_offsets,
            next_restart: restart,
            pos,
            previous: Vec::new(),
            started: false,
            hash,
            done: false,
            _record: PhantomData,
        })
    }

    /// Decode every record of the block in order.
    pub fn decode_records<R: BlockRecord>(&self, hash: HashAlgorithm) -> ReftableResult<Vec<R>> {
        self.records(hash)?.collect()
    }

    /// Find the first record whose key is `>= key`.
    ///
    /// Binary-searches the restart points, whose keys are stored in full,
    /// then scans forward from the last restart not past `key`.
    pub fn seek<R: BlockRecord>(
        &self,
        key: &[u8],
        hash: HashAlgorithm,
    ) -> ReftableResult<Option<R>> {
        let mut lo = 0;
        let mut hi = self.restart_offsets.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.restart_key(mid)?.as_slice() <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        for record in self.records_from::<R>(lo.saturating_sub(1), hash)? {
            let record = record?;
            if record.key() >= key {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Full key of the record at the `index`-th restart point.
    pub fn restart_key(&self, index: usize) -> ReftableResult<Vec<u8>> {
        let offset = *self.restart_offsets.get(index).ok_or_else(|| {
            ReftableError::corrupt_block(self.position, format!("no restart point {index}"))
        })?;
        decode_key(self.data, offset, self.records_end, &[], true)?
            .map(|key| key.name)
            .ok_or_else(|| ReftableError::corrupt_record(offset, "restart point has no record"))
    }
}

/// Iterator over the records of a [`Block`].
///
/// Yields an error at most once and then stops.
#[derive(Debug)]
pub struct BlockRecords<'b, R> {
    data: &'b [u8],
    records_end: usize,
    restarts: &'b [usize],
    next_restart: usize,
    pos: usize,
    previous: Vec<u8>,
    started: bool,
    hash: HashAlgorithm,
    done: bool,
    _record: PhantomData<R>,
}

impl<R: BlockRecord> BlockRecords<'_, R> {
    fn step(&mut self) -> ReftableResult<Option<R>> {
        let mut at_restart = false;
        if let Some(&restart) = self.restarts.get(self.next_restart) {
            if restart < self.pos {
                return Err(ReftableError::corrupt_record(
                    restart,
                    "restart offset does not start a record",
                ));
            }
            if restart == self.pos {
                at_restart = true;
                self.next_restart += 1;
            }
        }

        let decoded = R::decode(
            self.data,
            self.pos,
            self.records_end,
            &self.previous,
            at_restart,
            self.hash,
        )?;
        let Some((record, next)) = decoded else {
            if let Some(&restart) = self.restarts.get(self.next_restart) {
                return Err(ReftableError::corrupt_record(
                    restart,
                    "restart offset does not start a record",
                ));
            }
            return Ok(None);
        };

        if self.started && record.key() <= self.previous.as_slice() {
            return Err(ReftableError::corrupt_record(
                self.pos,
                "keys out of order",
            ));
        }
        self.started = true;
        self.previous.clear();
        self.previous.extend_from_slice(record.key());
        self.pos = next;
        Ok(Some(record))
    }
}

impl<R: BlockRecord> Iterator for BlockRecords<'_, R> {
    type Item = ReftableResult<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Pack `updates[start..]` into one ref block.
///
/// Returns the block bytes, exactly `config.block_size` long, and the index
/// of the first update that did not fit. `baseline` is subtracted from each
/// update index. Fails with [`ReftableError::BlockSizeTooSmall`] when not a
/// single update fits.
pub fn write_ref_block<P: Peeler + ?Sized>(
    updates: &[ReferenceUpdate],
    start: usize,
    header: Option<&Header>,
    config: &WriterConfig,
    baseline: u64,
    peeler: &P,
) -> ReftableResult<(Vec<u8>, usize)> {
    let mut builder =
        BlockBuilder::new(BlockType::Ref, config.block_size, config.restart_gap, header)?;

    let mut next = start;
    for update in &updates[start..] {
        if update.name.is_empty() {
            return Err(ReftableError::InvalidUpdate {
                name: String::new(),
                reason: "ref name must not be empty".into(),
            });
        }
        let delta = update.update_index.checked_sub(baseline).ok_or_else(|| {
            ReftableError::InvalidUpdate {
                name: update.name_lossy().into_owned(),
                reason: format!(
                    "update index {} is below the table minimum {baseline}",
                    update.update_index
                ),
            }
        })?;
        let value = resolve_value(update, peeler, config.hash)?;
        if !builder.add_ref(&update.name, &value, delta) {
            break;
        }
        next += 1;
    }

    if builder.is_empty() {
        if let Some(update) = updates.get(start) {
            return Err(ReftableError::BlockSizeTooSmall {
                block_size: config.block_size,
                name: update.name_lossy().into_owned(),
            });
        }
    }

    let records = builder.entries();
    let block = builder.finish()?;
    debug!(records, first = start, next, "packed ref block");
    Ok((block, next))
}

/// Decode the ref block at the front of `buf`.
///
/// Returns `(update_index_delta, update)` pairs in file order, with each
/// update's absolute index restored from `baseline`.
pub fn read_ref_block(
    buf: &[u8],
    position: u64,
    block_size: u32,
    is_first_block: bool,
    baseline: u64,
    hash: HashAlgorithm,
) -> ReftableResult<Vec<(u64, ReferenceUpdate)>> {
    let buf = buf.get(..block_size as usize).ok_or_else(|| {
        ReftableError::corrupt_block(
            position,
            format!("need {block_size} bytes, got {}", buf.len()),
        )
    })?;
    let block = Block::parse(buf, position, is_first_block)?;
    if block.block_type() != BlockType::Ref {
        return Err(ReftableError::corrupt_block(
            position,
            format!("expected ref block, found {}", block.block_type()),
        ));
    }

    let records = block
        .records::<RefRecord>(hash)?
        .map(|record| record.map(|r| r.into_update(baseline)))
        .collect::<ReftableResult<Vec<_>>>()?;
    debug!(position, records = records.len(), "decoded ref block");
    Ok(records)
}
