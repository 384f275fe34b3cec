//! Prefix-compressed records.
//!
//! Ref record:
//! ```text
//! varint( prefix_length )
//! varint( (suffix_length << 3) | value_type )
//! suffix
//! varint( update_index_delta )
//! value?            0, 1 or 2 object ids depending on value_type
//! ```
//!
//! Index record:
//! ```text
//! varint( prefix_length )
//! varint( (suffix_length << 3) | 0 )
//! suffix
//! varint( block_position )
//! ```
//!
//! `prefix_length` counts the bytes shared with the previous record's name.
//! Records at restart points always have a zero prefix.

use reft_odb::{PeelOutcome, Peeler};
use reft_refs::ReferenceUpdate;
use reft_types::{HashAlgorithm, ObjectId};
use serde::{Deserialize, Serialize};

use crate::block::BlockType;
use crate::error::{ReftableError, ReftableResult};
use crate::varint::{decode_varint, encode_varint, MAX_VARINT_RESERVATION};

/// Worst case for the three varints of any record.
const RECORD_VARINT_RESERVATION: usize = 3 * MAX_VARINT_RESERVATION;

/// The 3-bit value type carried by each ref record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueType {
    Deletion = 0x0,
    OneId = 0x1,
    TwoIds = 0x2,
    Symref = 0x3,
}

impl ValueType {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x0 => Some(Self::Deletion),
            0x1 => Some(Self::OneId),
            0x2 => Some(Self::TwoIds),
            0x3 => Some(Self::Symref),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// The value stored by a ref record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefValue {
    Deletion,
    /// Points directly at a non-tag object.
    Direct(ObjectId),
    /// Points at an annotated tag; `peeled` is what the tag resolves to.
    Peeled { target: ObjectId, peeled: ObjectId },
}

impl RefValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Deletion => ValueType::Deletion,
            Self::Direct(_) => ValueType::OneId,
            Self::Peeled { .. } => ValueType::TwoIds,
        }
    }

    /// Bytes the value occupies on disk.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Deletion => 0,
            Self::Direct(id) => id.raw_size(),
            Self::Peeled { target, peeled } => target.raw_size() + peeled.raw_size(),
        }
    }
}

/// Work out what a record for `update` stores, asking `peeler` whether the
/// new object is an annotated tag.
pub fn resolve_value<P: Peeler + ?Sized>(
    update: &ReferenceUpdate,
    peeler: &P,
    hash: HashAlgorithm,
) -> ReftableResult<RefValue> {
    let Some(id) = update.new_oid else {
        return Ok(RefValue::Deletion);
    };
    check_hash(update, &id, hash)?;

    match peeler.peel(&id) {
        PeelOutcome::NonTag => Ok(RefValue::Direct(id)),
        PeelOutcome::Peeled(peeled) => {
            check_hash(update, &peeled, hash)?;
            Ok(RefValue::Peeled { target: id, peeled })
        }
        PeelOutcome::IsSymref => Err(ReftableError::UnsupportedSymref {
            name: update.name_lossy().into_owned(),
        }),
        outcome @ (PeelOutcome::Invalid | PeelOutcome::Broken) => Err(ReftableError::PeelError {
            name: update.name_lossy().into_owned(),
            id,
            outcome,
        }),
    }
}

fn check_hash(update: &ReferenceUpdate, id: &ObjectId, hash: HashAlgorithm) -> ReftableResult<()> {
    if id.algorithm() != hash {
        return Err(ReftableError::HashMismatch {
            name: update.name_lossy().into_owned(),
            expected: hash,
            actual: id.algorithm(),
        });
    }
    Ok(())
}

/// A decoded ref record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefRecord {
    pub name: Vec<u8>,
    pub update_index_delta: u64,
    pub value: RefValue,
}

impl RefRecord {
    /// Rebuild the reference update, restoring the absolute update index
    /// from the table's baseline.
    pub fn into_update(self, baseline: u64) -> (u64, ReferenceUpdate) {
        let update = match self.value {
            RefValue::Deletion => ReferenceUpdate::deletion(self.name),
            RefValue::Direct(id) => ReferenceUpdate::new(self.name, id),
            RefValue::Peeled { target, peeled } => {
                ReferenceUpdate::new(self.name, target).with_peeled(peeled)
            }
        };
        let update_index = baseline.saturating_add(self.update_index_delta);
        (self.update_index_delta, update.with_update_index(update_index))
    }
}

/// A decoded index record: the last name of a ref block and where that
/// block starts in the file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub last_name: Vec<u8>,
    pub block_position: u64,
}

/// Records that can be decoded from a block.
pub trait BlockRecord: Sized {
    /// The only block type this record may appear in.
    const BLOCK_TYPE: BlockType;

    /// The sort key: a ref name, or the last name of an indexed block.
    fn key(&self) -> &[u8];

    /// Decode the record at `pos`. See [`decode_ref_record`].
    fn decode(
        block: &[u8],
        pos: usize,
        max_pos: usize,
        previous_key: &[u8],
        at_restart: bool,
        hash: HashAlgorithm,
    ) -> ReftableResult<Option<(Self, usize)>>;
}

impl BlockRecord for RefRecord {
    const BLOCK_TYPE: BlockType = BlockType::Ref;

    fn key(&self) -> &[u8] {
        &self.name
    }

    fn decode(
        block: &[u8],
        pos: usize,
        max_pos: usize,
        previous_key: &[u8],
        at_restart: bool,
        hash: HashAlgorithm,
    ) -> ReftableResult<Option<(Self, usize)>> {
        decode_ref_record(block, pos, max_pos, previous_key, at_restart, hash)
    }
}

impl BlockRecord for IndexRecord {
    const BLOCK_TYPE: BlockType = BlockType::Index;

    fn key(&self) -> &[u8] {
        &self.last_name
    }

    fn decode(
        block: &[u8],
        pos: usize,
        max_pos: usize,
        previous_key: &[u8],
        at_restart: bool,
        _hash: HashAlgorithm,
    ) -> ReftableResult<Option<(Self, usize)>> {
        decode_index_record(block, pos, max_pos, previous_key, at_restart)
    }
}

pub(crate) fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn push_key(out: &mut Vec<u8>, prefix_len: usize, suffix: &[u8], value_type: u8) {
    encode_varint(prefix_len as u64, out);
    encode_varint(((suffix.len() as u64) << 3) | u64::from(value_type), out);
    out.extend_from_slice(suffix);
}

/// Append a ref record to `out`.
///
/// Returns the number of bytes written, or `None` without touching `out`
/// when the record might not fit in `max_size` bytes. The check uses the
/// worst-case varint width rather than the exact size.
pub fn encode_ref_record(
    out: &mut Vec<u8>,
    max_size: usize,
    previous_name: &[u8],
    name: &[u8],
    value: &RefValue,
    update_index_delta: u64,
    is_restart: bool,
) -> Option<usize> {
    let prefix_len = if is_restart {
        0
    } else {
        common_prefix_len(previous_name, name)
    };
    let suffix = &name[prefix_len..];

    let worst_case = RECORD_VARINT_RESERVATION + suffix.len() + value.encoded_len();
    if worst_case > max_size {
        return None;
    }

    let start = out.len();
    push_key(out, prefix_len, suffix, value.value_type().bits());
    encode_varint(update_index_delta, out);
    match value {
        RefValue::Deletion => {}
        RefValue::Direct(id) => out.extend_from_slice(id.as_bytes()),
        RefValue::Peeled { target, peeled } => {
            out.extend_from_slice(target.as_bytes());
            out.extend_from_slice(peeled.as_bytes());
        }
    }
    Some(out.len() - start)
}

/// Append an index record to `out`. Same contract as [`encode_ref_record`].
pub fn encode_index_record(
    out: &mut Vec<u8>,
    max_size: usize,
    previous_name: &[u8],
    name: &[u8],
    block_position: u64,
    is_restart: bool,
) -> Option<usize> {
    let prefix_len = if is_restart {
        0
    } else {
        common_prefix_len(previous_name, name)
    };
    let suffix = &name[prefix_len..];

    if RECORD_VARINT_RESERVATION + suffix.len() > max_size {
        return None;
    }

    let start = out.len();
    push_key(out, prefix_len, suffix, 0);
    encode_varint(block_position, out);
    Some(out.len() - start)
}

/// Shared front of every record.
pub(crate) struct DecodedKey {
    pub name: Vec<u8>,
    pub prefix_len: usize,
    pub value_type: u8,
    pub next: usize,
}

/// Field cursor bounded by the end of the record area.
struct Cursor<'a> {
    area: &'a [u8],
    pos: usize,
    record_start: usize,
}

impl<'a> Cursor<'a> {
    fn varint(&mut self) -> ReftableResult<u64> {
        let rest = self.area.get(self.pos..).unwrap_or_default();
        let (value, consumed) = decode_varint(rest)
            .map_err(|e| ReftableError::corrupt_record(self.record_start, e.to_string()))?;
        self.pos += consumed;
        Ok(value)
    }

    fn bytes(&mut self, len: u64) -> ReftableResult<&'a [u8]> {
        let end = usize::try_from(len)
            .ok()
            .and_then(|len| self.pos.checked_add(len))
            .filter(|&end| end <= self.area.len())
            .ok_or_else(|| {
                ReftableError::corrupt_record(
                    self.record_start,
                    format!("field of {len} bytes runs past the record area"),
                )
            })?;
        let bytes = &self.area[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn object_id(&mut self, hash: HashAlgorithm) -> ReftableResult<ObjectId> {
        let raw = self.bytes(hash.raw_size() as u64)?;
        ObjectId::from_raw(hash, raw)
            .map_err(|e| ReftableError::corrupt_record(self.record_start, e.to_string()))
    }
}

/// Decode the prefix, suffix and value type of the record at `pos`.
///
/// Returns `None` once `pos` reaches `max_pos`.
pub(crate) fn decode_key(
    block: &[u8],
    pos: usize,
    max_pos: usize,
    previous_name: &[u8],
    at_restart: bool,
) -> ReftableResult<Option<DecodedKey>> {
    let max_pos = max_pos.min(block.len());
    if pos >= max_pos {
        return Ok(None);
    }

    let mut cursor = Cursor {
        area: &block[..max_pos],
        pos,
        record_start: pos,
    };
    let prefix_len = cursor.varint()?;
    let suffix_and_type = cursor.varint()?;
    let value_type = (suffix_and_type & 0x7) as u8;
    let suffix_len = suffix_and_type >> 3;

    if at_restart && prefix_len != 0 {
        return Err(ReftableError::corrupt_record(
            pos,
            format!("restart record has prefix length {prefix_len}"),
        ));
    }
    if prefix_len > previous_name.len() as u64 {
        return Err(ReftableError::corrupt_record(
            pos,
            format!(
                "prefix length {prefix_len} exceeds previous name length {}",
                previous_name.len()
            ),
        ));
    }
    let prefix_len = prefix_len as usize;

    let suffix = cursor.bytes(suffix_len)?;
    let mut name = Vec::with_capacity(prefix_len + suffix.len());
    name.extend_from_slice(&previous_name[..prefix_len]);
    name.extend_from_slice(suffix);

    Ok(Some(DecodedKey {
        name,
        prefix_len,
        value_type,
        next: cursor.pos,
    }))
}

/// Decode the ref record starting at `pos` in `block`.
///
/// `max_pos` is the start of the block's restart table: nothing at or past
/// it is read. Returns `None` when `pos` has reached `max_pos`, otherwise
/// the record and the position just past it. A record whose fields run past
/// `max_pos` is corrupt.
pub fn decode_ref_record(
    block: &[u8],
    pos: usize,
    max_pos: usize,
    previous_name: &[u8],
    at_restart: bool,
    hash: HashAlgorithm,
) -> ReftableResult<Option<(RefRecord, usize)>> {
    let Some(key) = decode_key(block, pos, max_pos, previous_name, at_restart)? else {
        return Ok(None);
    };

    let mut cursor = Cursor {
        area: &block[..max_pos.min(block.len())],
        pos: key.next,
        record_start: pos,
    };
    let update_index_delta = cursor.varint()?;

    let value = match ValueType::from_bits(key.value_type) {
        Some(ValueType::Deletion) => RefValue::Deletion,
        Some(ValueType::OneId) => RefValue::Direct(cursor.object_id(hash)?),
        Some(ValueType::TwoIds) => {
            let target = cursor.object_id(hash)?;
            let peeled = cursor.object_id(hash)?;
            RefValue::Peeled { target, peeled }
        }
        Some(ValueType::Symref) => {
            return Err(ReftableError::corrupt_record(
                pos,
                "symbolic ref records are not supported",
            ))
        }
        None => {
            return Err(ReftableError::corrupt_record(
                pos,
                format!("unknown value type 0x{:x}", key.value_type),
            ))
        }
    };

    let record = RefRecord {
        name: key.name,
        update_index_delta,
        value,
    };
    Ok(Some((record, cursor.pos)))
}

/// Decode the index record starting at `pos`. Same contract as
/// [`decode_ref_record`].
pub fn decode_index_record(
    block: &[u8],
    pos: usize,
    max_pos: usize,
    previous_name: &[u8],
    at_restart: bool,
) -> ReftableResult<Option<(IndexRecord, usize)>> {
    let Some(key) = decode_key(block, pos, max_pos, previous_name, at_restart)? else {
        return Ok(None);
    };
    if key.value_type != 0 {
        return Err(ReftableError::corrupt_record(
            pos,
            format!("index record has value type 0x{:x}", key.value_type),
        ));
    }

    let mut cursor = Cursor {
        area: &block[..max_pos.min(block.len())],
        pos: key.next,
        record_start: pos,
    };
    let block_position = cursor.varint()?;

    let record = IndexRecord {
        last_name: key.name,
        block_position,
    };
    Ok(Some((record, cursor.pos)))
}
