use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Largest raw id size of any supported algorithm.
pub const MAX_RAW_SIZE: usize = 32;

/// Hash function an object database names its objects with.
///
/// Only the raw size matters to reftable: every id stored in one table has
/// the same length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// The legacy 20-byte hash.
    #[default]
    Sha1,
    /// The newer 32-byte hash.
    Sha256,
}

impl HashAlgorithm {
    /// Length of a raw id in bytes.
    pub const fn raw_size(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Length of a hex-encoded id.
    pub const fn hex_len(self) -> usize {
        self.raw_size() * 2
    }

    /// Algorithm whose raw ids are `len` bytes long, if any.
    pub fn from_raw_size(len: usize) -> Option<Self> {
        match len {
            20 => Some(Self::Sha1),
            32 => Some(Self::Sha256),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(TypeError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Opaque identifier of an object in the repository's object database.
///
/// The id is a fixed-length byte string whose length is given by its
/// [`HashAlgorithm`]. Reftable never interprets the bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    algo: HashAlgorithm,
    bytes: [u8; MAX_RAW_SIZE],
}

impl ObjectId {
    /// Build an id from its raw bytes. The length must match `algo`.
    pub fn from_raw(algo: HashAlgorithm, raw: &[u8]) -> Result<Self, TypeError> {
        if raw.len() != algo.raw_size() {
            return Err(TypeError::InvalidLength {
                expected: algo.raw_size(),
                actual: raw.len(),
            });
        }
        let mut bytes = [0u8; MAX_RAW_SIZE];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self { algo, bytes })
    }

    /// Derive a deterministic id from arbitrary content.
    ///
    /// The content is hashed with BLAKE3 and truncated to the algorithm's raw
    /// size. Useful for fixtures; it does not reproduce a real repository's
    /// object names.
    pub fn hash(algo: HashAlgorithm, data: &[u8]) -> Self {
        let digest = blake3::hash(data);
        let mut bytes = [0u8; MAX_RAW_SIZE];
        bytes[..algo.raw_size()].copy_from_slice(&digest.as_bytes()[..algo.raw_size()]);
        Self { algo, bytes }
    }

    /// The null object id (all zeros). Represents "no object".
    pub const fn null(algo: HashAlgorithm) -> Self {
        Self {
            algo,
            bytes: [0u8; MAX_RAW_SIZE],
        }
    }

    /// Returns `true` if this is the null object id.
    pub fn is_null(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algo
    }

    /// Number of raw bytes in this id.
    pub fn raw_size(&self) -> usize {
        self.algo.raw_size()
    }

    /// The raw id bytes, exactly [`raw_size`](Self::raw_size) long.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.algo.raw_size()]
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.bytes[..4])
    }

    /// Parse from a hex string. The algorithm is inferred from the length.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let raw = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let algo = HashAlgorithm::from_raw_size(raw.len()).ok_or(TypeError::InvalidLength {
            expected: HashAlgorithm::Sha1.raw_size(),
            actual: raw.len(),
        })?;
        Self::from_raw(algo, &raw)
    }

    /// Parse from a hex string that must belong to `algo`.
    pub fn from_hex_with(algo: HashAlgorithm, s: &str) -> Result<Self, TypeError> {
        if s.len() != algo.hex_len() {
            return Err(TypeError::InvalidLength {
                expected: algo.hex_len(),
                actual: s.len(),
            });
        }
        let raw = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_raw(algo, &raw)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({}:{})", self.algo, self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
