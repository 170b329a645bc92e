use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Fixed payload size of a backup block. Snapshot comparators must report
/// deltas in this granularity.
pub const DEFAULT_BLOCK_SIZE: u64 = 2 * 1024 * 1024;

/// SHA-256 checksum of an uncompressed block payload. Blocks are addressed
/// in the store by the hex encoding of this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockChecksum([u8; 32]);

impl BlockChecksum {
    pub fn from_data(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short_string(&self) -> String {
        self.to_hex().chars().take(8).collect()
    }
}

impl FromStr for BlockChecksum {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(Self(array))
    }
}

impl Serialize for BlockChecksum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockChecksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BlockChecksum::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for BlockChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// One entry of a backup manifest: the block stored for `offset`.
/// Offsets are multiples of the block size and strictly ascending within
/// a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMapping {
    pub offset: u64,
    pub checksum: BlockChecksum,
}

/// Descriptor of the volume being backed up, supplied by the caller.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub name: String,
    /// Logical size in bytes; must be a nonzero multiple of the block size.
    pub size: u64,
}

/// Descriptor of the snapshot a backup is taken from.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
}
