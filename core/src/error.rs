use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid backup URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid volume size: {0}")]
    InvalidVolumeSize(u64),

    #[error("Unsupported block size: {0}")]
    UnsupportedBlockSize(u64),

    #[error("Extent size {size} is not a multiple of block size {block_size}")]
    UnalignedExtent { size: u64, block_size: u64 },

    #[error("Block checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Corrupt block payload: {0}")]
    CorruptBlock(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Volume not found: {name}")]
    VolumeNotFound { name: String },

    #[error("Backup not found: {name}")]
    BackupNotFound { name: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
