//! Capability interface to the snapshot-side volume manager.
//!
//! The backup engine never talks to a hypervisor or storage driver
//! directly; the caller supplies an implementation of
//! [`VolumeOperations`] and the engine drives it.

use crate::Result;
use async_trait::async_trait;

/// One contiguous changed range. Covers whole blocks: `size` is a
/// positive multiple of the comparator's block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub offset: u64,
    pub size: u64,
}

/// Block-difference mapping between two snapshots, ordered by offset.
#[derive(Debug, Clone)]
pub struct Mappings {
    pub block_size: u64,
    pub extents: Vec<Extent>,
}

#[async_trait]
pub trait VolumeOperations: Send + Sync {
    /// Whether the snapshot is still present in local storage.
    async fn has_snapshot(&self, snapshot: &str, volume: &str) -> bool;

    /// Changed extents between `snapshot` and `baseline`. A `None`
    /// baseline yields the full allocation of `snapshot`.
    async fn compare_snapshot(
        &self,
        snapshot: &str,
        baseline: Option<&str>,
        volume: &str,
    ) -> Result<Mappings>;

    async fn open_snapshot(&self, snapshot: &str, volume: &str) -> Result<()>;

    /// Fill `buf` with snapshot content starting at `offset`.
    async fn read_snapshot(
        &self,
        snapshot: &str,
        volume: &str,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<()>;

    async fn close_snapshot(&self, snapshot: &str, volume: &str) -> Result<()>;

    /// Progress callback for the asynchronous upload phase. Terminal calls
    /// carry either the encoded backup URL or an error message.
    async fn update_backup_status(
        &self,
        snapshot: &str,
        volume: &str,
        progress: u32,
        backup_url: Option<&str>,
        error: Option<&str>,
    );
}
