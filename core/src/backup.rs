//! Delta backup engine.
//!
//! [`create_backup`] runs the synchronous setup (driver resolution,
//! volume record, baseline selection, snapshot comparison) and returns
//! the new backup's name as soon as the upload task is launched. The
//! task walks the changed extents block by block, uploads blocks the
//! store has never seen, merges the result with the previous manifest
//! and reports completion through
//! [`VolumeOperations::update_backup_status`].

use crate::codec;
use crate::driver::{self, Backend};
use crate::manifest::{Backup, Volume};
use crate::ops::{Mappings, VolumeOperations};
use crate::store;
use crate::types::{BlockChecksum, BlockMapping, SnapshotInfo, VolumeInfo, DEFAULT_BLOCK_SIZE};
use crate::{Error, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress tops out here while blocks upload; the jump to 100 happens
/// only once the manifest and volume record are persisted.
const PROGRESS_PERCENTAGE_BACKUP_SNAPSHOT: u32 = 95;
const PROGRESS_PERCENTAGE_BACKUP_TOTAL: u32 = 100;

pub struct BackupConfig {
    pub volume: VolumeInfo,
    pub snapshot: SnapshotInfo,
    pub dest_url: String,
    pub ops: Arc<dyn VolumeOperations>,
    pub labels: HashMap<String, String>,
}

/// Launch a delta backup of `config.snapshot`.
///
/// Returns the name of the new backup once the upload task is running.
/// The upload itself proceeds in the background; completion or failure is
/// reported through the status callback, with the encoded backup URL on
/// success.
pub async fn create_backup(config: BackupConfig) -> Result<String> {
    let driver = driver::resolve(&config.dest_url).await?;

    Volume::ensure(driver.as_ref(), &config.volume).await?;
    // Reload the record: the destination is authoritative, not the caller.
    let volume = Volume::load(driver.as_ref(), &config.volume.name).await?;

    let snapshot_name = config.snapshot.name.clone();
    let volume_name = volume.name.clone();
    if !store::valid_name(&snapshot_name) {
        return Err(Error::InvalidName(snapshot_name));
    }

    config.ops.open_snapshot(&snapshot_name, &volume_name).await?;

    // From here on the snapshot must be closed on every exit path.
    let (delta, last_backup) = match prepare_delta(&config, &volume, driver.as_ref()).await {
        Ok(prepared) => prepared,
        Err(err) => {
            close_snapshot(&config.ops, &snapshot_name, &volume_name).await;
            return Err(err);
        }
    };

    let backup_name = store::generate_name("backup");
    info!(
        backup = %backup_name,
        snapshot = %snapshot_name,
        volume = %volume_name,
        extents = delta.extents.len(),
        "creating backup"
    );

    let name = backup_name.clone();
    tokio::spawn(run_backup_task(config, driver, delta, last_backup, backup_name));
    Ok(name)
}

/// Pick the comparison baseline and fetch the changed extents.
///
/// Falls back to a full backup when there is no previous backup, when the
/// previous backup covers the snapshot being backed up right now, or when
/// the previously backed-up snapshot is gone from local storage.
async fn prepare_delta(
    config: &BackupConfig,
    volume: &Volume,
    driver: &dyn Backend,
) -> Result<(Mappings, Option<Backup>)> {
    let snapshot = &config.snapshot.name;
    let mut last_backup = None;
    let mut baseline: Option<String> = None;

    if let Some(last_name) = &volume.last_backup_name {
        let backup = Backup::load(driver, last_name, &volume.name).await?;
        if backup.snapshot_name == *snapshot {
            debug!(
                snapshot = %snapshot,
                "snapshot was already backed up last time, taking a full pass"
            );
        } else if !config.ops.has_snapshot(&backup.snapshot_name, &volume.name).await {
            warn!(
                snapshot = %backup.snapshot_name,
                volume = %volume.name,
                "last backed-up snapshot not found in local storage, falling back to full backup"
            );
        } else {
            baseline = Some(backup.snapshot_name.clone());
        }
        last_backup = Some(backup);
    }

    debug!(snapshot = %snapshot, baseline = ?baseline, "comparing snapshots");
    let delta = config
        .ops
        .compare_snapshot(snapshot, baseline.as_deref(), &volume.name)
        .await?;

    if delta.block_size != DEFAULT_BLOCK_SIZE {
        return Err(Error::UnsupportedBlockSize(delta.block_size));
    }
    for extent in &delta.extents {
        if extent.size == 0 || extent.size % delta.block_size != 0 {
            return Err(Error::UnalignedExtent {
                size: extent.size,
                block_size: delta.block_size,
            });
        }
    }

    Ok((delta, last_backup))
}

/// Drives the upload, guaranteeing the snapshot is closed and a terminal
/// status is reported no matter how the work ends.
async fn run_backup_task(
    config: BackupConfig,
    driver: Arc<dyn Backend>,
    delta: Mappings,
    last_backup: Option<Backup>,
    backup_name: String,
) {
    let snapshot = config.snapshot.name.clone();
    let volume = config.volume.name.clone();
    let ops = Arc::clone(&config.ops);

    // The upload runs on its own task so a panic surfaces as a join error
    // and the snapshot still gets closed.
    let worker = tokio::spawn(perform_backup(config, driver, delta, last_backup, backup_name));
    let (progress, outcome) = match worker.await {
        Ok(result) => result,
        Err(err) => (0, Err(Error::Other(format!("backup task aborted: {err}")))),
    };

    close_snapshot(&ops, &snapshot, &volume).await;

    match outcome {
        Ok(backup_url) => {
            ops.update_backup_status(&snapshot, &volume, progress, Some(&backup_url), None)
                .await;
        }
        Err(err) => {
            warn!(snapshot = %snapshot, volume = %volume, error = %err, "backup failed");
            ops.update_backup_status(&snapshot, &volume, progress, None, Some(&err.to_string()))
                .await;
        }
    }
}

async fn perform_backup(
    config: BackupConfig,
    driver: Arc<dyn Backend>,
    delta: Mappings,
    last_backup: Option<Backup>,
    backup_name: String,
) -> (u32, Result<String>) {
    let mut progress = 0;
    let result = upload_blocks(
        &config,
        driver.as_ref(),
        &delta,
        last_backup,
        backup_name,
        &mut progress,
    )
    .await;
    (progress, result)
}

async fn upload_blocks(
    config: &BackupConfig,
    driver: &dyn Backend,
    delta: &Mappings,
    last_backup: Option<Backup>,
    backup_name: String,
    progress: &mut u32,
) -> Result<String> {
    let ops = &config.ops;
    let volume_name = &config.volume.name;
    let snapshot_name = &config.snapshot.name;

    let mut delta_blocks: Vec<BlockMapping> = Vec::new();
    let mut new_blocks: i64 = 0;
    let mut block = vec![0u8; DEFAULT_BLOCK_SIZE as usize];

    let extent_count = delta.extents.len();
    for (m, extent) in delta.extents.iter().enumerate() {
        let blocks_in_extent = extent.size / delta.block_size;
        for i in 0..blocks_in_extent {
            let offset = extent.offset + i * delta.block_size;
            debug!(
                snapshot = %snapshot_name,
                extent = m + 1,
                extents = extent_count,
                block = i + 1,
                blocks = blocks_in_extent,
                "backing up block"
            );
            ops.read_snapshot(snapshot_name, volume_name, offset, &mut block)
                .await?;

            let checksum = BlockChecksum::from_data(&block);
            let block_path = store::block_file_path(volume_name, &checksum);
            if driver.file_size(&block_path).await?.is_some() {
                delta_blocks.push(BlockMapping { offset, checksum });
                debug!(path = %block_path, "found existing block");
                continue;
            }

            let compressed = codec::compress_block(&block)?;
            driver.write(&block_path, compressed).await?;
            debug!(path = %block_path, "created new block");

            new_blocks += 1;
            delta_blocks.push(BlockMapping { offset, checksum });
        }

        *progress = (((m + 1) as f64 / extent_count as f64)
            * PROGRESS_PERCENTAGE_BACKUP_SNAPSHOT as f64) as u32;
        ops.update_backup_status(snapshot_name, volume_name, *progress, None, None)
            .await;
    }

    let blocks = match &last_backup {
        Some(last) => merge_mappings(&delta_blocks, &last.blocks),
        None => delta_blocks,
    };

    let backup = Backup {
        name: backup_name,
        volume_name: volume_name.clone(),
        snapshot_name: snapshot_name.clone(),
        snapshot_created_at: config.snapshot.created_at,
        created_at: Utc::now(),
        size: blocks.len() as u64 * DEFAULT_BLOCK_SIZE,
        blocks,
        labels: config.labels.clone(),
    };
    backup.save(driver).await?;

    // Reload before mutating: the record may have moved since setup.
    let mut volume = Volume::load(driver, volume_name).await?;
    volume.last_backup_name = Some(backup.name.clone());
    volume.last_backup_at = Some(backup.snapshot_created_at);
    volume.block_count += new_blocks;
    volume.save(driver).await?;

    info!(
        backup = %backup.name,
        volume = %volume_name,
        blocks = backup.blocks.len(),
        new_blocks,
        "backup complete"
    );

    *progress = PROGRESS_PERCENTAGE_BACKUP_TOTAL;
    Ok(store::encode_backup_url(
        &backup.name,
        volume_name,
        &config.dest_url,
    ))
}

/// Combine the delta's mappings with the previous manifest's so the new
/// manifest is self-contained. Both inputs are strictly ascending by
/// offset; at equal offsets the delta's mapping wins.
pub fn merge_mappings(delta: &[BlockMapping], last: &[BlockMapping]) -> Vec<BlockMapping> {
    let mut merged = Vec::with_capacity(delta.len().max(last.len()));
    let (mut d, mut l) = (0, 0);
    while d < delta.len() && l < last.len() {
        if delta[d].offset == last[l].offset {
            merged.push(delta[d]);
            d += 1;
            l += 1;
        } else if delta[d].offset < last[l].offset {
            merged.push(delta[d]);
            d += 1;
        } else {
            merged.push(last[l]);
            l += 1;
        }
    }
    merged.extend_from_slice(&delta[d..]);
    merged.extend_from_slice(&last[l..]);
    merged
}

async fn close_snapshot(ops: &Arc<dyn VolumeOperations>, snapshot: &str, volume: &str) {
    if let Err(err) = ops.close_snapshot(snapshot, volume).await {
        warn!(snapshot = %snapshot, volume = %volume, error = %err, "failed to close snapshot");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(offset: u64, payload: &[u8]) -> BlockMapping {
        BlockMapping {
            offset,
            checksum: BlockChecksum::from_data(payload),
        }
    }

    #[test]
    fn test_merge_with_empty_last_is_identity() {
        let delta = vec![mapping(0, b"a"), mapping(8, b"b")];
        assert_eq!(merge_mappings(&delta, &[]), delta);
    }

    #[test]
    fn test_merge_with_empty_delta_keeps_last() {
        let last = vec![mapping(0, b"a"), mapping(8, b"b")];
        assert_eq!(merge_mappings(&[], &last), last);
    }

    #[test]
    fn test_merge_delta_wins_at_equal_offset() {
        let delta = vec![mapping(8, b"new")];
        let last = vec![mapping(0, b"a"), mapping(8, b"old"), mapping(16, b"c")];
        let merged = merge_mappings(&delta, &last);
        assert_eq!(
            merged,
            vec![mapping(0, b"a"), mapping(8, b"new"), mapping(16, b"c")]
        );
    }

    #[test]
    fn test_merge_interleaves_by_offset() {
        let delta = vec![mapping(8, b"x"), mapping(32, b"y")];
        let last = vec![mapping(0, b"a"), mapping(16, b"b")];
        let merged = merge_mappings(&delta, &last);
        let offsets: Vec<u64> = merged.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16, 32]);
    }

    #[test]
    fn test_merge_output_is_strictly_ascending() {
        let delta = vec![mapping(0, b"n0"), mapping(16, b"n2"), mapping(24, b"n3")];
        let last = vec![mapping(0, b"o0"), mapping(8, b"o1"), mapping(16, b"o2")];
        let merged = merge_mappings(&delta, &last);
        assert!(merged.windows(2).all(|w| w[0].offset < w[1].offset));
        assert_eq!(merged.len(), 4);
        // Every offset present in the delta carries the delta's checksum.
        assert_eq!(merged[0], delta[0]);
        assert_eq!(merged[2], delta[1]);
        assert_eq!(merged[3], delta[2]);
    }
}
