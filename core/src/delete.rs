//! Backup deletion and scan-based garbage collection.
//!
//! Blocks carry no reference counts. After removing a backup's manifest,
//! the set of checksums it referenced is narrowed by scanning every
//! surviving manifest; whatever remains is unreferenced and deleted.
//!
//! Correctness assumes the caller serializes mutating operations per
//! volume: a block uploaded by a concurrent backup that is not yet listed
//! in any persisted manifest would look unreferenced to this scan.

use crate::driver::{self, Backend};
use crate::manifest::{self, Backup, Volume};
use crate::store;
use crate::types::BlockChecksum;
use crate::{Error, Result};
use std::collections::HashSet;
use tracing::{debug, info};

/// Policy knobs for [`delete_backup`].
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// When the deleted backup was the volume's last one, remove every
    /// remaining object under the volume prefix instead of leaving the
    /// volume's block files orphaned for the caller to bulk-delete.
    pub sweep_orphaned_blocks: bool,
}

/// Delete the backup a URL points at and garbage-collect blocks no
/// surviving backup references.
pub async fn delete_backup(backup_url: &str, opts: &DeleteOptions) -> Result<()> {
    let driver = driver::resolve(backup_url).await?;
    let (backup_name, volume_name, _) = store::decode_backup_url(backup_url)?;
    let backup_name = backup_name
        .ok_or_else(|| Error::InvalidUrl(format!("missing backup parameter in {backup_url}")))?;

    let mut volume = Volume::load(driver.as_ref(), &volume_name).await?;
    let backup = Backup::load(driver.as_ref(), &backup_name, &volume_name).await?;

    let mut discard: HashSet<BlockChecksum> =
        backup.blocks.iter().map(|block| block.checksum).collect();

    Backup::remove(driver.as_ref(), &backup_name, &volume_name).await?;
    info!(backup = %backup_name, volume = %volume_name, "removed backup manifest");

    if volume.last_backup_name.as_deref() == Some(backup_name.as_str()) {
        volume.last_backup_name = None;
        volume.last_backup_at = None;
        volume.save(driver.as_ref()).await?;
    }

    let survivors = manifest::backup_names_for_volume(driver.as_ref(), &volume_name).await?;
    if survivors.is_empty() {
        info!(volume = %volume_name, "no backups left, removing volume record");
        if opts.sweep_orphaned_blocks {
            sweep_volume(driver.as_ref(), &volume_name).await?;
        } else {
            Volume::remove(driver.as_ref(), &volume_name).await?;
        }
        return Ok(());
    }

    // Mark: a checksum referenced by any surviving manifest stays.
    for survivor_name in &survivors {
        let survivor = Backup::load(driver.as_ref(), survivor_name, &volume_name).await?;
        for block in &survivor.blocks {
            discard.remove(&block.checksum);
        }
        if discard.is_empty() {
            break;
        }
    }

    // Sweep.
    let removed = discard.len() as i64;
    if !discard.is_empty() {
        let paths: Vec<String> = discard
            .iter()
            .map(|checksum| {
                debug!(checksum = %checksum, volume = %volume_name, "removing unreferenced block");
                store::block_file_path(&volume_name, checksum)
            })
            .collect();
        driver.remove(&paths).await?;
    }
    info!(volume = %volume_name, removed, "garbage collection finished");

    let mut volume = Volume::load(driver.as_ref(), &volume_name).await?;
    volume.block_count -= removed;
    volume.save(driver.as_ref()).await?;
    Ok(())
}

/// Remove a backup volume and everything stored under it.
pub async fn delete_volume(volume_url: &str) -> Result<()> {
    let driver = driver::resolve(volume_url).await?;
    let (_, volume_name, _) = store::decode_backup_url(volume_url)?;
    info!(volume = %volume_name, "removing backup volume");
    sweep_volume(driver.as_ref(), &volume_name).await
}

async fn sweep_volume(driver: &dyn Backend, volume: &str) -> Result<()> {
    let objects = driver.list(&store::volume_path(volume)).await?;
    if !objects.is_empty() {
        driver.remove(&objects).await?;
    }
    Ok(())
}
