//! Full and incremental restoration of backups onto a local device.

use crate::codec;
use crate::driver::{self, Backend};
use crate::manifest::{Backup, Volume};
use crate::store;
use crate::types::{BlockMapping, DEFAULT_BLOCK_SIZE};
use crate::{Error, Result};
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info};

/// Restore every block of the backup to `output`, creating it if absent.
///
/// Regular files are truncated to the volume's logical size afterwards;
/// block devices are left alone.
pub async fn restore_backup(backup_url: &str, output: &Path) -> Result<()> {
    let driver = driver::resolve(backup_url).await?;
    let (backup_name, volume_name, _) = store::decode_backup_url(backup_url)?;
    let backup_name = backup_name
        .ok_or_else(|| Error::InvalidUrl(format!("missing backup parameter in {backup_url}")))?;

    let volume = Volume::load(driver.as_ref(), &volume_name).await?;
    check_volume_size(volume.size)?;

    let mut dev = OpenOptions::new()
        .write(true)
        .create(true)
        .open(output)
        .await?;
    let metadata = dev.metadata().await?;

    let backup = Backup::load(driver.as_ref(), &backup_name, &volume_name).await?;

    info!(
        backup = %backup_name,
        volume = %volume_name,
        output = %output.display(),
        blocks = backup.blocks.len(),
        "restoring backup"
    );
    let total = backup.blocks.len();
    for (i, block) in backup.blocks.iter().enumerate() {
        debug!(checksum = %block.checksum, block = i + 1, total, "restoring block");
        restore_block(driver.as_ref(), &volume_name, &mut dev, block).await?;
    }

    if metadata.file_type().is_file() {
        debug!(output = %output.display(), size = volume.size, "truncating restored file");
        dev.set_len(volume.size).await?;
    }
    dev.flush().await?;
    Ok(())
}

/// Restore onto a device that currently holds exactly the contents of
/// `last_backup_name`, writing only blocks that differ and zero-filling
/// blocks the target backup no longer covers.
pub async fn restore_backup_incrementally(
    backup_url: &str,
    output: &Path,
    last_backup_name: &str,
) -> Result<()> {
    let driver = driver::resolve(backup_url).await?;
    let (backup_name, volume_name, _) = store::decode_backup_url(backup_url)?;
    let backup_name = backup_name
        .ok_or_else(|| Error::InvalidUrl(format!("missing backup parameter in {backup_url}")))?;

    if !store::valid_name(last_backup_name) {
        return Err(Error::InvalidName(last_backup_name.to_string()));
    }

    let volume = Volume::load(driver.as_ref(), &volume_name).await?;
    check_volume_size(volume.size)?;

    let mut dev = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(output)
        .await?;
    let metadata = dev.metadata().await?;

    let last = Backup::load(driver.as_ref(), last_backup_name, &volume_name).await?;
    let backup = Backup::load(driver.as_ref(), &backup_name, &volume_name).await?;

    info!(
        from = %last.name,
        to = %backup.name,
        volume = %volume_name,
        output = %output.display(),
        "incrementally restoring backup"
    );

    let zero = vec![0u8; DEFAULT_BLOCK_SIZE as usize];
    let (mut b, mut l) = (0, 0);
    while b < backup.blocks.len() || l < last.blocks.len() {
        if b >= backup.blocks.len() {
            fill_zero_block(&mut dev, last.blocks[l].offset, &zero).await?;
            l += 1;
            continue;
        }
        if l >= last.blocks.len() {
            restore_block(driver.as_ref(), &volume_name, &mut dev, &backup.blocks[b]).await?;
            b += 1;
            continue;
        }

        let new_block = &backup.blocks[b];
        let old_block = &last.blocks[l];
        if new_block.offset == old_block.offset {
            if new_block.checksum != old_block.checksum {
                restore_block(driver.as_ref(), &volume_name, &mut dev, new_block).await?;
            }
            b += 1;
            l += 1;
        } else if new_block.offset < old_block.offset {
            restore_block(driver.as_ref(), &volume_name, &mut dev, new_block).await?;
            b += 1;
        } else {
            fill_zero_block(&mut dev, old_block.offset, &zero).await?;
            l += 1;
        }
    }

    if metadata.file_type().is_file() {
        debug!(output = %output.display(), size = volume.size, "truncating restored file");
        dev.set_len(volume.size).await?;
    }
    dev.flush().await?;
    Ok(())
}

/// Fetch a block, verify it against its checksum and write it at its
/// offset. A block missing from the store fails the restore; it is never
/// silently treated as zero.
async fn restore_block(
    driver: &dyn Backend,
    volume: &str,
    dev: &mut File,
    block: &BlockMapping,
) -> Result<()> {
    let path = store::block_file_path(volume, &block.checksum);
    let compressed = driver.read(&path).await?;
    let payload = codec::decompress_and_verify(&compressed, &block.checksum)?;
    dev.seek(SeekFrom::Start(block.offset)).await?;
    dev.write_all(&payload).await?;
    Ok(())
}

async fn fill_zero_block(dev: &mut File, offset: u64, zero: &[u8]) -> Result<()> {
    dev.seek(SeekFrom::Start(offset)).await?;
    dev.write_all(zero).await?;
    Ok(())
}

fn check_volume_size(size: u64) -> Result<()> {
    if size == 0 || size % DEFAULT_BLOCK_SIZE != 0 {
        return Err(Error::InvalidVolumeSize(size));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_volume_size() {
        assert!(check_volume_size(0).is_err());
        assert!(check_volume_size(DEFAULT_BLOCK_SIZE - 1).is_err());
        assert!(check_volume_size(DEFAULT_BLOCK_SIZE).is_ok());
        assert!(check_volume_size(4 * DEFAULT_BLOCK_SIZE).is_ok());
    }
}
