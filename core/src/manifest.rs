//! Volume records and backup manifests, persisted as JSON objects in the
//! destination store.
//!
//! A [`Volume`] record is read-modify-write and assumes one mutator per
//! volume at a time. A [`Backup`] manifest is written once and never
//! changed afterwards.

use crate::driver::{self, Backend};
use crate::store;
use crate::types::{BlockMapping, VolumeInfo, DEFAULT_BLOCK_SIZE};
use crate::{Error, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Per-volume metadata at the destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    /// Logical size in bytes; a nonzero multiple of the block size.
    pub size: u64,
    #[serde(default)]
    pub last_backup_name: Option<String>,
    #[serde(default)]
    pub last_backup_at: Option<DateTime<Utc>>,
    /// Count of distinct blocks across all live backups. Accounting only.
    #[serde(default)]
    pub block_count: i64,
}

/// One backup of a volume: the ordered block mappings needed to
/// reconstruct its source snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub name: String,
    pub volume_name: String,
    pub snapshot_name: String,
    pub snapshot_created_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub blocks: Vec<BlockMapping>,
    /// blocks.len() × block size.
    pub size: u64,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Volume {
    pub async fn exists(driver: &dyn Backend, name: &str) -> Result<bool> {
        Ok(driver
            .file_size(&store::volume_cfg_path(name))
            .await?
            .is_some())
    }

    pub async fn load(driver: &dyn Backend, name: &str) -> Result<Self> {
        let path = store::volume_cfg_path(name);
        if driver.file_size(&path).await?.is_none() {
            return Err(Error::VolumeNotFound {
                name: name.to_string(),
            });
        }
        let data = driver.read(&path).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub async fn save(&self, driver: &dyn Backend) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        driver
            .write(&store::volume_cfg_path(&self.name), Bytes::from(data))
            .await
    }

    /// Create the volume record at the destination unless it already
    /// exists.
    pub async fn ensure(driver: &dyn Backend, info: &VolumeInfo) -> Result<()> {
        if !store::valid_name(&info.name) {
            return Err(Error::InvalidName(info.name.clone()));
        }
        if info.size == 0 || info.size % DEFAULT_BLOCK_SIZE != 0 {
            return Err(Error::InvalidVolumeSize(info.size));
        }
        if Self::exists(driver, &info.name).await? {
            return Ok(());
        }
        debug!(volume = %info.name, size = info.size, "creating volume record");
        let volume = Volume {
            name: info.name.clone(),
            size: info.size,
            last_backup_name: None,
            last_backup_at: None,
            block_count: 0,
        };
        volume.save(driver).await
    }

    pub async fn remove(driver: &dyn Backend, name: &str) -> Result<()> {
        driver.remove(&[store::volume_cfg_path(name)]).await
    }
}

impl Backup {
    pub async fn load(driver: &dyn Backend, backup: &str, volume: &str) -> Result<Self> {
        let path = store::backup_cfg_path(backup, volume);
        if driver.file_size(&path).await?.is_none() {
            return Err(Error::BackupNotFound {
                name: backup.to_string(),
            });
        }
        let data = driver.read(&path).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub async fn save(&self, driver: &dyn Backend) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        driver
            .write(
                &store::backup_cfg_path(&self.name, &self.volume_name),
                Bytes::from(data),
            )
            .await
    }

    pub async fn remove(driver: &dyn Backend, backup: &str, volume: &str) -> Result<()> {
        driver
            .remove(&[store::backup_cfg_path(backup, volume)])
            .await
    }
}

/// Names of all backups currently stored for `volume`.
pub async fn backup_names_for_volume(driver: &dyn Backend, volume: &str) -> Result<Vec<String>> {
    let entries = driver.list(&store::backups_prefix(volume)).await?;
    Ok(entries
        .iter()
        .filter_map(|entry| {
            let file_name = entry.rsplit('/').next().unwrap_or(entry);
            store::backup_name_from_cfg(file_name).map(str::to_string)
        })
        .collect())
}

/// Load the manifest a backup URL points at.
pub async fn inspect_backup(backup_url: &str) -> Result<Backup> {
    let driver = driver::resolve(backup_url).await?;
    let (backup_name, volume_name, _) = store::decode_backup_url(backup_url)?;
    let backup_name = backup_name
        .ok_or_else(|| Error::InvalidUrl(format!("missing backup parameter in {backup_url}")))?;
    Backup::load(driver.as_ref(), &backup_name, &volume_name).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockChecksum;

    fn sample_backup() -> Backup {
        Backup {
            name: "backup-1a2b3c".to_string(),
            volume_name: "vol1".to_string(),
            snapshot_name: "snap1".to_string(),
            snapshot_created_at: Utc::now(),
            created_at: Utc::now(),
            blocks: vec![
                BlockMapping {
                    offset: 0,
                    checksum: BlockChecksum::from_data(b"a"),
                },
                BlockMapping {
                    offset: DEFAULT_BLOCK_SIZE,
                    checksum: BlockChecksum::from_data(b"b"),
                },
            ],
            size: 2 * DEFAULT_BLOCK_SIZE,
            labels: HashMap::from([("app".to_string(), "db".to_string())]),
        }
    }

    #[test]
    fn test_backup_serde_roundtrip() {
        let backup = sample_backup();
        let json = serde_json::to_vec_pretty(&backup).unwrap();
        let back: Backup = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.name, backup.name);
        assert_eq!(back.blocks, backup.blocks);
        assert_eq!(back.size, backup.size);
        assert_eq!(back.labels, backup.labels);
    }

    #[test]
    fn test_volume_serde_defaults() {
        // Records written before the first backup completed lack the
        // last-backup fields.
        let volume: Volume =
            serde_json::from_str(r#"{"name":"vol1","size":2097152}"#).unwrap();
        assert_eq!(volume.last_backup_name, None);
        assert_eq!(volume.last_backup_at, None);
        assert_eq!(volume.block_count, 0);
    }
}
