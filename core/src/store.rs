//! Layout of the destination store and backup URL handling.
//!
//! Everything a volume owns lives under a deterministic per-volume prefix:
//!
//! ```text
//! volumes/<h[0:2]>/<h[2:4]>/<volume>/volume.cfg
//! volumes/<h[0:2]>/<h[2:4]>/<volume>/backups/backup_<name>.cfg
//! volumes/<h[0:2]>/<h[2:4]>/<volume>/blocks/<cc[0:2]>/<cc[2:4]>/<cc>.blk
//! ```
//!
//! `h` is the hex SHA-256 of the volume name and `cc` the hex checksum of
//! a block's plaintext. The two-level fanout bounds directory size on
//! backends that dislike large flat directories.

use crate::types::BlockChecksum;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

pub const VOLUME_DIRECTORY: &str = "volumes";
pub const BACKUP_DIRECTORY: &str = "backups";
pub const BLOCKS_DIRECTORY: &str = "blocks";

const VOLUME_CFG_FILE: &str = "volume.cfg";
const BACKUP_CFG_PREFIX: &str = "backup_";
const CFG_SUFFIX: &str = ".cfg";
const BLOCK_SUFFIX: &str = ".blk";

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("invalid name pattern"));

/// Whether `name` is acceptable as a volume, backup, or snapshot name.
pub fn valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

/// Generate a fresh object name like `backup-9f86d081884c7d65`.
pub fn generate_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &id[..16])
}

/// Per-volume prefix with two-level fanout over the volume name hash.
pub fn volume_path(volume: &str) -> String {
    let digest = hex::encode(Sha256::digest(volume.as_bytes()));
    format!(
        "{VOLUME_DIRECTORY}/{}/{}/{volume}",
        &digest[0..2],
        &digest[2..4]
    )
}

pub fn volume_cfg_path(volume: &str) -> String {
    format!("{}/{VOLUME_CFG_FILE}", volume_path(volume))
}

pub fn backups_prefix(volume: &str) -> String {
    format!("{}/{BACKUP_DIRECTORY}", volume_path(volume))
}

pub fn backup_cfg_path(backup: &str, volume: &str) -> String {
    format!(
        "{}/{BACKUP_CFG_PREFIX}{backup}{CFG_SUFFIX}",
        backups_prefix(volume)
    )
}

pub fn blocks_prefix(volume: &str) -> String {
    format!("{}/{BLOCKS_DIRECTORY}", volume_path(volume))
}

/// Canonical path of a block file; a pure function of volume and checksum,
/// so identical content collapses to one object.
pub fn block_file_path(volume: &str, checksum: &BlockChecksum) -> String {
    let cc = checksum.to_hex();
    format!(
        "{}/{}/{}/{cc}{BLOCK_SUFFIX}",
        blocks_prefix(volume),
        &cc[0..2],
        &cc[2..4]
    )
}

/// Extract the backup name from a manifest file name like
/// `backup_<name>.cfg`.
pub fn backup_name_from_cfg(file_name: &str) -> Option<&str> {
    file_name
        .strip_prefix(BACKUP_CFG_PREFIX)?
        .strip_suffix(CFG_SUFFIX)
}

/// Encode (backup, volume, destination root) into a backup URL.
pub fn encode_backup_url(backup: &str, volume: &str, dest_url: &str) -> String {
    format!("{dest_url}?backup={backup}&volume={volume}")
}

/// Encode (volume, destination root) into a volume URL.
pub fn encode_volume_url(volume: &str, dest_url: &str) -> String {
    format!("{dest_url}?volume={volume}")
}

/// Split a backup or volume URL into (backup name, volume name,
/// destination root). The `backup` parameter is optional so volume URLs
/// decode too; callers that need a backup name reject `None` themselves.
pub fn decode_backup_url(backup_url: &str) -> Result<(Option<String>, String, String)> {
    let mut url =
        Url::parse(backup_url).map_err(|e| Error::InvalidUrl(format!("{backup_url}: {e}")))?;

    let mut backup = None;
    let mut volume = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "backup" => backup = Some(value.into_owned()),
            "volume" => volume = Some(value.into_owned()),
            _ => {}
        }
    }

    let volume = volume
        .ok_or_else(|| Error::InvalidUrl(format!("missing volume parameter in {backup_url}")))?;
    if !valid_name(&volume) {
        return Err(Error::InvalidName(volume));
    }
    if let Some(ref backup) = backup {
        if !valid_name(backup) {
            return Err(Error::InvalidName(backup.clone()));
        }
    }

    url.set_query(None);
    url.set_fragment(None);
    Ok((backup, volume, url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_url_roundtrip() {
        let url = encode_backup_url("backup-1a2b3c", "vol1", "file:///var/store");
        let (backup, volume, dest) = decode_backup_url(&url).unwrap();
        assert_eq!(backup.as_deref(), Some("backup-1a2b3c"));
        assert_eq!(volume, "vol1");
        assert_eq!(dest, "file:///var/store");
    }

    #[test]
    fn test_volume_url_decodes_without_backup() {
        let url = encode_volume_url("vol1", "memory://store");
        let (backup, volume, dest) = decode_backup_url(&url).unwrap();
        assert_eq!(backup, None);
        assert_eq!(volume, "vol1");
        assert_eq!(dest, "memory://store");
    }

    #[test]
    fn test_decode_requires_volume() {
        let err = decode_backup_url("file:///var/store?backup=b1").unwrap_err();
        assert!(err.to_string().contains("missing volume parameter"));
    }

    #[test]
    fn test_decode_rejects_bad_names() {
        assert!(decode_backup_url("file:///s?volume=..%2Fescape").is_err());
        assert!(decode_backup_url("file:///s?backup=a%20b&volume=vol1").is_err());
    }

    #[test]
    fn test_block_path_fanout() {
        let checksum = BlockChecksum::from_data(b"payload");
        let cc = checksum.to_hex();
        let path = block_file_path("vol1", &checksum);
        assert!(path.starts_with(&format!("{}/", blocks_prefix("vol1"))));
        assert!(path.ends_with(&format!("{}/{}/{cc}.blk", &cc[0..2], &cc[2..4])));
    }

    #[test]
    fn test_volume_path_is_stable() {
        assert_eq!(volume_path("vol1"), volume_path("vol1"));
        assert_ne!(volume_path("vol1"), volume_path("vol2"));
        assert!(volume_path("vol1").starts_with("volumes/"));
        assert!(volume_path("vol1").ends_with("/vol1"));
    }

    #[test]
    fn test_backup_name_from_cfg() {
        assert_eq!(
            backup_name_from_cfg("backup_backup-1a2b3c.cfg"),
            Some("backup-1a2b3c")
        );
        assert_eq!(backup_name_from_cfg("volume.cfg"), None);
        assert_eq!(backup_name_from_cfg("backup_x.blk"), None);
    }

    #[test]
    fn test_name_validation() {
        assert!(valid_name("vol1"));
        assert!(valid_name("backup-1a2b3c"));
        assert!(valid_name("a.b_c-d"));
        assert!(!valid_name(""));
        assert!(!valid_name("-leading-dash"));
        assert!(!valid_name("has space"));
        assert!(!valid_name("has/slash"));
    }

    #[test]
    fn test_generated_names_validate() {
        let name = generate_name("backup");
        assert!(name.starts_with("backup-"));
        assert!(valid_name(&name));
        assert_ne!(generate_name("backup"), generate_name("backup"));
    }
}
