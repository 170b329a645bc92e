use async_trait::async_trait;
use blockvault_core::driver::Backend;
use blockvault_core::{Error, Result};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Block store driver over a local filesystem directory.
pub struct LocalBackend {
    base_path: PathBuf,
}

impl LocalBackend {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    /// Best-effort removal of directories left empty by a deleted file,
    /// walking up until the store root or a non-empty directory.
    async fn prune_empty_dirs(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.base_path || fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let full_path = self.full_path(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full_path, &data)
            .await
            .map_err(|e| Error::Backend(format!("Failed to write {}: {}", path, e)))?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let data = fs::read(self.full_path(path))
            .await
            .map_err(|e| Error::Backend(format!("Failed to read {}: {}", path, e)))?;
        Ok(Bytes::from(data))
    }

    async fn file_size(&self, path: &str) -> Result<Option<u64>> {
        match fs::metadata(self.full_path(path)).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Backend(format!("Failed to stat {}: {}", path, e))),
        }
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        for path in paths {
            let full_path = self.full_path(path);
            match fs::remove_file(&full_path).await {
                Ok(()) => self.prune_empty_dirs(&full_path).await,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::Backend(format!("Failed to delete {}: {}", path, e)))
                }
            }
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.full_path(prefix);
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        let mut pending = vec![(root, prefix.to_string())];
        while let Some((dir, rel)) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = match entry.file_name().to_str() {
                    Some(name) => name.to_string(),
                    None => continue,
                };
                let child_rel = format!("{rel}/{name}");
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push((entry.path(), child_rel));
                } else {
                    results.push(child_rel);
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.init().await.unwrap();

        backend
            .write("a/b/c.blk", Bytes::from_static(b"payload"))
            .await
            .unwrap();
        assert_eq!(&backend.read("a/b/c.blk").await.unwrap()[..], b"payload");
        assert_eq!(backend.file_size("a/b/c.blk").await.unwrap(), Some(7));
        assert_eq!(backend.file_size("a/b/missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.init().await.unwrap();

        backend.write("v/x/1.blk", Bytes::new()).await.unwrap();
        backend.write("v/x/y/2.blk", Bytes::new()).await.unwrap();
        backend.write("other/3.blk", Bytes::new()).await.unwrap();

        let mut listed = backend.list("v").await.unwrap();
        listed.sort();
        assert_eq!(listed, vec!["v/x/1.blk", "v/x/y/2.blk"]);
        assert!(backend.list("does/not/exist").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_tolerates_missing_and_prunes_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.init().await.unwrap();

        backend.write("v/x/1.blk", Bytes::new()).await.unwrap();
        backend
            .remove(&["v/x/1.blk".to_string(), "v/x/ghost.blk".to_string()])
            .await
            .unwrap();

        assert_eq!(backend.file_size("v/x/1.blk").await.unwrap(), None);
        // The emptied fanout directories are gone as well.
        assert!(!dir.path().join("v").exists());
    }
}
