use async_trait::async_trait;
use blockvault_core::driver::Backend;
use blockvault_core::{Error, Result};
use bytes::Bytes;
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

type Objects = Arc<RwLock<BTreeMap<String, Bytes>>>;

static SHARED_STORES: Lazy<Mutex<HashMap<String, Objects>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Process-local block store keyed by path. Used by tests; registered
/// under the `memory://` scheme so the whole pipeline can run without
/// touching disk or network.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    objects: Objects,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Named store shared across the process: every call with the same
    /// name sees the same objects, so `memory://name` URLs resolve
    /// consistently between operations.
    pub fn shared(name: &str) -> Self {
        let mut stores = SHARED_STORES
            .lock()
            .expect("memory store registry poisoned");
        let objects = stores.entry(name.to_string()).or_default().clone();
        Self { objects }
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().expect("memory store poisoned").len()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        self.objects
            .write()
            .expect("memory store poisoned")
            .insert(path.to_string(), data);
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        self.objects
            .read()
            .expect("memory store poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Backend(format!("no such object: {path}")))
    }

    async fn file_size(&self, path: &str) -> Result<Option<u64>> {
        Ok(self
            .objects
            .read()
            .expect("memory store poisoned")
            .get(path)
            .map(|data| data.len() as u64))
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        let mut objects = self.objects.write().expect("memory store poisoned");
        for path in paths {
            objects.remove(path);
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir_prefix = format!("{}/", prefix.trim_end_matches('/'));
        Ok(self
            .objects
            .read()
            .expect("memory store poisoned")
            .keys()
            .filter(|key| key.starts_with(&dir_prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_object_lifecycle() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.file_size("a/b").await.unwrap(), None);

        backend.write("a/b", Bytes::from_static(b"xyz")).await.unwrap();
        assert_eq!(backend.file_size("a/b").await.unwrap(), Some(3));
        assert_eq!(&backend.read("a/b").await.unwrap()[..], b"xyz");
        assert_eq!(backend.object_count(), 1);

        backend.remove(&["a/b".to_string()]).await.unwrap();
        assert_eq!(backend.file_size("a/b").await.unwrap(), None);
        assert!(backend.read("a/b").await.is_err());
    }

    #[tokio::test]
    async fn test_list_respects_path_boundaries() {
        let backend = MemoryBackend::new();
        backend.write("vol/1", Bytes::new()).await.unwrap();
        backend.write("vol/sub/2", Bytes::new()).await.unwrap();
        backend.write("vol2/3", Bytes::new()).await.unwrap();

        let listed = backend.list("vol").await.unwrap();
        assert_eq!(listed, vec!["vol/1".to_string(), "vol/sub/2".to_string()]);
    }

    #[tokio::test]
    async fn test_shared_stores_by_name() {
        let a = MemoryBackend::shared("shared-test");
        let b = MemoryBackend::shared("shared-test");
        let c = MemoryBackend::shared("shared-test-other");

        a.write("k", Bytes::from_static(b"v")).await.unwrap();
        assert_eq!(b.file_size("k").await.unwrap(), Some(1));
        assert_eq!(c.file_size("k").await.unwrap(), None);
    }
}
