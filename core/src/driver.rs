use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use url::Url;

/// Capability set every block store must provide.
///
/// Paths are `/`-separated strings relative to the destination root
/// (e.g. `volumes/ab/cd/vol1/blocks/ab/cd/abcd....blk`). Writes to the
/// same path are idempotent because block content is addressed by its
/// checksum.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn init(&self) -> Result<()>;

    async fn write(&self, path: &str, data: Bytes) -> Result<()>;

    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Size of the object at `path`, or `None` if it does not exist.
    async fn file_size(&self, path: &str) -> Result<Option<u64>>;

    /// Remove the given objects. Missing objects are not an error.
    async fn remove(&self, paths: &[String]) -> Result<()>;

    /// Recursively list the paths of all objects under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Builds a driver for a destination URL stripped of its query.
pub type DriverFactory =
    Arc<dyn Fn(Url) -> BoxFuture<'static, Result<Arc<dyn Backend>>> + Send + Sync>;

static DRIVERS: Lazy<RwLock<HashMap<String, DriverFactory>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a driver factory for a URL scheme. Registering the same
/// scheme again replaces the earlier factory.
pub fn register_driver(scheme: &str, factory: DriverFactory) {
    DRIVERS
        .write()
        .expect("driver registry lock poisoned")
        .insert(scheme.to_string(), factory);
}

/// Resolve the store driver for a destination or backup URL by scheme.
pub async fn resolve(dest_url: &str) -> Result<Arc<dyn Backend>> {
    let mut url =
        Url::parse(dest_url).map_err(|e| Error::InvalidUrl(format!("{dest_url}: {e}")))?;
    // Backup URLs carry `?backup=...&volume=...`; the driver only cares
    // about the destination root.
    url.set_query(None);
    url.set_fragment(None);

    let factory = DRIVERS
        .read()
        .expect("driver registry lock poisoned")
        .get(url.scheme())
        .cloned()
        .ok_or_else(|| Error::UnsupportedScheme(url.scheme().to_string()))?;

    let driver = factory(url).await?;
    driver.init().await?;
    Ok(driver)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_rejects_unknown_scheme() {
        match resolve("nosuchscheme://somewhere/store").await {
            Err(Error::UnsupportedScheme(scheme)) => assert_eq!(scheme, "nosuchscheme"),
            other => panic!("expected unsupported scheme, got {:?}", other.is_ok()),
        }
    }

    #[tokio::test]
    async fn test_resolve_rejects_malformed_url() {
        assert!(matches!(
            resolve("not a url").await,
            Err(Error::InvalidUrl(_))
        ));
    }
}
