pub mod local;
pub mod memory;
pub mod retry;
pub mod s3;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use s3::S3Backend;

use blockvault_core::driver::{self, Backend};
use blockvault_core::{Error, Result};
use futures::FutureExt;
use std::sync::Arc;
use url::Url;

/// Register the built-in drivers with the core registry:
///
/// - `file:///path/to/store` — local filesystem
/// - `s3://bucket/prefix` — Amazon S3 or compatible
/// - `memory://name` — process-local, for tests
///
/// Safe to call more than once.
pub fn register_builtin_drivers() {
    driver::register_driver(
        "file",
        Arc::new(|url: Url| async move { local_from_url(&url) }.boxed()),
    );
    driver::register_driver(
        "s3",
        Arc::new(|url: Url| async move { s3_from_url(&url).await }.boxed()),
    );
    driver::register_driver(
        "memory",
        Arc::new(|url: Url| async move { memory_from_url(&url) }.boxed()),
    );
}

fn local_from_url(url: &Url) -> Result<Arc<dyn Backend>> {
    let path = url.path();
    if path.is_empty() || path == "/" {
        return Err(Error::InvalidUrl(format!("file URL has no path: {url}")));
    }
    Ok(Arc::new(LocalBackend::new(path)))
}

async fn s3_from_url(url: &Url) -> Result<Arc<dyn Backend>> {
    let bucket = url
        .host_str()
        .ok_or_else(|| Error::InvalidUrl(format!("s3 URL is missing a bucket: {url}")))?;
    let prefix = url.path().trim_matches('/').to_string();
    let backend = S3Backend::new(bucket.to_string(), prefix).await?;
    Ok(Arc::new(backend))
}

fn memory_from_url(url: &Url) -> Result<Arc<dyn Backend>> {
    let name = url
        .host_str()
        .ok_or_else(|| Error::InvalidUrl(format!("memory URL is missing a store name: {url}")))?;
    Ok(Arc::new(MemoryBackend::shared(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_resolve_memory_scheme() {
        register_builtin_drivers();
        let backend = driver::resolve("memory://resolve-test").await.unwrap();
        backend
            .write("some/path", Bytes::from_static(b"data"))
            .await
            .unwrap();

        // Resolving the same URL again sees the same objects.
        let again = driver::resolve("memory://resolve-test?backup=b&volume=v")
            .await
            .unwrap();
        assert_eq!(again.file_size("some/path").await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_resolve_file_scheme() {
        register_builtin_drivers();
        let dir = tempfile::tempdir().unwrap();
        let url = format!("file://{}", dir.path().display());
        let backend = driver::resolve(&url).await.unwrap();
        backend
            .write("a/b/c.cfg", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        assert_eq!(backend.file_size("a/b/c.cfg").await.unwrap(), Some(2));
    }
}
