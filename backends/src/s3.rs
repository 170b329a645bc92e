use crate::retry::{retry_with_backoff, RetryConfig};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use blockvault_core::driver::Backend;
use blockvault_core::{Error, Result};
use bytes::Bytes;

/// S3 batch delete accepts at most this many keys per request.
const DELETE_BATCH_SIZE: usize = 1000;

pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: String,
    retry_config: RetryConfig,
}

impl S3Backend {
    pub async fn new(bucket: String, prefix: String) -> Result<Self> {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let client = Client::new(&config);

        Ok(Self {
            client,
            bucket,
            prefix,
            retry_config: RetryConfig::default(),
        })
    }

    pub async fn with_endpoint(bucket: String, prefix: String, endpoint: String) -> Result<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .load()
            .await;
        let client = Client::new(&config);

        Ok(Self {
            client,
            bucket,
            prefix,
            retry_config: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    fn full_key(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }

    fn strip_prefix(&self, key: String) -> String {
        if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(&format!("{}/", self.prefix))
                .map(str::to_string)
                .unwrap_or(key)
        }
    }
}

#[async_trait]
impl Backend for S3Backend {
    async fn init(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Bucket {} not accessible: {}", self.bucket, e)))?;
        Ok(())
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = self.full_key(path);
        let path_copy = path.to_string();

        retry_with_backoff(&self.retry_config, "s3_write", || {
            let body = ByteStream::from(data.clone());
            let client = client.clone();
            let bucket = bucket.clone();
            let key = key.clone();
            let path_copy = path_copy.clone();
            async move {
                client
                    .put_object()
                    .bucket(&bucket)
                    .key(&key)
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| Error::Backend(format!("Failed to write {}: {}", path_copy, e)))?;
                Ok(())
            }
        })
        .await
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = self.full_key(path);
        let path_copy = path.to_string();

        retry_with_backoff(&self.retry_config, "s3_read", || {
            let client = client.clone();
            let bucket = bucket.clone();
            let key = key.clone();
            let path_copy = path_copy.clone();
            async move {
                let response = client
                    .get_object()
                    .bucket(&bucket)
                    .key(&key)
                    .send()
                    .await
                    .map_err(|e| Error::Backend(format!("Failed to read {}: {}", path_copy, e)))?;

                let data = response
                    .body
                    .collect()
                    .await
                    .map_err(|e| Error::Backend(format!("Failed to read body: {}", e)))?;

                Ok(data.into_bytes())
            }
        })
        .await
    }

    async fn file_size(&self, path: &str) -> Result<Option<u64>> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .send()
            .await;

        match result {
            Ok(response) => Ok(Some(response.content_length.unwrap_or(0) as u64)),
            Err(e) => {
                if e.to_string().contains("NotFound") {
                    Ok(None)
                } else {
                    Err(Error::Backend(format!("Failed to stat {}: {}", path, e)))
                }
            }
        }
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        for chunk in paths.chunks(DELETE_BATCH_SIZE) {
            let mut objects = Vec::with_capacity(chunk.len());
            for path in chunk {
                let object = ObjectIdentifier::builder()
                    .key(self.full_key(path))
                    .build()
                    .map_err(|e| Error::Backend(format!("Invalid delete key {}: {}", path, e)))?;
                objects.push(object);
            }
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .build()
                .map_err(|e| Error::Backend(format!("Failed to build delete request: {}", e)))?;

            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| Error::Backend(format!("Failed to delete objects: {}", e)))?;
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full_prefix = format!("{}/", self.full_key(prefix).trim_end_matches('/'));
        let mut results = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::Backend(format!("Failed to list: {}", e)))?;

            if let Some(contents) = response.contents {
                for object in contents {
                    if let Some(key) = object.key {
                        results.push(self.strip_prefix(key));
                    }
                }
            }

            if response.is_truncated.unwrap_or(false) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(results)
    }
}
