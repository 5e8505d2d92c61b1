use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;

use crate::config::StorageConfig;

/// A single object write.
#[derive(Debug, Clone)]
pub struct PutObject {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub cache_control: String,
    pub acl: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, object: PutObject) -> anyhow::Result<()>;
}

/// S3 (or S3-compatible) object store.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    /// Build a client from the default credential chain. A custom endpoint
    /// switches to path-style addressing for MinIO-style servers.
    pub async fn from_config(storage: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(storage.region.clone()));
        if let Some(endpoint) = &storage.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(storage.endpoint.is_some())
            .build();
        Self {
            client: aws_sdk_s3::Client::from_conf(config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, object: PutObject) -> anyhow::Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(object.bucket)
            .key(&object.key)
            .body(ByteStream::from(object.body))
            .content_type(object.content_type)
            .cache_control(object.cache_control);
        if let Some(acl) = object.acl.as_deref() {
            request = request.acl(ObjectCannedAcl::from(acl));
        }
        request
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(e)))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory store keyed by `bucket/key`. `fail_on` makes any key
    /// containing the substring fail.
    #[derive(Default)]
    pub struct MemoryStore {
        pub objects: Mutex<BTreeMap<String, PutObject>>,
        pub fail_on: Option<String>,
    }

    impl MemoryStore {
        pub fn keys(&self) -> Vec<String> {
            self.objects.lock().unwrap().keys().cloned().collect()
        }

        pub fn get(&self, key: &str) -> Option<PutObject> {
            self.objects.lock().unwrap().get(key).cloned()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn put_object(&self, object: PutObject) -> anyhow::Result<()> {
            if let Some(needle) = &self.fail_on
                && object.key.contains(needle.as_str())
            {
                anyhow::bail!("AccessDenied: {}", object.key);
            }
            self.objects
                .lock()
                .unwrap()
                .insert(format!("{}/{}", object.bucket, object.key), object);
            Ok(())
        }
    }
}
