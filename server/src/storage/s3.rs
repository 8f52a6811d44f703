//! S3 Object Store
//!
//! Supports any S3-compatible backend: AWS S3, MinIO, Backblaze B2, Cloudflare R2.

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{
    Credentials, IdentityCache, SharedCredentialsProvider, StalledStreamProtectionConfig,
};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, MetadataDirective, ObjectIdentifier};
use aws_sdk_s3::Client;
use bytes::Bytes;
use lupa_common::disposition::content_disposition_for;
use lupa_common::Container;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{debug, info, warn};

use super::{directory_prefix, ensure_flat, Download, ObjectProperties, ObjectStore, StorageError};
use crate::config::{Config, ContainerNames};

/// `DeleteObjects` accepts at most this many keys per request.
const DELETE_BATCH_SIZE: usize = 1000;

/// Characters left unescaped in a `CopySource` key.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn transport<E: std::error::Error>(e: E) -> StorageError {
    StorageError::Transport(DisplayErrorContext(e).to_string())
}

/// S3-backed [`ObjectStore`].
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    containers: ContainerNames,
}

impl S3ObjectStore {
    /// Create a new S3 object store from configuration.
    ///
    /// Uses path-style addressing when a custom endpoint is configured.
    pub async fn new(config: &Config) -> Result<Self, StorageError> {
        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.s3_region.clone()))
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .identity_cache(IdentityCache::no_cache())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.s3_operation_timeout)
                    .build(),
            );

        if let (Ok(access_key), Ok(secret_key)) = (
            std::env::var("AWS_ACCESS_KEY_ID"),
            std::env::var("AWS_SECRET_ACCESS_KEY"),
        ) {
            let credentials = Credentials::new(access_key, secret_key, None, None, "environment");
            s3_config_builder =
                s3_config_builder.credentials_provider(SharedCredentialsProvider::new(credentials));
        } else {
            warn!("AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY not set, requests will be unsigned");
        }

        if let Some(endpoint) = &config.s3_endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO and most S3-compatible backends
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            containers = ?config.containers,
            endpoint = ?config.s3_endpoint,
            "S3 object store initialized"
        );

        Ok(Self {
            client,
            containers: config.containers.clone(),
        })
    }

    /// Check that every configured container is accessible.
    pub async fn health_check(&self) -> Result<(), StorageError> {
        for container in Container::ALL {
            let bucket = self.bucket(container);
            self.client
                .head_bucket()
                .bucket(bucket)
                .send()
                .await
                .map_err(|e| {
                    StorageError::Config(format!(
                        "Bucket {bucket} not accessible: {}",
                        DisplayErrorContext(e)
                    ))
                })?;
        }
        Ok(())
    }

    fn bucket(&self, container: Container) -> &str {
        self.containers.name(container)
    }

    async fn list_with_prefix(
        &self,
        container: Container,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(self.bucket(container))
                .set_prefix(prefix.map(str::to_string))
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(transport)?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn delete_batch(
        &self,
        container: Container,
        keys: &[String],
    ) -> Result<u64, StorageError> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build().map_err(transport))
            .collect::<Result<Vec<_>, _>>()?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(transport)?;

        let output = self
            .client
            .delete_objects()
            .bucket(self.bucket(container))
            .delete(delete)
            .send()
            .await
            .map_err(transport)?;

        if let Some(first) = output.errors().first() {
            return Err(StorageError::Transport(format!(
                "Failed to delete {} of {} objects, first: {} ({})",
                output.errors().len(),
                keys.len(),
                first.key().unwrap_or_default(),
                first.message().unwrap_or_default(),
            )));
        }

        Ok(keys.len() as u64)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(
        &self,
        container: Container,
        path: &str,
        file_name: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(self.bucket(container))
            .key(path)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .content_disposition(content_disposition_for(file_name))
            .send()
            .await
            .map_err(transport)?;

        debug!(%container, path, "Object uploaded");
        Ok(())
    }

    async fn download(&self, container: Container, path: &str) -> Result<Download, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(self.bucket(container))
            .key(path)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|err| err.is_no_such_key()) {
                    StorageError::NotFound {
                        container,
                        path: path.to_string(),
                    }
                } else {
                    transport(e)
                }
            })?;

        let content_type = output
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = output.body.collect().await.map_err(transport)?.into_bytes();

        Ok(Download {
            content_type,
            content_length: bytes.len() as u64,
            bytes,
        })
    }

    async fn delete(&self, container: Container, path: &str) -> Result<bool, StorageError> {
        // DeleteObject succeeds for absent keys, so probe first
        if !self.exists(container, path).await? {
            return Ok(false);
        }

        self.client
            .delete_object()
            .bucket(self.bucket(container))
            .key(path)
            .send()
            .await
            .map_err(transport)?;

        debug!(%container, path, "Object deleted");
        Ok(true)
    }

    async fn delete_all_by_prefix(
        &self,
        container: Container,
        prefix: &str,
    ) -> Result<u64, StorageError> {
        let prefix = directory_prefix(prefix);
        let keys = self.list_with_prefix(container, Some(&prefix)).await?;
        ensure_flat(container, &prefix, keys.iter().map(String::as_str))?;

        let mut removed = 0;
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            removed += self.delete_batch(container, batch).await?;
        }

        info!(%container, prefix, removed, "Deleted objects by prefix");
        Ok(removed)
    }

    async fn exists(&self, container: Container, path: &str) -> Result<bool, StorageError> {
        match self.properties(container, path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, container: Container) -> Result<Vec<String>, StorageError> {
        self.list_with_prefix(container, None).await
    }

    async fn properties(
        &self,
        container: Container,
        path: &str,
    ) -> Result<ObjectProperties, StorageError> {
        let output = self
            .client
            .head_object()
            .bucket(self.bucket(container))
            .key(path)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|err| err.is_not_found()) {
                    StorageError::NotFound {
                        container,
                        path: path.to_string(),
                    }
                } else {
                    transport(e)
                }
            })?;

        Ok(ObjectProperties {
            content_type: output.content_type().map(str::to_string),
            content_disposition: output.content_disposition().map(str::to_string),
            content_length: output.content_length().unwrap_or_default().max(0) as u64,
        })
    }

    async fn set_headers(
        &self,
        container: Container,
        path: &str,
        content_type: &str,
        content_disposition: &str,
    ) -> Result<(), StorageError> {
        let bucket = self.bucket(container);
        let copy_source = format!("{bucket}/{}", utf8_percent_encode(path, COPY_SOURCE));

        self.client
            .copy_object()
            .bucket(bucket)
            .key(path)
            .copy_source(copy_source)
            .metadata_directive(MetadataDirective::Replace)
            .content_type(content_type)
            .content_disposition(content_disposition)
            .send()
            .await
            .map_err(transport)?;

        Ok(())
    }
}
