use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::{primitives::ByteStream as AwsByteStream, Client};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use relay_core::RelayConfigSnapshot;
use tokio_util::io::ReaderStream;

use crate::{
    collect_stream, normalize_path, BlobError, BlobInfo, BlobMetadata, BlobRepository,
    BlobResult, BlobUpload, OpenedBlob,
};

/// Connection settings for an S3-compatible backend
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl S3Config {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }

    /// Read `storage.*` keys.
    pub fn from_snapshot(config: &RelayConfigSnapshot) -> Self {
        Self {
            bucket: config.get_string_or("storage.bucket", "cloud-relay"),
            region: config.get_string_or("storage.region", "us-east-1"),
            endpoint_url: config.get_string("storage.endpoint_url"),
            access_key_id: config.get_string("storage.access_key_id"),
            secret_access_key: config.get_string("storage.secret_access_key"),
        }
    }
}

/// Blob repository over an S3-compatible object store.
///
/// Paths map one-to-one onto object keys inside the configured bucket.
#[derive(Clone)]
pub struct S3BlobRepository {
    client: Client,
    bucket: String,
}

impl S3BlobRepository {
    pub async fn connect(config: S3Config) -> Self {
        let bucket = config.bucket.clone();
        let client = Self::create_client(config).await;
        Self { client, bucket }
    }

    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    async fn create_client(config: S3Config) -> Client {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (config.access_key_id, config.secret_access_key)
        {
            let credentials =
                Credentials::new(access_key_id, secret_access_key, None, None, "relay-config");
            loader = loader.credentials_provider(credentials);
        }

        let has_custom_endpoint = config.endpoint_url.is_some();
        if let Some(endpoint_url) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }

        let aws_config = loader.load().await;

        Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(has_custom_endpoint)
                .build(),
        )
    }

    fn key(path: &str) -> BlobResult<&str> {
        let key = normalize_path(path);
        if key.is_empty() {
            return Err(BlobError::invalid_argument("blob path must not be empty"));
        }
        Ok(key)
    }

    fn to_chrono(dt: Option<&aws_sdk_s3::primitives::DateTime>) -> DateTime<Utc> {
        dt.and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
            .unwrap_or_else(Utc::now)
    }

    fn encode_metadata(metadata: &BlobMetadata) -> HashMap<String, String> {
        metadata
            .iter()
            .map(|(key, value)| (key.to_ascii_lowercase(), STANDARD.encode(value)))
            .collect()
    }

    fn decode_metadata(metadata: Option<&HashMap<String, String>>) -> BlobMetadata {
        let mut decoded = BlobMetadata::default();
        for (key, value) in metadata.into_iter().flatten() {
            let value = STANDARD
                .decode(value)
                .ok()
                .and_then(|raw| String::from_utf8(raw).ok())
                .unwrap_or_else(|| value.clone());

            // S3 lowercases user metadata keys
            if key.eq_ignore_ascii_case(crate::ORIGINAL_FILE_NAME_KEY) {
                decoded.insert(crate::ORIGINAL_FILE_NAME_KEY, value);
            } else {
                decoded.insert(key.clone(), value);
            }
        }
        decoded
    }

    fn info_from_head(
        key: &str,
        head: &aws_sdk_s3::operation::head_object::HeadObjectOutput,
    ) -> BlobInfo {
        BlobInfo {
            path: key.to_string(),
            content_type: head.content_type().map(str::to_string),
            metadata: Self::decode_metadata(head.metadata()),
            last_modified: Self::to_chrono(head.last_modified()),
            length: head.content_length().unwrap_or(0).max(0) as u64,
            checksum: head.e_tag().map(|tag| tag.trim_matches('"').to_string()),
        }
    }

    fn is_precondition_failure(code: Option<&str>) -> bool {
        matches!(code, Some("PreconditionFailed" | "ConditionalRequestConflict"))
    }
}

#[async_trait]
impl BlobRepository for S3BlobRepository {
    async fn get_info(&self, path: &str) -> BlobResult<Option<BlobInfo>> {
        let key = Self::key(path)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => Ok(Some(Self::info_from_head(key, &head))),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(None),
            Err(err) => Err(BlobError::backend(err)),
        }
    }

    async fn list(&self, prefix: &str) -> BlobResult<Vec<BlobInfo>> {
        let prefix = normalize_path(prefix);
        if prefix.is_empty() {
            return Err(BlobError::invalid_argument("list prefix must not be empty"));
        }

        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut blobs = Vec::new();
        while let Some(page) = pages.next().await {
            let page = match page {
                Ok(page) => page,
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(|e| e.is_no_such_bucket()) =>
                {
                    return Ok(Vec::new());
                }
                Err(err) => return Err(BlobError::backend(err)),
            };

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                blobs.push(BlobInfo {
                    path: key.to_string(),
                    content_type: None,
                    metadata: BlobMetadata::default(),
                    last_modified: Self::to_chrono(object.last_modified()),
                    length: object.size().unwrap_or(0).max(0) as u64,
                    checksum: object.e_tag().map(|tag| tag.trim_matches('"').to_string()),
                });
            }
        }

        Ok(blobs)
    }

    async fn open(&self, path: &str) -> BlobResult<OpenedBlob> {
        let key = Self::key(path)?;
        let info = self
            .get_info(key)
            .await?
            .ok_or_else(|| BlobError::not_found(key))?;

        let object = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(object) => object,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Err(BlobError::not_found(key));
            }
            Err(err) => return Err(BlobError::backend(err)),
        };

        let stream = ReaderStream::new(object.body.into_async_read());

        Ok(OpenedBlob {
            info,
            stream: Box::pin(stream),
        })
    }

    async fn write(&self, path: &str, upload: BlobUpload, overwrite: bool) -> BlobResult<()> {
        let key = Self::key(path)?;
        let data = collect_stream(upload.stream).await?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(AwsByteStream::from(data))
            .set_metadata(Some(Self::encode_metadata(&upload.metadata)));

        if let Some(content_type) = upload.content_type {
            request = request.content_type(content_type);
        }
        if !overwrite {
            request = request.if_none_match("*");
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err)
                if Self::is_precondition_failure(
                    err.as_service_error().and_then(ProvideErrorMetadata::code),
                ) =>
            {
                Err(BlobError::conflict(key))
            }
            Err(err) => Err(BlobError::backend(err)),
        }
    }

    async fn delete(&self, path: &str) -> BlobResult<bool> {
        let key = Self::key(path)?;
        if self.get_info(key).await?.is_none() {
            return Ok(false);
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(BlobError::backend)?;
        Ok(true)
    }

    async fn delegated_read_url(&self, path: &str, ttl: Duration) -> BlobResult<String> {
        let key = Self::key(path)?;
        if self.get_info(key).await?.is_none() {
            return Err(BlobError::not_found(key));
        }

        let presigning = PresigningConfig::expires_in(ttl).map_err(BlobError::backend)?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(BlobError::backend)?;

        Ok(request.uri().to_string())
    }
}
