//! 🪣📡 S3 object store — the real cloud, with real credentials and real 403s.
//!
//! COLD OPEN — EXT. us-east-1 — 3:47 AM
//!
//! A bucket full of `.log` files. A spooler with a cursor. Somewhere between them,
//! the AWS SDK, resolving credentials from five different places and picking one.
//!
//! 🧠 Knowledge graph:
//! - Client built from `aws_config::defaults(...)`: env vars → ~/.aws → IAM role → hope.
//! - Custom `endpoint` (LocalStack, MinIO, fakes3) flips on path-style addressing.
//! - `list` → `ListObjectsV2` with `start_after` + `max_keys`.
//! - `get` → `GetObject` with `Range: bytes=N-` when resuming mid-object.
//! - `copy` → `CopyObject` (server side, bytes never touch us). `delete` → `DeleteObject`.
//! - `bucket_exists` → `HeadBucket`; a 404 is `false`, anything else is an error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use chrono::DateTime;
use serde::Deserialize;
use tracing::{debug, trace};

use super::{ListPage, ObjectBody, ObjectStore};
use crate::location::ObjectHandle;

/// 🔧 Connection knobs. Everything optional falls back to the SDK's own resolution chain.
#[derive(Debug, Clone, Deserialize)]
pub struct S3ObjectStoreConfig {
    /// 🌎 Defaults to us-east-1. The Florida of AWS regions.
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// 🔗 Override endpoint, e.g. `http://localhost:4566`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    /// 🛣️ Forced on whenever `endpoint` is set.
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

/// 🪣 Thin async wrapper around `aws_sdk_s3::Client`. Cheap to clone.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    config: S3ObjectStoreConfig,
}

// 🐛 Debug skips the client: it is big, it is opaque, and it may know your secrets.
impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("region", &self.config.region)
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}

impl S3ObjectStore {
    /// 🚀 Resolve credentials and build the client. Does not touch the network yet.
    pub async fn connect(config: S3ObjectStoreConfig) -> Result<Self> {
        let mut the_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let Some(the_endpoint) = &config.endpoint {
            the_loader = the_loader.endpoint_url(the_endpoint);
        }

        if let (Some(the_access_key), Some(the_secret)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let the_credentials = aws_sdk_s3::config::Credentials::new(
                the_access_key,
                the_secret,
                None,
                None,
                "spx",
            );
            the_loader = the_loader.credentials_provider(the_credentials);
        }

        if let Some(the_profile) = &config.profile {
            the_loader = the_loader.profile_name(the_profile);
        }

        let the_aws_config = the_loader.load().await;
        let the_path_style = config.force_path_style || config.endpoint.is_some();
        let the_s3_config = aws_sdk_s3::config::Builder::from(&the_aws_config)
            .force_path_style(the_path_style)
            .build();

        debug!(
            "🔧 S3 client ready for region '{}' (endpoint: {:?}, path style: {})",
            config.region, config.endpoint, the_path_style
        );

        Ok(Self {
            client: Client::from_conf(the_s3_config),
            config,
        })
    }
}

/// 🔗 `CopyObject` wants `bucket/key` URL-encoded. Each path segment is encoded, the `/` between them stays.
fn encode_copy_source(bucket: &str, key: &str) -> String {
    let the_key = key
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/");
    format!("{bucket}/{the_key}")
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage> {
        let the_max_keys = i32::try_from(max_keys.clamp(1, 1000)).unwrap_or(1000);
        let mut the_page = ListPage::default();
        let mut the_continuation: Option<String> = None;

        // -- 🔄 a page of nothing but common prefixes is still "truncated"; keep going until
        // -- there is at least one object to hand back or the listing is over
        loop {
            let mut the_request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .max_keys(the_max_keys);
            if !prefix.is_empty() {
                the_request = the_request.prefix(prefix);
            }
            if let Some(the_delimiter) = delimiter.filter(|d| !d.is_empty()) {
                the_request = the_request.delimiter(the_delimiter);
            }
            the_request = match (&the_continuation, start_after) {
                (Some(the_token), _) => the_request.continuation_token(the_token),
                (None, Some(the_after)) => the_request.start_after(the_after),
                (None, None) => the_request,
            };

            let the_response = the_request.send().await.with_context(|| {
                format!(
                    "💀 ListObjectsV2 failed for s3://{bucket}/{prefix}. \
                     Check: bucket name, region, credentials, and whether the endpoint is awake."
                )
            })?;

            for the_object in the_response.contents() {
                let Some(the_key) = the_object.key() else {
                    continue;
                };
                let the_last_modified = the_object
                    .last_modified()
                    .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()));
                the_page.objects.push(ObjectHandle {
                    key: the_key.to_string(),
                    size: the_object.size().unwrap_or(0).max(0) as u64,
                    last_modified: the_last_modified,
                });
            }
            the_page.truncated = the_response.is_truncated().unwrap_or(false);
            the_continuation = the_response.next_continuation_token().map(str::to_string);

            if !the_page.objects.is_empty() || !the_page.truncated || the_continuation.is_none() {
                break;
            }
            trace!("🪣 s3 page under s3://{bucket}/{prefix} held only sub-folders; continuing");
        }

        if the_page.objects.is_empty() {
            the_page.truncated = false;
        }
        trace!(
            "🪣 s3 list of s3://{bucket}/{prefix} returned {} keys (truncated: {})",
            the_page.objects.len(),
            the_page.truncated
        );
        Ok(the_page)
    }

    async fn get(&self, bucket: &str, key: &str, range_start: u64) -> Result<ObjectBody> {
        let the_range = (range_start > 0).then(|| format!("bytes={range_start}-"));
        let the_response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_range(the_range)
            .send()
            .await
            .with_context(|| {
                format!("💀 GetObject failed for s3://{bucket}/{key} from byte {range_start}")
            })?;
        Ok(Box::new(the_response.body.into_async_read()))
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        self.client
            .copy_object()
            .copy_source(encode_copy_source(src_bucket, src_key))
            .bucket(dst_bucket)
            .key(dst_key)
            .send()
            .await
            .with_context(|| {
                format!(
                    "💀 CopyObject s3://{src_bucket}/{src_key} → s3://{dst_bucket}/{dst_key} failed. \
                     The source is untouched."
                )
            })?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("💀 DeleteObject failed for s3://{bucket}/{key}"))?;
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(the_error) => {
                let the_not_found = the_error
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false);
                if the_not_found {
                    Ok(false)
                } else {
                    Err(the_error)
                        .with_context(|| format!("💀 HeadBucket failed for '{bucket}'"))
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        // -- 🗑️ the SDK client has no explicit shutdown; dropping the last clone frees the pool
        debug!("🔌 S3 client for region '{}' released", self.config.region);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_copy_sources_get_percent_encoded() {
        assert_eq!(
            encode_copy_source("mybucket", "NorthAmerica/USA/file 7.log"),
            "mybucket/NorthAmerica/USA/file%207.log"
        );
        assert_eq!(encode_copy_source("b", "plain-key_1.log"), "b/plain-key_1.log");
        assert_eq!(
            encode_copy_source("b", "logs/ünïcode+plus.log"),
            "b/logs/%C3%BCn%C3%AFcode%2Bplus.log"
        );
    }

    #[test]
    fn the_one_where_config_defaults_to_the_florida_of_aws() {
        let the_config: S3ObjectStoreConfig = serde_json::from_str(r#"{}"#)
            .expect("💀 an empty S3 config should still parse, defaults exist for a reason");
        assert_eq!(the_config.region, "us-east-1");
        assert!(the_config.endpoint.is_none());
        assert!(!the_config.force_path_style);
    }

    #[test]
    fn the_one_where_endpoint_and_credentials_deserialize() {
        let the_config: S3ObjectStoreConfig = serde_json::from_str(
            r#"{
                "region": "eu-west-1",
                "endpoint": "http://localhost:4566",
                "access_key_id": "foo",
                "secret_access_key": "bar"
            }"#,
        )
        .expect("💀 S3 config with endpoint should parse");
        assert_eq!(the_config.region, "eu-west-1");
        assert_eq!(the_config.endpoint.as_deref(), Some("http://localhost:4566"));
        assert_eq!(the_config.access_key_id.as_deref(), Some("foo"));
    }
}
