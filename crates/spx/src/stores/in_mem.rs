//! # Previously, on spx...
//!
//! 🎬 The buckets were trapped in the cloud, and the CI runner had no credentials.
//! Someone had to pretend to be S3. Someone had to be brave enough to live entirely
//! in RAM, gone the moment the test ends.
//!
//! That someone was this module.
//!
//! `InMemoryObjectStore` is the fake bucket farm behind every spooler test: a
//! `BTreeMap` per bucket (so listing order is byte-wise for free), shared behind
//! `Arc<Mutex<...>>` so tests can peek after handing a clone to the session, plus
//! a tiny fault injector so post-processing failures can be staged on demand.
//!
//! ⚠️ This is NOT for production. Unless production is a demo. Then it's fine.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::trace;

use super::{ListPage, ObjectBody, ObjectStore};
use crate::error::StoreOperation;
use crate::location::ObjectHandle;

/// 🌱 One object to plant at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedObject {
    pub bucket: String,
    pub key: String,
    #[serde(default)]
    pub body: String,
}

/// 🔧 Buckets (and optionally objects) that exist the moment the store is born.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InMemoryStoreConfig {
    #[serde(default)]
    pub buckets: Vec<String>,
    #[serde(default)]
    pub objects: Vec<SeedObject>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    last_modified: DateTime<Utc>,
}

type Buckets = BTreeMap<String, BTreeMap<String, StoredObject>>;

/// 🪣 A bucket farm that fits in a `Vec<u8>`. Cloning shares the same farm.
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    buckets: Arc<Mutex<Buckets>>,
    // -- 💥 (operation, key) pairs that fail until healed. For list/bucket_exists the "key" is the bucket.
    faults: Arc<Mutex<HashSet<(StoreOperation, String)>>>,
    closed: Arc<AtomicBool>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn from_config(config: &InMemoryStoreConfig) -> Self {
        let the_store = Self::new();
        for the_bucket in &config.buckets {
            the_store.create_bucket(the_bucket).await;
        }
        for the_seed in &config.objects {
            the_store.create_bucket(&the_seed.bucket).await;
            the_store
                .put(&the_seed.bucket, &the_seed.key, the_seed.body.as_bytes())
                .await;
        }
        the_store
    }

    pub async fn create_bucket(&self, bucket: &str) {
        self.buckets
            .lock()
            .await
            .entry(bucket.to_string())
            .or_default();
    }

    /// 📥 Upload (or overwrite). Creates the bucket if it wasn't there.
    pub async fn put(&self, bucket: &str, key: &str, body: impl AsRef<[u8]>) {
        self.buckets
            .lock()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    body: body.as_ref().to_vec(),
                    last_modified: Utc::now(),
                },
            );
    }

    /// 🔍 Raw bytes of an object, for assertions.
    pub async fn body(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .lock()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|o| o.body.clone())
    }

    /// 📊 How many objects live under `prefix` in `bucket`.
    pub async fn object_count(&self, bucket: &str, prefix: &str) -> usize {
        self.buckets
            .lock()
            .await
            .get(bucket)
            .map(|objects| objects.keys().filter(|k| k.starts_with(prefix)).count())
            .unwrap_or(0)
    }

    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .await
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// 💥 Make `operation` on `key` fail until [`heal`](Self::heal) is called.
    pub async fn fail_on(&self, operation: StoreOperation, key: &str) {
        self.faults.lock().await.insert((operation, key.to_string()));
    }

    pub async fn heal(&self) {
        self.faults.lock().await.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn check_fault(&self, operation: StoreOperation, key: &str) -> Result<()> {
        if self
            .faults
            .lock()
            .await
            .contains(&(operation, key.to_string()))
        {
            bail!("💥 injected {operation} failure for '{key}'");
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage> {
        self.check_fault(StoreOperation::List, bucket).await?;
        let the_buckets = self.buckets.lock().await;
        let the_objects = the_buckets
            .get(bucket)
            .ok_or_else(|| anyhow!("💀 NoSuchBucket: '{bucket}'"))?;

        let the_lower = match start_after {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Unbounded,
        };

        let mut the_matches = the_objects
            .range((the_lower, Bound::Unbounded))
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| match delimiter {
                // -- 📁 a delimiter after the prefix means "inside a sub-folder"
                Some(the_delimiter) if !the_delimiter.is_empty() => {
                    !key[prefix.len()..].contains(the_delimiter)
                }
                _ => true,
            });

        let mut the_page = ListPage::default();
        for (key, object) in the_matches.by_ref().take(max_keys.max(1)) {
            the_page.objects.push(ObjectHandle {
                key: key.clone(),
                size: object.body.len() as u64,
                last_modified: Some(object.last_modified),
            });
        }
        the_page.truncated = the_matches.next().is_some();

        trace!(
            "🪣 in-memory list of s3://{bucket}/{prefix} returned {} keys (truncated: {})",
            the_page.objects.len(),
            the_page.truncated
        );
        Ok(the_page)
    }

    async fn get(&self, bucket: &str, key: &str, range_start: u64) -> Result<ObjectBody> {
        self.check_fault(StoreOperation::Get, key).await?;
        let the_body = self
            .body(bucket, key)
            .await
            .ok_or_else(|| anyhow!("💀 NoSuchKey: s3://{bucket}/{key}"))?;

        let the_start = usize::try_from(range_start)?;
        if the_start > the_body.len() {
            bail!(
                "💀 InvalidRange: byte {range_start} is past the end of s3://{bucket}/{key} ({} bytes)",
                the_body.len()
            );
        }
        let the_tail = the_body[the_start..].to_vec();
        Ok(Box::new(std::io::Cursor::new(the_tail)))
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        self.check_fault(StoreOperation::Copy, src_key).await?;
        let mut the_buckets = self.buckets.lock().await;
        let the_object = the_buckets
            .get(src_bucket)
            .and_then(|objects| objects.get(src_key))
            .cloned()
            .ok_or_else(|| anyhow!("💀 NoSuchKey: s3://{src_bucket}/{src_key}"))?;
        let the_destination = the_buckets
            .get_mut(dst_bucket)
            .ok_or_else(|| anyhow!("💀 NoSuchBucket: '{dst_bucket}'"))?;
        the_destination.insert(
            dst_key.to_string(),
            StoredObject {
                body: the_object.body,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.check_fault(StoreOperation::Delete, key).await?;
        let mut the_buckets = self.buckets.lock().await;
        let the_objects = the_buckets
            .get_mut(bucket)
            .ok_or_else(|| anyhow!("💀 NoSuchBucket: '{bucket}'"))?;
        // -- 🗑️ deleting a ghost is fine. S3 agrees.
        the_objects.remove(key);
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.check_fault(StoreOperation::BucketExists, bucket).await?;
        Ok(self.buckets.lock().await.contains_key(bucket))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn read_all(mut body: ObjectBody) -> String {
        let mut the_text = String::new();
        body.read_to_string(&mut the_text).await.unwrap();
        the_text
    }

    #[tokio::test]
    async fn the_one_where_listing_pages_resume_strictly_after_a_key() {
        let the_store = InMemoryObjectStore::new();
        for the_key in ["a.log", "b.log", "c.log", "d.log"] {
            the_store.put("bucket", the_key, "x").await;
        }

        let the_first = the_store.list("bucket", "", None, None, 2).await.unwrap();
        let the_keys: Vec<_> = the_first.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(the_keys, vec!["a.log", "b.log"]);
        assert!(the_first.truncated);

        let the_second = the_store.list("bucket", "", None, Some("b.log"), 2).await.unwrap();
        let the_keys: Vec<_> = the_second.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(the_keys, vec!["c.log", "d.log"]);
        assert!(!the_second.truncated);
    }

    #[tokio::test]
    async fn the_one_where_a_delimiter_keeps_sub_folders_out_of_the_page() {
        let the_store = InMemoryObjectStore::new();
        for the_key in [
            "NorthAmerica/Canada/file10.log",
            "NorthAmerica/USA/file7.log",
            "NorthAmerica/file4.log",
            "file1.log",
            "file2.log",
        ] {
            the_store.put("bucket", the_key, "x").await;
        }

        let the_root = the_store.list("bucket", "", Some("/"), None, 1).await.unwrap();
        let the_keys: Vec<_> = the_root.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(the_keys, vec!["file1.log"]);
        assert!(the_root.truncated);

        let the_folder = the_store
            .list("bucket", "NorthAmerica/", Some("/"), None, 10)
            .await
            .unwrap();
        let the_keys: Vec<_> = the_folder.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(the_keys, vec!["NorthAmerica/file4.log"]);

        let the_everything = the_store.list("bucket", "", None, None, 10).await.unwrap();
        assert_eq!(the_everything.objects.len(), 5);
    }

    #[tokio::test]
    async fn the_one_where_ranged_gets_start_mid_object() {
        let the_store = InMemoryObjectStore::new();
        the_store.put("bucket", "k", "hello world").await;
        let the_body = the_store.get("bucket", "k", 6).await.unwrap();
        assert_eq!(read_all(the_body).await, "world");
        assert!(the_store.get("bucket", "k", 99).await.is_err());
    }

    #[tokio::test]
    async fn the_one_where_copy_needs_a_real_destination_bucket() {
        let the_store = InMemoryObjectStore::new();
        the_store.put("src", "k", "payload").await;
        assert!(the_store.copy("src", "k", "nowhere", "k").await.is_err());

        the_store.create_bucket("dst").await;
        the_store.copy("src", "k", "dst", "archive/k").await.unwrap();
        assert_eq!(the_store.body("dst", "archive/k").await.unwrap(), b"payload");
        assert_eq!(the_store.body("src", "k").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn the_one_where_injected_faults_fail_until_healed() {
        let the_store = InMemoryObjectStore::new();
        the_store.put("src", "k", "payload").await;
        the_store.fail_on(StoreOperation::Delete, "k").await;
        assert!(the_store.delete("src", "k").await.is_err());
        the_store.heal().await;
        the_store.delete("src", "k").await.unwrap();
        assert_eq!(the_store.object_count("src", "").await, 0);
    }

    #[tokio::test]
    async fn the_one_where_seeds_sprout_buckets_and_objects() {
        let the_store = InMemoryObjectStore::from_config(&InMemoryStoreConfig {
            buckets: vec!["archive".into()],
            objects: vec![SeedObject {
                bucket: "logs".into(),
                key: "file1.log".into(),
                body: "Hello World".into(),
            }],
        })
        .await;
        assert!(the_store.bucket_exists("archive").await.unwrap());
        assert!(the_store.bucket_exists("logs").await.unwrap());
        assert!(!the_store.bucket_exists("ghost").await.unwrap());
        assert_eq!(the_store.keys("logs").await, vec!["file1.log".to_string()]);
    }
}
