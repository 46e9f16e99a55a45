//! 🪣 Object stores — where the bytes actually live.
//!
//! 🎭 This module is the casting agency for buckets. Need the real cloud? S3.
//! Need a bucket that fits in a test and forgets everything when it drops? In-memory.
//! Both speak the same five verbs: list, get, copy, delete, bucket_exists.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (`InMemoryObjectStore`, `S3ObjectStore`) → `StoreBackend` enum
//! - Listing is paged with `start_after`, so the lister can resume strictly after a key
//!   without holding a continuation token across cycles.
//! - `get` takes a byte `range_start`: that is how mid-object resumption works.
//! - Errors are `anyhow` here. The spooler boxes them into `SpoolError::TransientStore`.
//!
//! 🦆 The duck is not an object. The duck is a directory marker. The duck gets skipped.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncRead;

use crate::location::ObjectHandle;

mod in_mem;
mod s3;

pub use in_mem::{InMemoryObjectStore, InMemoryStoreConfig, SeedObject};
pub use s3::{S3ObjectStore, S3ObjectStoreConfig};

/// 🧠 Type-erased byte stream. `ByteStream::into_async_read()` and `std::io::Cursor`
/// both fit in here.
pub type ObjectBody = Box<dyn AsyncRead + Send + Unpin>;

/// 📄 One page of a listing, ascending by key.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectHandle>,
    /// 🔄 More keys exist after the last one in `objects`.
    pub truncated: bool,
}

/// 🪣 The transport contract the spooler consumes.
///
/// # Contract 📜
/// - `list` returns keys under `prefix`, strictly greater than `start_after`, ascending,
///   at most `max_keys` of them. Directory markers may show up; the lister filters them.
///   With a `delimiter`, only direct children come back: keys with the delimiter somewhere
///   after the prefix are left out (S3 rolls them into common prefixes). A truncated page
///   always carries at least one object.
/// - `get` streams the object starting at byte `range_start`.
/// - `copy` never touches the source. `delete` of a missing key is not an error.
/// - `close` releases the client. Called exactly once, by the session.
#[async_trait]
pub trait ObjectStore: std::fmt::Debug + Send + Sync {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage>;

    async fn get(&self, bucket: &str, key: &str, range_start: u64) -> Result<ObjectBody>;

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn close(&self) -> Result<()>;
}

/// 🔧 Which store to talk to. Externally tagged: `[store.S3]` / `[store.InMemory]`.
#[derive(Debug, Clone, Deserialize)]
pub enum StoreConfig {
    InMemory(InMemoryStoreConfig),
    S3(S3ObjectStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::InMemory(InMemoryStoreConfig::default())
    }
}

/// 🎭 The many faces of a bucket. Dispatches via match so the spooler never has to care.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    InMemory(InMemoryObjectStore),
    S3(S3ObjectStore),
}

impl StoreBackend {
    /// 🚀 Build the client described by the config. For S3 this resolves credentials.
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        match config {
            StoreConfig::InMemory(seed) => Ok(Self::InMemory(
                InMemoryObjectStore::from_config(seed).await,
            )),
            StoreConfig::S3(s3_config) => {
                Ok(Self::S3(S3ObjectStore::connect(s3_config.clone()).await?))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for StoreBackend {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage> {
        match self {
            Self::InMemory(s) => s.list(bucket, prefix, delimiter, start_after, max_keys).await,
            Self::S3(s) => s.list(bucket, prefix, delimiter, start_after, max_keys).await,
        }
    }

    async fn get(&self, bucket: &str, key: &str, range_start: u64) -> Result<ObjectBody> {
        match self {
            Self::InMemory(s) => s.get(bucket, key, range_start).await,
            Self::S3(s) => s.get(bucket, key, range_start).await,
        }
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        match self {
            Self::InMemory(s) => s.copy(src_bucket, src_key, dst_bucket, dst_key).await,
            Self::S3(s) => s.copy(src_bucket, src_key, dst_bucket, dst_key).await,
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        match self {
            Self::InMemory(s) => s.delete(bucket, key).await,
            Self::S3(s) => s.delete(bucket, key).await,
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self {
            Self::InMemory(s) => s.bucket_exists(bucket).await,
            Self::S3(s) => s.bucket_exists(bucket).await,
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            Self::InMemory(s) => s.close().await,
            Self::S3(s) => s.close().await,
        }
    }
}
