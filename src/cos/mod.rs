//! Tencent COS integration
//!
//! Uploads objects and probes bucket existence through COS's S3-compatible
//! API. The real client is only compiled with the `cos` feature.

#[cfg(feature = "cos")]
pub mod client;
pub mod mock;

#[cfg(feature = "cos")]
pub use client::CosClient;
pub use mock::MockCosClient;

use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Header prefix COS uses for user-defined object metadata.
pub const COS_META_PREFIX: &str = "x-cos-meta-";

/// Metadata headers keyed by their full `x-cos-meta-*` name.
pub type ObjectMetadata = BTreeMap<String, String>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key` in the configured bucket.
    async fn put_object(&self, key: &str, body: Vec<u8>, metadata: &ObjectMetadata)
        -> Result<()>;

    /// Check that the configured bucket exists and is reachable.
    ///
    /// Fails with [`crate::Error::BucketNotFound`] or
    /// [`crate::Error::AccessDenied`] when the service says so.
    async fn head_bucket(&self) -> Result<()>;
}
