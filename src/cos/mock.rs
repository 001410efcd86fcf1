use super::{ObjectMetadata, ObjectStore};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub metadata: ObjectMetadata,
}

#[derive(Debug, Clone)]
enum BucketState {
    Exists,
    Missing,
    Forbidden,
    Unreachable(String),
}

#[derive(Clone)]
pub struct MockCosClient {
    bucket: String,
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    put_count: Arc<Mutex<usize>>,
    head_count: Arc<Mutex<usize>>,
    fail_puts: Arc<Mutex<bool>>,
    bucket_state: Arc<Mutex<BucketState>>,
}

impl MockCosClient {
    pub fn new() -> Self {
        Self {
            bucket: "mock-bucket-1250000000".to_string(),
            objects: Arc::new(Mutex::new(HashMap::new())),
            put_count: Arc::new(Mutex::new(0)),
            head_count: Arc::new(Mutex::new(0)),
            fail_puts: Arc::new(Mutex::new(false)),
            bucket_state: Arc::new(Mutex::new(BucketState::Exists)),
        }
    }

    pub fn with_bucket(mut self, bucket: String) -> Self {
        self.bucket = bucket;
        self
    }

    pub fn with_put_failure(self, should_fail: bool) -> Self {
        *self.fail_puts.lock().unwrap() = should_fail;
        self
    }

    pub fn with_missing_bucket(self) -> Self {
        *self.bucket_state.lock().unwrap() = BucketState::Missing;
        self
    }

    pub fn with_access_denied(self) -> Self {
        *self.bucket_state.lock().unwrap() = BucketState::Forbidden;
        self
    }

    pub fn with_unreachable_bucket(self, message: String) -> Self {
        *self.bucket_state.lock().unwrap() = BucketState::Unreachable(message);
        self
    }

    pub fn get_put_count(&self) -> usize {
        *self.put_count.lock().unwrap()
    }

    pub fn get_head_count(&self) -> usize {
        *self.head_count.lock().unwrap()
    }

    pub fn get_object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn get_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for MockCosClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MockCosClient {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<()> {
        *self.put_count.lock().unwrap() += 1;

        if *self.fail_puts.lock().unwrap() {
            return Err(Error::Storage("Mock upload failure".to_string()));
        }

        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body,
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }

    async fn head_bucket(&self) -> Result<()> {
        *self.head_count.lock().unwrap() += 1;

        match &*self.bucket_state.lock().unwrap() {
            BucketState::Exists => Ok(()),
            BucketState::Missing => Err(Error::BucketNotFound(self.bucket.clone())),
            BucketState::Forbidden => Err(Error::AccessDenied(format!(
                "credentials rejected for bucket {}",
                self.bucket
            ))),
            BucketState::Unreachable(message) => Err(Error::Storage(message.clone())),
        }
    }
}
