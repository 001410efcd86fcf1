use super::{ObjectMetadata, ObjectStore, COS_META_PREFIX};
use crate::config::{cos_endpoint, UploadConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Region, Client as S3Client};
use base64::Engine;
use tracing::debug;

pub struct CosClient {
    client: S3Client,
    bucket: String,
}

impl CosClient {
    pub async fn new(
        secret_id: String,
        secret_key: String,
        region: String,
        bucket: String,
    ) -> Result<Self> {
        let endpoint = cos_endpoint(&region);
        let credentials = aws_sdk_s3::config::Credentials::new(
            secret_id,
            secret_key,
            None,
            None,
            "tencent-cos",
        );

        // COS speaks the S3 protocol with virtual-hosted bucket addressing
        let config = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region))
            .endpoint_url(endpoint)
            .load()
            .await;

        let client = S3Client::new(&config);

        Ok(Self { client, bucket })
    }

    pub async fn from_config(config: &UploadConfig) -> Result<Self> {
        let credentials = config
            .credentials()
            .ok_or_else(|| Error::Config("COS credentials are not configured".to_string()))?;
        if config.bucket().is_empty() {
            return Err(Error::Config("COS bucket is not configured".to_string()));
        }

        Self::new(
            credentials.secret_id.clone(),
            credentials.secret_key.clone(),
            config.region().to_string(),
            config.bucket().to_string(),
        )
        .await
    }
}

fn content_md5(body: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(md5::compute(body).0)
}

#[async_trait]
impl ObjectStore for CosClient {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        metadata: &ObjectMetadata,
    ) -> Result<()> {
        let md5 = content_md5(&body);
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_md5(md5)
            .body(ByteStream::from(body));

        // The S3-compatible endpoint takes user metadata as x-amz-meta-*,
        // which COS stores as x-cos-meta-*.
        for (name, value) in metadata {
            let name = name.strip_prefix(COS_META_PREFIX).unwrap_or(name.as_str());
            request = request.metadata(name, value);
        }

        request
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Failed to upload object: {}", e)))?;

        debug!(bucket = %self.bucket, key = %key, "COS put_object acknowledged");
        Ok(())
    }

    async fn head_bucket(&self) -> Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => Err(classify_head_bucket_error(&self.bucket, e)),
        }
    }
}

fn classify_head_bucket_error(bucket: &str, err: SdkError<HeadBucketError>) -> Error {
    match &err {
        SdkError::ServiceError(service_err) => {
            if let HeadBucketError::NotFound(_) = service_err.err() {
                return Error::BucketNotFound(bucket.to_string());
            }
            // HEAD responses carry no error body, so the status code is all there is
            match service_err.raw().status().as_u16() {
                404 => Error::BucketNotFound(bucket.to_string()),
                403 => Error::AccessDenied(format!("credentials rejected for bucket {}", bucket)),
                status => Error::Storage(format!("HEAD bucket returned status {}", status)),
            }
        }
        _ => Error::Storage(format!("Failed to reach bucket {}: {}", bucket, err)),
    }
}
