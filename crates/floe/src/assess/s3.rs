//! Bucket administration against an S3-compatible endpoint.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use tracing::debug;

use super::BucketAdmin;
use crate::config::{StorageDescriptor, UrlStyle};
use crate::error::AssessError;

/// Region in which buckets are created without a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// [`BucketAdmin`] backed by the AWS SDK.
pub struct S3BucketAdmin {
    client: Client,
    region: String,
}

impl S3BucketAdmin {
    pub fn new(storage: &StorageDescriptor) -> Self {
        let credentials = Credentials::new(
            storage.access_key.expose(),
            storage.secret.expose(),
            None,
            None,
            "floe",
        );

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(storage.address())
            .region(Region::new(storage.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(storage.url_style == UrlStyle::Path)
            .build();

        debug!(endpoint = %storage.address(), region = %storage.region, "Created object storage client");

        Self {
            client: Client::from_conf(config),
            region: storage.region.clone(),
        }
    }

    fn location(&self) -> Option<CreateBucketConfiguration> {
        (self.region != DEFAULT_REGION).then(|| {
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build()
        })
    }
}

fn failed(bucket: &str, source: impl std::error::Error + Send + Sync + 'static) -> AssessError {
    AssessError::ObjectStorage {
        bucket: bucket.to_string(),
        source: Box::new(source),
    }
}

#[async_trait]
impl BucketAdmin for S3BucketAdmin {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, AssessError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(e) => Err(failed(bucket, e)),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), AssessError> {
        let result = self
            .client
            .create_bucket()
            .bucket(bucket)
            .set_create_bucket_configuration(self.location())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            // Lost a race with another process creating the same bucket.
            Err(e)
                if e.as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you()) =>
            {
                Ok(())
            }
            Err(e) => Err(failed(bucket, e)),
        }
    }
}
