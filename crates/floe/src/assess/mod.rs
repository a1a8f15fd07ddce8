//! Destination readiness checks.
//!
//! Before the lake catalog can be attached for the first time, the bucket
//! holding its data files and the Postgres database holding its metadata
//! must exist. The [`Assessor`] checks both and creates whatever is missing.
//! A failed pass is retried from the beginning after a fixed delay until it
//! succeeds or shutdown is requested.

mod postgres;
mod s3;

pub use postgres::PostgresCatalogAdmin;
pub use s3::S3BucketAdmin;

use async_trait::async_trait;
use floe_core::error::RetryError;
use floe_core::{FixedBackoff, retry_with_backoff};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{PostgresDescriptor, StorageDescriptor};
use crate::error::AssessError;

/// Existence check and creation of object storage buckets.
#[async_trait]
pub trait BucketAdmin: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, AssessError>;

    async fn create_bucket(&self, bucket: &str) -> Result<(), AssessError>;
}

/// Opens sessions against the administrative database of the catalog server.
#[async_trait]
pub trait CatalogAdmin: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn CatalogAdminSession>, AssessError>;
}

/// A connection to the administrative database.
///
/// Dropping the session releases the connection.
#[async_trait]
pub trait CatalogAdminSession: Send + Sync {
    async fn database_exists(&self, database: &str) -> Result<bool, AssessError>;

    async fn create_database(&self, database: &str) -> Result<(), AssessError>;
}

/// Outcome of a successful assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    /// Passes it took, 1 when the first one succeeded.
    pub attempts: u32,
    pub bucket_created: bool,
    pub database_created: bool,
}

#[derive(Debug, Clone, Copy)]
struct Pass {
    bucket_created: bool,
    database_created: bool,
}

/// Verifies and provisions the destination bucket and catalog database.
pub struct Assessor {
    buckets: Box<dyn BucketAdmin>,
    catalogs: Box<dyn CatalogAdmin>,
    policy: FixedBackoff,
}

impl Assessor {
    pub fn new(
        buckets: impl BucketAdmin + 'static,
        catalogs: impl CatalogAdmin + 'static,
        policy: FixedBackoff,
    ) -> Self {
        Self {
            buckets: Box::new(buckets),
            catalogs: Box::new(catalogs),
            policy,
        }
    }

    /// Block until both the bucket and the catalog database exist.
    ///
    /// Only returns an error when shutdown is requested or a configured
    /// attempt limit runs out.
    pub async fn ensure_ready(
        &self,
        storage: &StorageDescriptor,
        catalog: &PostgresDescriptor,
        shutdown: &CancellationToken,
    ) -> Result<Ready, RetryError<AssessError>> {
        let bucket = storage.bucket();
        let database = catalog.database.as_str();

        let retried = retry_with_backoff("destination assessment", self.policy, shutdown, |attempt| {
            debug!(attempt, bucket, database, "Assessing destination");
            self.assess_once(bucket, database)
        })
        .await?;

        info!(
            attempts = retried.attempts,
            "Destination storage and catalog database are ready"
        );

        Ok(Ready {
            attempts: retried.attempts,
            bucket_created: retried.value.bucket_created,
            database_created: retried.value.database_created,
        })
    }

    async fn assess_once(&self, bucket: &str, database: &str) -> Result<Pass, AssessError> {
        let bucket_created = self.ensure_bucket(bucket).await?;
        let database_created = self.ensure_database(database).await?;

        Ok(Pass {
            bucket_created,
            database_created,
        })
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<bool, AssessError> {
        if self.buckets.bucket_exists(bucket).await? {
            debug!(bucket, "Bucket already exists");
            return Ok(false);
        }

        info!(bucket, "Bucket not found, creating it");
        self.buckets.create_bucket(bucket).await?;
        info!(bucket, "Bucket created");
        Ok(true)
    }

    async fn ensure_database(&self, database: &str) -> Result<bool, AssessError> {
        // The session is dropped on every path out of this function.
        let session = self.catalogs.connect().await?;

        if session.database_exists(database).await? {
            debug!(database, "Catalog database already exists");
            return Ok(false);
        }

        info!(database, "Catalog database not found, creating it");
        session.create_database(database).await?;
        info!(database, "Catalog database created");
        Ok(true)
    }
}
