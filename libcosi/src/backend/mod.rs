//! Object-store backend seams and their implementations.
//!
//! The driver talks to the object store through two capability-scoped
//! handles:
//!
//! * [`DataPlane`]: bucket existence, creation and removal.
//! * [`AdminPlane`]: user and canned-policy management, which requires
//!   elevated trust on the backend.
//!
//! A [`Connector`] builds both handles for an endpoint.  The concrete
//! implementations are [`s3::S3DataPlane`] (AWS SDK), [`minio::MinioAdmin`]
//! (MinIO admin REST API) and [`memory::MemoryBackend`] (in-process, used by
//! tests and local development).

pub mod memory;
pub mod minio;
pub mod s3;

mod crypt;
mod sigv4;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::policy::PolicyDocument;
use crate::types::{Credentials, Endpoint};

/// Bucket operations against the object store.
#[async_trait]
pub trait DataPlane: Send + Sync {
    /// `Ok(false)` when the bucket does not exist.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, BackendError>;

    /// Create `bucket`, optionally pinned to `region`.
    async fn make_bucket(&self, bucket: &str, region: Option<&str>) -> Result<(), BackendError>;

    async fn remove_bucket(&self, bucket: &str) -> Result<(), BackendError>;
}

/// Identity and policy operations against the object store.
#[async_trait]
pub trait AdminPlane: Send + Sync {
    /// Create a user authenticated by `credentials`.
    async fn add_user(&self, credentials: &Credentials) -> Result<(), BackendError>;

    /// Delete the user identified by `access_key`, invalidating its bindings.
    async fn remove_user(&self, access_key: &str) -> Result<(), BackendError>;

    /// Register (or overwrite) the canned policy `name`.
    async fn add_canned_policy(
        &self,
        name: &str,
        policy: &PolicyDocument,
    ) -> Result<(), BackendError>;

    async fn remove_canned_policy(&self, name: &str) -> Result<(), BackendError>;

    /// Bind policy `name` to `access_key`, replacing any prior binding.
    async fn set_policy(&self, name: &str, access_key: &str) -> Result<(), BackendError>;
}

/// Builds data-plane and admin-plane handles for an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn data_plane(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Arc<dyn DataPlane>, BackendError>;

    async fn admin_plane(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Arc<dyn AdminPlane>, BackendError>;
}

/// Connects to a MinIO-compatible store: S3 API for the data plane, MinIO
/// admin API for the admin plane.
#[derive(Debug, Clone)]
pub struct S3Connector {
    region: String,
}

impl S3Connector {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }
}

impl Default for S3Connector {
    fn default() -> Self {
        Self::new(s3::DEFAULT_REGION)
    }
}

#[async_trait]
impl Connector for S3Connector {
    async fn data_plane(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Arc<dyn DataPlane>, BackendError> {
        Ok(Arc::new(s3::S3DataPlane::new(
            endpoint,
            credentials,
            &self.region,
        )))
    }

    async fn admin_plane(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Arc<dyn AdminPlane>, BackendError> {
        let admin = minio::MinioAdmin::new(endpoint, credentials, &self.region)?;
        Ok(Arc::new(admin))
    }
}
