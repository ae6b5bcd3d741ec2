//! Bucket lifecycle: idempotent create, pass-through delete.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::backend::DataPlane;
use crate::error::CosiError;

/// Creates and deletes buckets on the data plane.
///
/// Holds no state of its own; the object store is the source of truth.
#[derive(Clone)]
pub struct BucketManager {
    data: Arc<dyn DataPlane>,
}

impl BucketManager {
    pub fn new(data: Arc<dyn DataPlane>) -> Self {
        Self { data }
    }

    /// Create `name`, returning the bucket name on success.
    ///
    /// Returns [`CosiError::AlreadyExists`] when the bucket is already there,
    /// either because the backend said so or because a failed create is
    /// followed by a successful existence check.
    #[instrument(skip(self))]
    pub async fn create_bucket(
        &self,
        name: &str,
        region: Option<&str>,
    ) -> Result<String, CosiError> {
        let err = match self.data.make_bucket(name, region).await {
            Ok(()) => {
                info!(bucket = name, "bucket created");
                return Ok(name.to_owned());
            }
            Err(e) if e.is_bucket_conflict() => {
                info!(bucket = name, code = %e.code, "bucket already exists");
                return Err(CosiError::AlreadyExists(name.to_owned()));
            }
            Err(e) => e,
        };

        match self.data.bucket_exists(name).await {
            Ok(true) => {
                info!(bucket = name, error = %err, "create failed but bucket exists");
                Err(CosiError::AlreadyExists(name.to_owned()))
            }
            Ok(false) => Err(CosiError::backend(format!("create bucket {name}"), err)),
            Err(check) => {
                warn!(bucket = name, error = %check, "bucket existence re-check failed");
                Err(CosiError::backend(format!("create bucket {name}"), err))
            }
        }
    }

    /// Delete `name`. Backend errors, including a missing bucket, are returned
    /// unmodified inside [`CosiError::Backend`].
    #[instrument(skip(self))]
    pub async fn delete_bucket(&self, name: &str) -> Result<(), CosiError> {
        self.data
            .remove_bucket(name)
            .await
            .map_err(|e| CosiError::backend(format!("delete bucket {name}"), e))?;
        info!(bucket = name, "bucket deleted");
        Ok(())
    }
}
