//! S3 data plane built on the AWS SDK.
//!
//! Works against any S3-compatible endpoint: requests use path-style
//! addressing and the driver's static credentials.

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{BehaviorVersion, Credentials as SdkCredentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use tracing::debug;

use crate::backend::DataPlane;
use crate::error::BackendError;
use crate::types::{Credentials, Endpoint};

/// Region used when none is configured; also the region in which S3 rejects
/// an explicit location constraint.
pub const DEFAULT_REGION: &str = "us-east-1";

/// [`DataPlane`] backed by an [`aws_sdk_s3::Client`].
#[derive(Debug, Clone)]
pub struct S3DataPlane {
    client: aws_sdk_s3::Client,
}

impl S3DataPlane {
    pub fn new(endpoint: &Endpoint, credentials: &Credentials, region: &str) -> Self {
        let creds = SdkCredentials::new(
            &credentials.access_key,
            &credentials.secret_key,
            None,
            None,
            "rkcosi-static",
        );

        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .credentials_provider(creds)
            .endpoint_url(endpoint.base_url())
            .force_path_style(true)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
        }
    }
}

/// Convert an SDK failure into a [`BackendError`], keeping the service error
/// code and HTTP status.
///
/// `HEAD` responses carry no body, so their code is inferred from the status.
fn to_backend_error<E>(err: SdkError<E, HttpResponse>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err
        .code()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| match status {
            Some(403) => crate::error::codes::ACCESS_DENIED.to_owned(),
            Some(404) => "NotFound".to_owned(),
            Some(s) => format!("Http{s}"),
            None => "ClientError".to_owned(),
        });
    let message = err
        .message()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    let mut backend = BackendError::new(code, message);
    backend.status = status;
    backend
}

#[async_trait]
impl DataPlane for S3DataPlane {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, BackendError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    return Ok(false);
                }
                let err = to_backend_error(err);
                if err.status == Some(404) {
                    return Ok(false);
                }
                Err(err)
            }
        }
    }

    async fn make_bucket(&self, bucket: &str, region: Option<&str>) -> Result<(), BackendError> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if let Some(region) = region.filter(|r| !r.is_empty() && *r != DEFAULT_REGION) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        request.send().await.map_err(to_backend_error)?;
        debug!(bucket, "S3 CreateBucket succeeded");
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &str) -> Result<(), BackendError> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(to_backend_error)?;
        debug!(bucket, "S3 DeleteBucket succeeded");
        Ok(())
    }
}
