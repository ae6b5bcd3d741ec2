//! The `cosi.v1alpha1.Provisioner` gRPC service.
//!
//! Each RPC validates the request, delegates to [`BucketManager`] or
//! [`AccessManager`] and maps the outcome onto a response or a
//! [`tonic::Status`].  Handlers share no mutable state.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument, warn};

use crate::access::{AccessManager, CredentialGenerator, RandomCredentials};
use crate::bucket::BucketManager;
use crate::connection::Connection;
use crate::error::CosiError;
use crate::identity::DriverIdentity;
use crate::proto::provisioner_server::Provisioner;
use crate::proto::{self, protocol};
use crate::types::CREDENTIALS_FILE_PATH;

/// Provisioner service backed by one [`Connection`].
#[derive(Clone)]
pub struct DriverServer {
    identity: DriverIdentity,
    buckets: BucketManager,
    access: AccessManager,
}

impl DriverServer {
    pub fn new(identity: DriverIdentity, connection: &Connection) -> Self {
        Self::with_generator(identity, connection, Arc::new(RandomCredentials))
    }

    /// Like [`Self::new`], issuing grant credentials from `generator`.
    pub fn with_generator(
        identity: DriverIdentity,
        connection: &Connection,
        generator: Arc<dyn CredentialGenerator>,
    ) -> Self {
        Self {
            identity,
            buckets: BucketManager::new(connection.data()),
            access: AccessManager::new(connection.capability().clone(), generator),
        }
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// S3 parameters of the request protocol; every other protocol is
/// unsupported by this driver.
fn s3_parameters(protocol: Option<&proto::Protocol>) -> Result<&proto::S3Parameters, CosiError> {
    match protocol.and_then(|p| p.kind.as_ref()) {
        Some(protocol::Kind::S3(s3)) => Ok(s3),
        Some(protocol::Kind::AzureBlob(_)) => Err(CosiError::Configuration(
            "unsupported protocol: azureBlob".into(),
        )),
        Some(protocol::Kind::Gcs(_)) => {
            Err(CosiError::Configuration("unsupported protocol: gcs".into()))
        }
        None => Err(CosiError::Configuration(
            "unsupported protocol: none given, expected s3".into(),
        )),
    }
}

/// The S3 bucket name, falling back to the request's own bucket name.
fn bucket_name(s3: &proto::S3Parameters, request_name: &str) -> Result<String, CosiError> {
    [s3.bucket_name.as_str(), request_name]
        .into_iter()
        .find(|name| !name.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| CosiError::InvalidArgument("bucket name is empty".into()))
}

/// S3 parameters and bucket name of a request; a rejected request is logged
/// with the operation and the bucket it named.
fn resolve_s3<'a>(
    operation: &str,
    protocol: Option<&'a proto::Protocol>,
    request_name: &str,
) -> Result<(&'a proto::S3Parameters, String), CosiError> {
    s3_parameters(protocol)
        .and_then(|s3| Ok((s3, bucket_name(s3, request_name)?)))
        .inspect_err(|e| {
            warn!(operation, bucket = request_name, error = %e, "request rejected");
        })
}

// ---------------------------------------------------------------------------
// Provisioner
// ---------------------------------------------------------------------------

#[tonic::async_trait]
impl Provisioner for DriverServer {
    async fn provisioner_get_info(
        &self,
        _request: Request<proto::ProvisionerGetInfoRequest>,
    ) -> Result<Response<proto::ProvisionerGetInfoResponse>, Status> {
        Ok(Response::new(proto::ProvisionerGetInfoResponse {
            provisioner_identity: self.identity.identity(),
        }))
    }

    #[instrument(skip_all, fields(bucket = %request.get_ref().bucket_name))]
    async fn provisioner_create_bucket(
        &self,
        request: Request<proto::ProvisionerCreateBucketRequest>,
    ) -> Result<Response<proto::ProvisionerCreateBucketResponse>, Status> {
        let req = request.into_inner();
        self.identity.validate().inspect_err(|e| {
            warn!(
                operation = "create bucket",
                bucket = %req.bucket_name,
                error = %e,
                "driver identity is not configured"
            );
        })?;
        let (s3, name) = resolve_s3("create bucket", req.protocol.as_ref(), &req.bucket_name)?;
        let region = Some(s3.region.as_str()).filter(|r| !r.is_empty());

        match self.buckets.create_bucket(&name, region).await {
            Ok(_) => {}
            Err(CosiError::AlreadyExists(_)) => {
                debug!(bucket = %name, "bucket already exists, treating as created");
            }
            Err(e) => {
                warn!(bucket = %name, error = %e, "create bucket failed");
                return Err(e.into());
            }
        }
        Ok(Response::new(proto::ProvisionerCreateBucketResponse {}))
    }

    #[instrument(skip_all, fields(bucket = %request.get_ref().bucket_name))]
    async fn provisioner_delete_bucket(
        &self,
        request: Request<proto::ProvisionerDeleteBucketRequest>,
    ) -> Result<Response<proto::ProvisionerDeleteBucketResponse>, Status> {
        let req = request.into_inner();
        let (_, name) = resolve_s3("delete bucket", req.protocol.as_ref(), &req.bucket_name)?;

        self.buckets.delete_bucket(&name).await.inspect_err(|e| {
            warn!(bucket = %name, error = %e, "delete bucket failed");
        })?;
        Ok(Response::new(proto::ProvisionerDeleteBucketResponse {}))
    }

    #[instrument(skip_all, fields(
        bucket = %request.get_ref().bucket_name,
        principal = %request.get_ref().principal,
    ))]
    async fn provisioner_grant_bucket_access(
        &self,
        request: Request<proto::ProvisionerGrantBucketAccessRequest>,
    ) -> Result<Response<proto::ProvisionerGrantBucketAccessResponse>, Status> {
        let req = request.into_inner();
        let (_, name) = resolve_s3(
            "grant bucket access",
            req.protocol.as_ref(),
            &req.bucket_name,
        )?;

        let credentials = self.access.grant_access(&name).await.inspect_err(|e| {
            warn!(bucket = %name, principal = %req.principal, error = %e, "grant bucket access failed");
        })?;
        info!(bucket = %name, access_key = %credentials.access_key, "credentials issued");

        Ok(Response::new(proto::ProvisionerGrantBucketAccessResponse {
            credentials_file_contents: credentials.credentials_file(),
            credentials_file_path: CREDENTIALS_FILE_PATH.to_owned(),
            principal: credentials.access_key,
        }))
    }

    #[instrument(skip_all, fields(principal = %request.get_ref().principal))]
    async fn provisioner_revoke_bucket_access(
        &self,
        request: Request<proto::ProvisionerRevokeBucketAccessRequest>,
    ) -> Result<Response<proto::ProvisionerRevokeBucketAccessResponse>, Status> {
        let req = request.into_inner();
        if req.principal.is_empty() {
            let err = CosiError::InvalidArgument("principal is empty".into());
            warn!(
                operation = "revoke bucket access",
                bucket = %req.bucket_name,
                error = %err,
                "request rejected"
            );
            return Err(err.into());
        }

        // The bucket only locates the per-grant policy; revocation itself
        // needs nothing but the principal.
        let bucket = match req.protocol.as_ref().and_then(|p| p.kind.as_ref()) {
            Some(protocol::Kind::S3(s3)) if !s3.bucket_name.is_empty() => Some(s3.bucket_name.as_str()),
            _ => Some(req.bucket_name.as_str()).filter(|b| !b.is_empty()),
        };

        self.access
            .revoke_access(&req.principal, bucket)
            .await
            .inspect_err(|e| {
                warn!(principal = %req.principal, error = %e, "revoke bucket access failed");
            })?;
        Ok(Response::new(proto::ProvisionerRevokeBucketAccessResponse {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryBackend, Operation};
    use crate::connection::Capability;
    use crate::error::{BackendError, codes};
    use crate::types::{Credentials, Endpoint};

    use std::fmt::{self, Write as _};
    use std::sync::Mutex;

    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::util::SubscriberInitExt;

    struct FixedCredentials;

    impl CredentialGenerator for FixedCredentials {
        fn generate(&self) -> Credentials {
            Credentials::new("AK123", "SK456")
        }
    }

    fn connection(backend: &MemoryBackend, capability: Capability) -> Connection {
        Connection::from_parts(
            Endpoint::parse("http://127.0.0.1:9000").unwrap(),
            Credentials::new("minioadmin", "minioadmin"),
            Arc::new(backend.clone()),
            capability,
        )
    }

    fn driver(backend: &MemoryBackend) -> DriverServer {
        let conn = connection(
            backend,
            Capability::DataPlaneAndAdmin(Arc::new(backend.clone())),
        );
        DriverServer::with_generator(
            DriverIdentity::new("rk8s.minio.cosi", "0.1.0"),
            &conn,
            Arc::new(FixedCredentials),
        )
    }

    fn s3(bucket: &str) -> Option<proto::Protocol> {
        Some(proto::Protocol {
            kind: Some(protocol::Kind::S3(proto::S3Parameters {
                bucket_name: bucket.into(),
                region: String::new(),
            })),
        })
    }

    fn create(bucket: &str) -> Request<proto::ProvisionerCreateBucketRequest> {
        Request::new(proto::ProvisionerCreateBucketRequest {
            bucket_name: bucket.into(),
            protocol: s3(bucket),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn get_info_reports_identity() {
        let resp = driver(&MemoryBackend::new())
            .provisioner_get_info(Request::new(proto::ProvisionerGetInfoRequest {}))
            .await
            .unwrap();
        assert_eq!(resp.get_ref().provisioner_identity, "rk8s.minio.cosi-0.1.0");
    }

    #[tokio::test]
    async fn create_bucket_is_idempotent() {
        let backend = MemoryBackend::new();
        let driver = driver(&backend);
        driver.provisioner_create_bucket(create("b1")).await.unwrap();
        driver.provisioner_create_bucket(create("b1")).await.unwrap();
        assert!(backend.has_bucket("b1"));
    }

    #[tokio::test]
    async fn create_bucket_requires_identity() {
        let backend = MemoryBackend::new();
        let conn = connection(&backend, Capability::DataPlaneOnly);
        let driver = DriverServer::new(DriverIdentity::new("", "0.1.0"), &conn);

        let status = driver
            .provisioner_create_bucket(create("b1"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
        assert!(!backend.has_bucket("b1"));
    }

    #[tokio::test]
    async fn create_bucket_rejects_other_protocols() {
        let backend = MemoryBackend::new();
        let status = driver(&backend)
            .provisioner_create_bucket(Request::new(proto::ProvisionerCreateBucketRequest {
                bucket_name: "b1".into(),
                protocol: Some(proto::Protocol {
                    kind: Some(protocol::Kind::Gcs(proto::GcsParameters::default())),
                }),
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[tokio::test]
    async fn bucket_name_falls_back_to_request() {
        let backend = MemoryBackend::new();
        driver(&backend)
            .provisioner_create_bucket(Request::new(proto::ProvisionerCreateBucketRequest {
                bucket_name: "from-request".into(),
                protocol: s3(""),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert!(backend.has_bucket("from-request"));

        let status = driver(&backend)
            .provisioner_create_bucket(create(""))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn create_bucket_backend_failure_is_unknown() {
        let backend = MemoryBackend::new();
        backend.fail(
            Operation::MakeBucket,
            BackendError::new("InvalidBucketName", "bad name").with_status(400),
        );
        let status = driver(&backend)
            .provisioner_create_bucket(create("b1"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unknown);
        assert!(status.message().contains("InvalidBucketName"));
    }

    #[tokio::test]
    async fn delete_missing_bucket_propagates_error() {
        let status = driver(&MemoryBackend::new())
            .provisioner_delete_bucket(Request::new(proto::ProvisionerDeleteBucketRequest {
                bucket_name: "never".into(),
                protocol: s3("never"),
            }))
            .await
            .unwrap_err();
        assert!(status.message().contains(codes::NO_SUCH_BUCKET));
    }

    #[tokio::test]
    async fn grant_then_revoke() {
        let backend = MemoryBackend::new();
        let driver = driver(&backend);

        let resp = driver
            .provisioner_grant_bucket_access(Request::new(
                proto::ProvisionerGrantBucketAccessRequest {
                    bucket_name: "b1".into(),
                    protocol: s3("b1"),
                    principal: "ba-1234".into(),
                    ..Default::default()
                },
            ))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.principal, "AK123");
        assert_eq!(
            resp.credentials_file_contents,
            "[default]\naws_access_key_id AK123\naws_secret_access_key SK456"
        );
        assert_eq!(resp.credentials_file_path, ".aws/credentials");

        driver
            .provisioner_revoke_bucket_access(Request::new(
                proto::ProvisionerRevokeBucketAccessRequest {
                    bucket_name: "b1".into(),
                    protocol: s3("b1"),
                    principal: resp.principal,
                },
            ))
            .await
            .unwrap();
        assert!(!backend.has_user("AK123"));
        assert_eq!(backend.policy_count(), 0);
    }

    #[tokio::test]
    async fn revoke_requires_principal() {
        let status = driver(&MemoryBackend::new())
            .provisioner_revoke_bucket_access(Request::new(
                proto::ProvisionerRevokeBucketAccessRequest::default(),
            ))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn grant_on_data_plane_only_is_unimplemented() {
        let backend = MemoryBackend::new();
        let conn = connection(&backend, Capability::DataPlaneOnly);
        let driver = DriverServer::new(DriverIdentity::new("rk8s.minio.cosi", "0.1.0"), &conn);

        let status = driver
            .provisioner_grant_bucket_access(Request::new(
                proto::ProvisionerGrantBucketAccessRequest {
                    bucket_name: "b1".into(),
                    protocol: s3("b1"),
                    ..Default::default()
                },
            ))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unimplemented);
        assert_eq!(backend.user_count(), 0);
    }

    /// Collects the fields of every WARN event.
    #[derive(Clone, Default)]
    struct WarnCapture(Arc<Mutex<Vec<String>>>);

    struct FieldWriter(String);

    impl Visit for FieldWriter {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            let _ = write!(self.0, "{}={:?} ", field.name(), value);
        }
    }

    impl<S: Subscriber> Layer<S> for WarnCapture {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                let mut fields = FieldWriter(String::new());
                event.record(&mut fields);
                self.0.lock().unwrap().push(fields.0);
            }
        }
    }

    impl WarnCapture {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    #[tokio::test]
    async fn rejected_requests_are_logged() {
        let capture = WarnCapture::default();
        let _guard = tracing_subscriber::registry()
            .with(capture.clone())
            .set_default();
        let backend = MemoryBackend::new();
        let driver = driver(&backend);

        driver
            .provisioner_create_bucket(create(""))
            .await
            .unwrap_err();
        let logs = capture.take();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].contains("create bucket"));

        driver
            .provisioner_delete_bucket(Request::new(proto::ProvisionerDeleteBucketRequest {
                bucket_name: "b1".into(),
                protocol: None,
            }))
            .await
            .unwrap_err();
        let logs = capture.take();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].contains("delete bucket"));
        assert!(logs[0].contains("b1"));

        driver
            .provisioner_grant_bucket_access(Request::new(
                proto::ProvisionerGrantBucketAccessRequest {
                    bucket_name: "b2".into(),
                    protocol: Some(proto::Protocol {
                        kind: Some(protocol::Kind::AzureBlob(
                            proto::AzureBlobParameters::default(),
                        )),
                    }),
                    ..Default::default()
                },
            ))
            .await
            .unwrap_err();
        let logs = capture.take();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].contains("grant bucket access"));
        assert!(logs[0].contains("b2"));

        driver
            .provisioner_revoke_bucket_access(Request::new(
                proto::ProvisionerRevokeBucketAccessRequest {
                    bucket_name: "b3".into(),
                    ..Default::default()
                },
            ))
            .await
            .unwrap_err();
        let logs = capture.take();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].contains("revoke bucket access"));
        assert!(logs[0].contains("principal is empty"));
    }
}
