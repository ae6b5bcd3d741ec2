//! Backend connection bootstrap.
//!
//! [`Connection::connect`] parses the endpoint, builds the data plane, probes
//! it with a randomly named bucket and, depending on the probe result, either
//! elevates to an admin plane or settles for data-plane-only access.  The
//! whole attempt races a caller-supplied cancellation future; when the
//! cancellation wins, the attempt is dropped along with any request it had in
//! flight.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::backend::{AdminPlane, Connector, DataPlane};
use crate::error::CosiError;
use crate::types::{Credentials, Endpoint};

/// What the backend lets the driver do.
#[derive(Clone)]
pub enum Capability {
    /// Bucket operations only; grant and revoke are unsupported.
    DataPlaneOnly,
    /// Bucket operations plus user and policy management.
    DataPlaneAndAdmin(Arc<dyn AdminPlane>),
}

impl Capability {
    pub fn admin(&self) -> Option<&Arc<dyn AdminPlane>> {
        match self {
            Self::DataPlaneOnly => None,
            Self::DataPlaneAndAdmin(admin) => Some(admin),
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DataPlaneOnly => "DataPlaneOnly",
            Self::DataPlaneAndAdmin(_) => "DataPlaneAndAdmin",
        })
    }
}

/// An established, immutable connection to the object store.
#[derive(Clone)]
pub struct Connection {
    endpoint: Endpoint,
    credentials: Credentials,
    data: Arc<dyn DataPlane>,
    capability: Capability,
}

impl Connection {
    /// Connect to `endpoint` with the driver's static `credentials`.
    ///
    /// Returns [`CosiError::Cancelled`] as soon as `cancel` completes, without
    /// waiting for the backend.
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn connect<C, F>(
        endpoint: &str,
        credentials: Credentials,
        connector: &C,
        cancel: F,
    ) -> Result<Self, CosiError>
    where
        C: Connector + ?Sized,
        F: Future<Output = ()>,
    {
        let endpoint = Endpoint::parse(endpoint)?;

        tokio::select! {
            biased;
            () = cancel => {
                warn!("backend connection cancelled");
                Err(CosiError::Cancelled("connect".into()))
            }
            result = Self::establish(endpoint, credentials, connector) => result,
        }
    }

    async fn establish<C>(
        endpoint: Endpoint,
        credentials: Credentials,
        connector: &C,
    ) -> Result<Self, CosiError>
    where
        C: Connector + ?Sized,
    {
        let data = connector
            .data_plane(&endpoint, &credentials)
            .await
            .map_err(|e| CosiError::connection("failed to create data-plane client", e))?;

        // A fresh UUID cannot name an existing bucket, so the probe checks the
        // credentials without touching backend state.
        let probe = format!("cosi-probe-{}", Uuid::new_v4());
        let capability = match data.bucket_exists(&probe).await {
            Err(e) if e.is_no_such_bucket() => {
                info!(%endpoint, "connected with data-plane access only");
                Capability::DataPlaneOnly
            }
            Err(e) if e.is_access_denied() => {
                return Err(CosiError::Authentication(e.to_string()));
            }
            Err(e) => return Err(CosiError::connection("backend probe failed", e)),
            Ok(_) => {
                let admin = connector
                    .admin_plane(&endpoint, &credentials)
                    .await
                    .map_err(|e| {
                        CosiError::connection(
                            "connected as data-plane but failed to elevate to admin-plane",
                            e,
                        )
                    })?;
                info!(%endpoint, "connected with admin-plane access");
                Capability::DataPlaneAndAdmin(admin)
            }
        };

        Ok(Self {
            endpoint,
            credentials,
            data,
            capability,
        })
    }

    /// Assemble a connection from already-built planes, skipping the probe.
    pub fn from_parts(
        endpoint: Endpoint,
        credentials: Credentials,
        data: Arc<dyn DataPlane>,
        capability: Capability,
    ) -> Self {
        Self {
            endpoint,
            credentials,
            data,
            capability,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn data(&self) -> Arc<dyn DataPlane> {
        Arc::clone(&self.data)
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn is_admin_capable(&self) -> bool {
        self.capability.admin().is_some()
    }

    /// The admin plane, or [`CosiError::Unsupported`] on a data-plane-only
    /// connection.
    pub fn admin(&self) -> Result<Arc<dyn AdminPlane>, CosiError> {
        self.capability.admin().cloned().ok_or_else(|| {
            CosiError::Unsupported("backend connection has no admin-plane access".into())
        })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("credentials", &self.credentials)
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::backend::memory::{MemoryBackend, Operation};
    use crate::error::{BackendError, codes};

    const ENDPOINT: &str = "http://127.0.0.1:9000";

    fn creds() -> Credentials {
        Credentials::new("minioadmin", "minioadmin")
    }

    /// Connector whose planes never become ready.
    struct PendingConnector;

    #[async_trait]
    impl Connector for PendingConnector {
        async fn data_plane(
            &self,
            _endpoint: &Endpoint,
            _credentials: &Credentials,
        ) -> Result<Arc<dyn DataPlane>, BackendError> {
            std::future::pending().await
        }

        async fn admin_plane(
            &self,
            _endpoint: &Endpoint,
            _credentials: &Credentials,
        ) -> Result<Arc<dyn AdminPlane>, BackendError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn missing_probe_bucket_elevates_to_admin() {
        let backend = MemoryBackend::new();
        let conn = Connection::connect(ENDPOINT, creds(), &backend, std::future::pending())
            .await
            .unwrap();
        assert!(conn.is_admin_capable());
        assert!(conn.admin().is_ok());
        assert!(!conn.endpoint().secure());
    }

    #[tokio::test]
    async fn no_such_bucket_probe_is_data_plane_only() {
        let backend = MemoryBackend::new();
        backend.fail(
            Operation::BucketExists,
            BackendError::new(codes::NO_SUCH_BUCKET, "The specified bucket does not exist")
                .with_status(404),
        );
        let conn = Connection::connect(ENDPOINT, creds(), &backend, std::future::pending())
            .await
            .unwrap();
        assert!(matches!(conn.capability(), Capability::DataPlaneOnly));
        assert!(matches!(conn.admin(), Err(CosiError::Unsupported(_))));
    }

    #[tokio::test]
    async fn access_denied_probe_fails_authentication() {
        let backend = MemoryBackend::new();
        backend.fail(
            Operation::BucketExists,
            BackendError::new(codes::ACCESS_DENIED, "Access Denied.").with_status(403),
        );
        // Admin connection must not be attempted.
        backend.fail(
            Operation::ConnectAdmin,
            BackendError::new("Unexpected", "admin plane requested"),
        );
        let err = Connection::connect(ENDPOINT, creds(), &backend, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, CosiError::Authentication(_)));
    }

    #[tokio::test]
    async fn other_probe_failure_is_connection_error() {
        let backend = MemoryBackend::new();
        backend.fail(
            Operation::BucketExists,
            BackendError::new("ServiceUnavailable", "try later").with_status(503),
        );
        let err = Connection::connect(ENDPOINT, creds(), &backend, std::future::pending())
            .await
            .unwrap_err();
        assert_eq!(err.backend_source().unwrap().code, "ServiceUnavailable");
        assert!(matches!(err, CosiError::Connection { .. }));
    }

    #[tokio::test]
    async fn admin_elevation_failure_is_fatal() {
        let backend = MemoryBackend::new();
        backend.fail(
            Operation::ConnectAdmin,
            BackendError::new("ClientError", "bad admin endpoint"),
        );
        let err = Connection::connect(ENDPOINT, creds(), &backend, std::future::pending())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to elevate to admin-plane"));
    }

    #[tokio::test]
    async fn unknown_scheme_fails_before_connecting() {
        let err = Connection::connect("ftp://host", creds(), &PendingConnector, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, CosiError::Configuration(_)));
    }

    #[tokio::test]
    async fn cancellation_abandons_pending_attempt() {
        let cancel = tokio::time::sleep(Duration::from_millis(20));
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            Connection::connect(ENDPOINT, creds(), &PendingConnector, cancel),
        )
        .await
        .expect("connect must return once cancelled");
        assert!(matches!(result, Err(CosiError::Cancelled(_))));
    }
}
