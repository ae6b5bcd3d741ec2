//! COSI error types.
//!
//! Failures reported by the object store are carried as [`BackendError`]
//! (backend error code, HTTP status, message).  Everything the driver itself
//! decides is a [`CosiError`] variant, which maps onto a gRPC status when it
//! leaves the service.

use std::fmt;

use thiserror::Error;

/// Error codes reported by S3 and the MinIO admin API that the driver
/// reacts to.
pub mod codes {
    pub const NO_SUCH_BUCKET: &str = "NoSuchBucket";
    pub const BUCKET_ALREADY_EXISTS: &str = "BucketAlreadyExists";
    pub const BUCKET_ALREADY_OWNED_BY_YOU: &str = "BucketAlreadyOwnedByYou";
    pub const ACCESS_DENIED: &str = "AccessDenied";
    pub const INVALID_ACCESS_KEY_ID: &str = "InvalidAccessKeyId";
    pub const NO_SUCH_USER: &str = "XMinioAdminNoSuchUser";
    pub const NO_SUCH_POLICY: &str = "XMinioAdminNoSuchPolicy";
}

/// A failure reported by the object-store backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct BackendError {
    /// Backend error code, e.g. `NoSuchBucket`.
    pub code: String,
    /// HTTP status of the failed response, when one was received.
    pub status: Option<u16>,
    /// Human-readable message.
    pub message: String,
}

impl BackendError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            status: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Error raised locally while talking to the backend (request building,
    /// I/O, decoding), before or instead of a backend response.
    pub fn client<E: fmt::Display>(e: E) -> Self {
        Self::new("ClientError", e.to_string())
    }

    /// The backend rejected the caller's credentials or permissions.
    pub fn is_access_denied(&self) -> bool {
        self.status == Some(403)
            || self.code == codes::ACCESS_DENIED
            || self.code == codes::INVALID_ACCESS_KEY_ID
    }

    pub fn is_no_such_bucket(&self) -> bool {
        self.code == codes::NO_SUCH_BUCKET
    }

    /// `true` for both "exists, owned by someone else" and "exists, owned by
    /// you" create responses.
    pub fn is_bucket_conflict(&self) -> bool {
        self.code == codes::BUCKET_ALREADY_EXISTS || self.code == codes::BUCKET_ALREADY_OWNED_BY_YOU
    }
}

/// Steps of the grant sequence that touch the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantStep {
    CreateUser,
    AddPolicy,
    SetPolicy,
}

impl fmt::Display for GrantStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CreateUser => "create user",
            Self::AddPolicy => "add policy",
            Self::SetPolicy => "set policy",
        })
    }
}

/// Outcome of undoing the completed steps of a failed grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    /// Every compensating action succeeded; no backend state was left behind.
    Completed,
    /// Some compensating actions failed; the entries describe what was left
    /// behind and must be removed out-of-band.
    Failed(Vec<String>),
}

impl fmt::Display for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Failed(left) => write!(f, "failed ({})", left.join("; ")),
        }
    }
}

/// Unified error type for COSI operations.
#[derive(Debug, Error)]
pub enum CosiError {
    /// Bad or missing driver configuration (endpoint scheme, driver name,
    /// unsupported protocol).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The backend rejected the driver's credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The backend could not be reached or set up.
    #[error("connection failed: {context}: {source}")]
    Connection {
        context: String,
        #[source]
        source: BackendError,
    },

    /// The bucket already exists; callers treat this as success.
    #[error("bucket {0} already exists")]
    AlreadyExists(String),

    /// The connection lacks the capability the operation needs.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// The caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other backend-reported failure, with the operation that hit it.
    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: BackendError,
    },

    /// A multi-step grant failed part-way; completed steps were undone on a
    /// best-effort basis.
    #[error("grant failed at step '{step}': {source}; cleanup {cleanup}")]
    PartialFailure {
        step: GrantStep,
        #[source]
        source: BackendError,
        cleanup: Cleanup,
    },

    /// The caller gave up before the operation finished.
    #[error("{0} cancelled")]
    Cancelled(String),

    /// Listener or gRPC server failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CosiError {
    /// Wrap a [`BackendError`] with the operation it interrupted.
    pub fn backend(context: impl Into<String>, source: BackendError) -> Self {
        Self::Backend {
            context: context.into(),
            source,
        }
    }

    pub fn connection(context: impl Into<String>, source: BackendError) -> Self {
        Self::Connection {
            context: context.into(),
            source,
        }
    }

    /// Create a [`CosiError::Transport`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn transport<E: fmt::Display>(e: E) -> Self {
        Self::Transport(e.to_string())
    }

    /// The backend error underneath this one, if any.
    pub fn backend_source(&self) -> Option<&BackendError> {
        match self {
            Self::Connection { source, .. }
            | Self::Backend { source, .. }
            | Self::PartialFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<CosiError> for tonic::Status {
    fn from(e: CosiError) -> Self {
        let message = e.to_string();
        match e {
            CosiError::Configuration(_) | CosiError::Connection { .. } => {
                tonic::Status::unavailable(message)
            }
            CosiError::Authentication(_) => tonic::Status::unauthenticated(message),
            CosiError::AlreadyExists(_) => tonic::Status::already_exists(message),
            CosiError::Unsupported(_) => tonic::Status::unimplemented(message),
            CosiError::InvalidArgument(_) => tonic::Status::invalid_argument(message),
            CosiError::Backend { .. } => tonic::Status::unknown(message),
            CosiError::PartialFailure { .. }
            | CosiError::Transport(_)
            | CosiError::Internal(_) => tonic::Status::internal(message),
            CosiError::Cancelled(_) => tonic::Status::cancelled(message),
        }
    }
}
