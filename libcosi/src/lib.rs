//! # libcosi: Container Object Storage Interface driver for RK8s
//!
//! `libcosi` implements the provisioner side of the [Container Object Storage
//! Interface][cosi]: a gRPC service (via [`tonic`]) that creates and deletes
//! buckets and grants or revokes per-bucket credentials on a MinIO-compatible
//! object store.  It follows the RK8s conventions (Tokio async runtime,
//! `tracing` for observability, `thiserror` for structured errors).
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Core data model: `Credentials`, `Endpoint`, credentials file rendering. |
//! | [`policy`] | Bucket access policy documents and per-grant policy names. |
//! | [`error`] | [`CosiError`] and [`BackendError`] covering all failure modes. |
//! | [`identity`] | [`DriverIdentity`], the driver name/version reported to the sidecar. |
//! | [`backend`] | Data-plane / admin-plane seams plus S3, MinIO admin and in-memory implementations. |
//! | [`connection`] | Cancellable connection bootstrap and capability detection. |
//! | [`bucket`] | Idempotent bucket create / delete. |
//! | [`access`] | Credential grant with compensation, and revocation. |
//! | [`transport`] | The tonic `Provisioner` service and its listener. |
//!
//! [cosi]: https://github.com/kubernetes-sigs/container-object-storage-interface-spec

pub mod access;
pub mod backend;
pub mod bucket;
pub mod connection;
pub mod error;
pub mod identity;
pub mod policy;
pub mod transport;
pub mod types;

/// Generated protobuf messages and tonic stubs for `cosi.v1alpha1`.
pub mod proto {
    tonic::include_proto!("cosi.v1alpha1");
}

// Re-export the most commonly used items at crate root for convenience.
pub use access::{AccessManager, CredentialGenerator, RandomCredentials};
pub use bucket::BucketManager;
pub use connection::{Capability, Connection};
pub use error::{BackendError, CosiError};
pub use identity::DriverIdentity;
pub use types::*;
