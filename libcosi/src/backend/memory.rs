//! In-memory object store.
//!
//! [`MemoryBackend`] implements [`DataPlane`], [`AdminPlane`] and
//! [`Connector`] over concurrent maps, mirroring the error codes a MinIO
//! server returns.  Faults can be injected per [`Operation`] to exercise
//! failure paths, and [`MemoryBackend::authorize`] evaluates a user's bound
//! policy so grant scoping and revocation can be checked end to end.
//!
//! Clones share state.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::backend::{AdminPlane, Connector, DataPlane};
use crate::error::{BackendError, codes};
use crate::policy::PolicyDocument;
use crate::types::{Credentials, Endpoint};

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    BucketExists,
    MakeBucket,
    RemoveBucket,
    AddUser,
    RemoveUser,
    AddCannedPolicy,
    RemoveCannedPolicy,
    SetPolicy,
    ConnectData,
    ConnectAdmin,
}

#[derive(Debug, Clone)]
struct User {
    secret_key: String,
    policy: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    buckets: DashMap<String, ()>,
    users: DashMap<String, User>,
    policies: DashMap<String, PolicyDocument>,
    faults: DashMap<Operation, BackendError>,
}

/// Shared in-memory backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `op` fail with `err` until [`Self::clear_fault`].
    pub fn fail(&self, op: Operation, err: BackendError) {
        self.state.faults.insert(op, err);
    }

    pub fn clear_fault(&self, op: Operation) {
        self.state.faults.remove(&op);
    }

    fn check(&self, op: Operation) -> Result<(), BackendError> {
        match self.state.faults.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.state.buckets.contains_key(bucket)
    }

    pub fn has_user(&self, access_key: &str) -> bool {
        self.state.users.contains_key(access_key)
    }

    pub fn has_policy(&self, name: &str) -> bool {
        self.state.policies.contains_key(name)
    }

    pub fn user_count(&self) -> usize {
        self.state.users.len()
    }

    pub fn policy_count(&self) -> usize {
        self.state.policies.len()
    }

    /// Name of the policy bound to `access_key`, if any.
    pub fn bound_policy(&self, access_key: &str) -> Option<String> {
        self.state
            .users
            .get(access_key)
            .and_then(|u| u.policy.clone())
    }

    /// Authenticate `credentials` and evaluate their bound policy for
    /// `action` on `resource`.
    pub fn authorize(
        &self,
        credentials: &Credentials,
        action: &str,
        resource: &str,
    ) -> Result<(), BackendError> {
        let user = self
            .state
            .users
            .get(&credentials.access_key)
            .map(|u| u.clone())
            .filter(|u| u.secret_key == credentials.secret_key)
            .ok_or_else(|| {
                BackendError::new(
                    codes::INVALID_ACCESS_KEY_ID,
                    "The Access Key Id you provided does not exist in our records.",
                )
                .with_status(403)
            })?;

        let allowed = user
            .policy
            .and_then(|name| self.state.policies.get(&name).map(|p| p.clone()))
            .is_some_and(|policy| policy.permits(action, resource));
        if allowed {
            Ok(())
        } else {
            Err(BackendError::new(codes::ACCESS_DENIED, "Access Denied.").with_status(403))
        }
    }
}

fn no_such_user(access_key: &str) -> BackendError {
    BackendError::new(
        codes::NO_SUCH_USER,
        format!("The specified user {access_key} does not exist."),
    )
    .with_status(404)
}

fn no_such_policy(name: &str) -> BackendError {
    BackendError::new(
        codes::NO_SUCH_POLICY,
        format!("The canned policy {name} does not exist."),
    )
    .with_status(404)
}

#[async_trait]
impl DataPlane for MemoryBackend {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, BackendError> {
        self.check(Operation::BucketExists)?;
        Ok(self.has_bucket(bucket))
    }

    async fn make_bucket(&self, bucket: &str, _region: Option<&str>) -> Result<(), BackendError> {
        self.check(Operation::MakeBucket)?;
        if self.state.buckets.insert(bucket.to_owned(), ()).is_some() {
            return Err(BackendError::new(
                codes::BUCKET_ALREADY_OWNED_BY_YOU,
                "Your previous request to create the named bucket succeeded and you already own it.",
            )
            .with_status(409));
        }
        debug!(bucket, "memory bucket created");
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &str) -> Result<(), BackendError> {
        self.check(Operation::RemoveBucket)?;
        self.state
            .buckets
            .remove(bucket)
            .map(|_| ())
            .ok_or_else(|| {
                BackendError::new(codes::NO_SUCH_BUCKET, "The specified bucket does not exist")
                    .with_status(404)
            })
    }
}

#[async_trait]
impl AdminPlane for MemoryBackend {
    async fn add_user(&self, credentials: &Credentials) -> Result<(), BackendError> {
        self.check(Operation::AddUser)?;
        self.state.users.insert(
            credentials.access_key.clone(),
            User {
                secret_key: credentials.secret_key.clone(),
                policy: None,
            },
        );
        Ok(())
    }

    async fn remove_user(&self, access_key: &str) -> Result<(), BackendError> {
        self.check(Operation::RemoveUser)?;
        self.state
            .users
            .remove(access_key)
            .map(|_| ())
            .ok_or_else(|| no_such_user(access_key))
    }

    async fn add_canned_policy(
        &self,
        name: &str,
        policy: &PolicyDocument,
    ) -> Result<(), BackendError> {
        self.check(Operation::AddCannedPolicy)?;
        self.state.policies.insert(name.to_owned(), policy.clone());
        Ok(())
    }

    async fn remove_canned_policy(&self, name: &str) -> Result<(), BackendError> {
        self.check(Operation::RemoveCannedPolicy)?;
        self.state
            .policies
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| no_such_policy(name))
    }

    async fn set_policy(&self, name: &str, access_key: &str) -> Result<(), BackendError> {
        self.check(Operation::SetPolicy)?;
        if !self.has_policy(name) {
            return Err(no_such_policy(name));
        }
        let mut user = self
            .state
            .users
            .get_mut(access_key)
            .ok_or_else(|| no_such_user(access_key))?;
        user.policy = Some(name.to_owned());
        Ok(())
    }
}

#[async_trait]
impl Connector for MemoryBackend {
    async fn data_plane(
        &self,
        _endpoint: &Endpoint,
        _credentials: &Credentials,
    ) -> Result<Arc<dyn DataPlane>, BackendError> {
        self.check(Operation::ConnectData)?;
        Ok(Arc::new(self.clone()))
    }

    async fn admin_plane(
        &self,
        _endpoint: &Endpoint,
        _credentials: &Credentials,
    ) -> Result<Arc<dyn AdminPlane>, BackendError> {
        self.check(Operation::ConnectAdmin)?;
        Ok(Arc::new(self.clone()))
    }
}
