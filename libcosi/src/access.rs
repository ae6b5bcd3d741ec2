//! Bucket access grants and revocation.
//!
//! A grant is a strictly ordered sequence against the admin plane:
//!
//! 1. generate fresh credentials,
//! 2. create a user for them,
//! 3. build a policy document scoped to the bucket,
//! 4. register it under a name derived from bucket and access key,
//! 5. bind it to the user, replacing any earlier binding.
//!
//! Each completed backend step records its compensating action.  When a
//! later step fails the recorded actions are run in reverse, and the caller
//! receives [`CosiError::PartialFailure`] describing both the failure and
//! the cleanup outcome.  The sequence runs on its own task, so a caller that
//! goes away mid-grant cannot leave it half-finished.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{Instrument, Span, debug, info, instrument, warn};

use crate::backend::AdminPlane;
use crate::connection::Capability;
use crate::error::{BackendError, Cleanup, CosiError, GrantStep};
use crate::policy::{PolicyDocument, policy_name};
use crate::types::Credentials;

const ACCESS_KEY_LEN: usize = 20;
const SECRET_KEY_LEN: usize = 40;
const ACCESS_KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// ---------------------------------------------------------------------------
// Credential generation
// ---------------------------------------------------------------------------

/// Source of per-grant credentials.
pub trait CredentialGenerator: Send + Sync {
    fn generate(&self) -> Credentials;
}

/// Random credentials in the usual AWS shape: a 20-character upper-case
/// alphanumeric access key and a 40-character alphanumeric secret.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCredentials;

impl CredentialGenerator for RandomCredentials {
    fn generate(&self) -> Credentials {
        let mut rng = rand::rng();
        let access_key: String = (0..ACCESS_KEY_LEN)
            .map(|_| ACCESS_KEY_CHARSET[rng.random_range(0..ACCESS_KEY_CHARSET.len())] as char)
            .collect();
        let secret_key: String = (&mut rng)
            .sample_iter(Alphanumeric)
            .take(SECRET_KEY_LEN)
            .map(char::from)
            .collect();
        Credentials::new(access_key, secret_key)
    }
}

// ---------------------------------------------------------------------------
// Compensation
// ---------------------------------------------------------------------------

/// Undo action for a completed grant step.
enum Compensation {
    RemoveUser(String),
    RemoveCannedPolicy(String),
}

impl Compensation {
    async fn run(&self, admin: &dyn AdminPlane) -> Result<(), BackendError> {
        match self {
            Self::RemoveUser(access_key) => admin.remove_user(access_key).await,
            Self::RemoveCannedPolicy(name) => admin.remove_canned_policy(name).await,
        }
    }
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoveUser(access_key) => write!(f, "remove user {access_key}"),
            Self::RemoveCannedPolicy(name) => write!(f, "remove policy {name}"),
        }
    }
}

/// Run `undo` in reverse and build the resulting partial-failure error.
async fn compensate(
    admin: &dyn AdminPlane,
    step: GrantStep,
    source: BackendError,
    undo: Vec<Compensation>,
) -> CosiError {
    warn!(%step, error = %source, "grant step failed, undoing completed steps");

    // Reverse order removes the policy before the user; deleting the user
    // also drops a binding the backend applied but failed to acknowledge.
    let mut left_behind = Vec::new();
    for action in undo.iter().rev() {
        match action.run(admin).await {
            Ok(()) => debug!(%action, "compensating action succeeded"),
            Err(e) => {
                warn!(%action, error = %e, "compensating action failed");
                left_behind.push(format!("{action}: {e}"));
            }
        }
    }

    let cleanup = if left_behind.is_empty() {
        Cleanup::Completed
    } else {
        Cleanup::Failed(left_behind)
    };
    CosiError::PartialFailure {
        step,
        source,
        cleanup,
    }
}

async fn run_grant(
    admin: Arc<dyn AdminPlane>,
    bucket: String,
    credentials: Credentials,
) -> Result<(), CosiError> {
    let access_key = credentials.access_key.as_str();
    let mut undo = Vec::with_capacity(2);

    admin
        .add_user(&credentials)
        .await
        .map_err(|e| CosiError::backend(format!("create user {access_key}"), e))?;
    undo.push(Compensation::RemoveUser(access_key.to_owned()));
    debug!(principal = access_key, "user created");

    let policy = PolicyDocument::bucket_access(&bucket);
    let name = policy_name(&bucket, access_key);
    if let Err(e) = admin.add_canned_policy(&name, &policy).await {
        return Err(compensate(admin.as_ref(), GrantStep::AddPolicy, e, undo).await);
    }
    undo.push(Compensation::RemoveCannedPolicy(name.clone()));
    debug!(policy = %name, "canned policy registered");

    if let Err(e) = admin.set_policy(&name, access_key).await {
        return Err(compensate(admin.as_ref(), GrantStep::SetPolicy, e, undo).await);
    }

    info!(bucket = %bucket, principal = access_key, policy = %name, "bucket access granted");
    Ok(())
}

// ---------------------------------------------------------------------------
// AccessManager
// ---------------------------------------------------------------------------

/// Issues and revokes per-bucket credentials through the admin plane.
#[derive(Clone)]
pub struct AccessManager {
    capability: Capability,
    generator: Arc<dyn CredentialGenerator>,
}

impl AccessManager {
    pub fn new(capability: Capability, generator: Arc<dyn CredentialGenerator>) -> Self {
        Self {
            capability,
            generator,
        }
    }

    fn admin(&self, operation: &str) -> Result<Arc<dyn AdminPlane>, CosiError> {
        self.capability.admin().cloned().ok_or_else(|| {
            CosiError::Unsupported(format!("{operation} requires admin-plane access"))
        })
    }

    /// Issue credentials that can act on `bucket` and nothing else.
    ///
    /// The secret is returned to the caller and not kept anywhere.
    #[instrument(skip(self))]
    pub async fn grant_access(&self, bucket: &str) -> Result<Credentials, CosiError> {
        let admin = self.admin("grant bucket access")?;
        let credentials = self.generator.generate();

        let grant = run_grant(admin, bucket.to_owned(), credentials.clone());
        tokio::spawn(grant.instrument(Span::current()))
            .await
            .map_err(|e| CosiError::Internal(format!("grant task failed: {e}")))??;

        Ok(credentials)
    }

    /// Delete `principal`, which invalidates every policy binding it had.
    ///
    /// When `bucket` is known, the policy created for this principal by
    /// [`Self::grant_access`] is removed too; failing to do so is only
    /// logged.
    #[instrument(skip(self))]
    pub async fn revoke_access(
        &self,
        principal: &str,
        bucket: Option<&str>,
    ) -> Result<(), CosiError> {
        let admin = self.admin("revoke bucket access")?;

        admin
            .remove_user(principal)
            .await
            .map_err(|e| CosiError::backend(format!("remove user {principal}"), e))?;

        if let Some(bucket) = bucket.filter(|b| !b.is_empty()) {
            let name = policy_name(bucket, principal);
            if let Err(e) = admin.remove_canned_policy(&name).await {
                warn!(policy = %name, error = %e, "failed to remove policy of revoked principal");
            }
        }

        info!(principal, "bucket access revoked");
        Ok(())
    }
}
