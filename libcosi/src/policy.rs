//! Bucket access policies.
//!
//! Each grant registers one canned policy allowing every S3 action on the
//! bucket and all keys under it.  The policy is named after the bucket and
//! the principal it is bound to, so concurrent grants never overwrite one
//! another's documents.

use serde::{Deserialize, Serialize};

/// IAM policy language version understood by S3-compatible backends.
pub const POLICY_VERSION: &str = "2012-10-17";

const ALL_S3_ACTIONS: &str = "s3:*";

/// Allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// A single policy statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub effect: Effect,
    pub action: Vec<String>,
    pub resource: Vec<String>,
}

/// An IAM-style policy document, serialized as the backend expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    /// Full object-level access to `bucket` and every key under it.
    pub fn bucket_access(bucket: &str) -> Self {
        Self {
            version: POLICY_VERSION.to_owned(),
            statement: vec![Statement {
                effect: Effect::Allow,
                action: vec![ALL_S3_ACTIONS.to_owned()],
                resource: vec![bucket_arn(bucket), format!("{}/*", bucket_arn(bucket))],
            }],
        }
    }

    /// Evaluate `action` on `resource`: an explicit deny wins, otherwise any
    /// matching allow grants access.
    pub fn permits(&self, action: &str, resource: &str) -> bool {
        let matching = |effect: Effect| {
            self.statement.iter().filter(move |s| s.effect == effect).any(|s| {
                s.action.iter().any(|a| glob_match(a, action))
                    && s.resource.iter().any(|r| glob_match(r, resource))
            })
        };
        !matching(Effect::Deny) && matching(Effect::Allow)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// ARN of a bucket.
pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}")
}

/// ARN of an object inside a bucket.
pub fn object_arn(bucket: &str, key: &str) -> String {
    format!("arn:aws:s3:::{bucket}/{key}")
}

/// Name of the canned policy bound to `access_key` for `bucket`.
///
/// Deterministic, so revocation can find the policy again from the bucket
/// and principal alone.
pub fn policy_name(bucket: &str, access_key: &str) -> String {
    format!("cosi-{}-{}", bucket, access_key.to_ascii_lowercase())
}

/// Match `value` against `pattern`, where `*` matches any run of characters.
fn glob_match(pattern: &str, value: &str) -> bool {
    let (p, v) = (pattern.as_bytes(), value.as_bytes());
    let (mut pi, mut vi) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while vi < v.len() {
        if pi < p.len() && p[pi] == b'*' {
            backtrack = Some((pi, vi));
            pi += 1;
        } else if pi < p.len() && p[pi] == v[vi] {
            pi += 1;
            vi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            vi = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == b'*')
}
