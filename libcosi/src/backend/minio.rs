//! MinIO admin plane over the admin REST API (`/minio/admin/v3`).
//!
//! Every request is signed with SigV4 using the driver's static credentials.
//! The `add-user` body carries the new user's secret and is encrypted with
//! the admin secret (see [`crate::backend::crypt`]).

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::AdminPlane;
use crate::backend::crypt::encrypt_data;
use crate::backend::sigv4::{self, SigningParams};
use crate::error::BackendError;
use crate::policy::PolicyDocument;
use crate::types::{Credentials, Endpoint};

const ADMIN_PREFIX: &str = "/minio/admin/v3";

/// Admin requests are signed as the S3 service.
const SIGNING_SERVICE: &str = "s3";

/// Body of an `add-user` request before encryption.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddUserBody<'a> {
    secret_key: &'a str,
    status: &'a str,
}

/// Error body returned by the admin API.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AdminErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

/// [`AdminPlane`] speaking the MinIO admin API.
#[derive(Debug, Clone)]
pub struct MinioAdmin {
    http: reqwest::Client,
    endpoint: Endpoint,
    credentials: Credentials,
    region: String,
}

impl MinioAdmin {
    pub fn new(
        endpoint: &Endpoint,
        credentials: &Credentials,
        region: &str,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("rkcosi/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(BackendError::client)?;
        Ok(Self {
            http,
            endpoint: endpoint.clone(),
            credentials: credentials.clone(),
            region: region.to_owned(),
        })
    }

    /// Sign and send one admin call; non-2xx responses become
    /// [`BackendError`]s carrying the admin error code.
    async fn call(
        &self,
        method: Method,
        action: &str,
        query: &[(&str, &str)],
        body: Vec<u8>,
    ) -> Result<(), BackendError> {
        let path = format!("{ADMIN_PREFIX}/{action}");
        let query = sigv4::canonical_query(query);
        let url = if query.is_empty() {
            format!("{}{path}", self.endpoint.base_url())
        } else {
            format!("{}{path}?{query}", self.endpoint.base_url())
        };

        let host = self.endpoint.authority();
        let amz_date = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = sigv4::hash_payload(&body);
        let authorization = sigv4::authorization(
            &SigningParams {
                access_key: &self.credentials.access_key,
                secret_key: &self.credentials.secret_key,
                region: &self.region,
                service: SIGNING_SERVICE,
                amz_date: &amz_date,
            },
            method.as_str(),
            &path,
            &query,
            &[
                ("host", host.as_str()),
                ("x-amz-content-sha256", payload_hash.as_str()),
                ("x-amz-date", amz_date.as_str()),
            ],
            &payload_hash,
        );

        let response = self
            .http
            .request(method.clone(), &url)
            .header("x-amz-date", &amz_date)
            .header("x-amz-content-sha256", &payload_hash)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .body(body)
            .send()
            .await
            .map_err(BackendError::client)?;

        let status = response.status();
        if status.is_success() {
            debug!(%method, action, "MinIO admin call succeeded");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let err = match serde_json::from_str::<AdminErrorBody>(&text) {
            Ok(body) => BackendError::new(body.code, body.message),
            Err(_) => BackendError::new(format!("Http{}", status.as_u16()), text),
        };
        Err(err.with_status(status.as_u16()))
    }
}

#[async_trait]
impl AdminPlane for MinioAdmin {
    async fn add_user(&self, credentials: &Credentials) -> Result<(), BackendError> {
        let plain = serde_json::to_vec(&AddUserBody {
            secret_key: &credentials.secret_key,
            status: "enabled",
        })
        .map_err(BackendError::client)?;
        let body = encrypt_data(&self.credentials.secret_key, &plain)?;
        self.call(
            Method::PUT,
            "add-user",
            &[("accessKey", credentials.access_key.as_str())],
            body,
        )
        .await
    }

    async fn remove_user(&self, access_key: &str) -> Result<(), BackendError> {
        self.call(
            Method::DELETE,
            "remove-user",
            &[("accessKey", access_key)],
            Vec::new(),
        )
        .await
    }

    async fn add_canned_policy(
        &self,
        name: &str,
        policy: &PolicyDocument,
    ) -> Result<(), BackendError> {
        let body = policy.to_json().map_err(BackendError::client)?;
        self.call(
            Method::PUT,
            "add-canned-policy",
            &[("name", name)],
            body.into_bytes(),
        )
        .await
    }

    async fn remove_canned_policy(&self, name: &str) -> Result<(), BackendError> {
        self.call(
            Method::DELETE,
            "remove-canned-policy",
            &[("name", name)],
            Vec::new(),
        )
        .await
    }

    async fn set_policy(&self, name: &str, access_key: &str) -> Result<(), BackendError> {
        self.call(
            Method::PUT,
            "set-user-or-group-policy",
            &[
                ("policyName", name),
                ("userOrGroup", access_key),
                ("isGroup", "false"),
            ],
            Vec::new(),
        )
        .await
    }
}
