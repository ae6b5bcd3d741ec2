//! Core COSI types: backend endpoint, access credentials, and the credentials
//! file handed back to the sidecar.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::CosiError;

/// Relative path, inside the workload's credentials volume, of the rendered
/// credentials file.
pub const CREDENTIALS_FILE_PATH: &str = ".aws/credentials";

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// An access-key / secret-key pair.
///
/// Used both for the driver's own static backend credentials and for the
/// per-grant credentials issued to workloads.  `Debug` never prints the
/// secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Render the AWS shared-credentials profile block for these credentials.
    pub fn credentials_file(&self) -> String {
        format!(
            "[default]\naws_access_key_id {}\naws_secret_access_key {}",
            self.access_key, self.secret_key
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// A parsed object-store endpoint.
///
/// The scheme selects transport security: `http` is plain, `https` is TLS.
/// Any other scheme is rejected at parse time, before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    secure: bool,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, CosiError> {
        if raw.trim().is_empty() {
            return Err(CosiError::Configuration(
                "object store endpoint cannot be empty".into(),
            ));
        }
        let url = Url::parse(raw)
            .map_err(|e| CosiError::Configuration(format!("invalid endpoint {raw}: {e}")))?;
        let secure = match url.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(CosiError::Configuration(format!(
                    "invalid url scheme '{other}' for object store endpoint, expected http or https"
                )));
            }
        };
        if url.host_str().is_none_or(str::is_empty) {
            return Err(CosiError::Configuration(format!(
                "object store endpoint {raw} has no host"
            )));
        }
        Ok(Self { url, secure })
    }

    /// `true` when the endpoint uses TLS.
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// `host[:port]` as sent in the `Host` header.
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        }
    }

    /// `scheme://host[:port]`, without path or trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.url.scheme(), self.authority())
    }
}

impl FromStr for Endpoint {
    type Err = CosiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_file_contents() {
        let creds = Credentials::new("AK123", "SK456");
        assert_eq!(
            creds.credentials_file(),
            "[default]\naws_access_key_id AK123\naws_secret_access_key SK456"
        );
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let creds = Credentials::new("AK123", "SK456");
        let printed = format!("{creds:?}");
        assert!(printed.contains("AK123"));
        assert!(!printed.contains("SK456"));
    }

    #[test]
    fn endpoint_http_is_insecure() {
        let ep = Endpoint::parse("http://minio.local:9000").unwrap();
        assert!(!ep.secure());
        assert_eq!(ep.authority(), "minio.local:9000");
        assert_eq!(ep.base_url(), "http://minio.local:9000");
    }

    #[test]
    fn endpoint_https_is_secure() {
        let ep = Endpoint::parse("https://s3.example.com/").unwrap();
        assert!(ep.secure());
        assert_eq!(ep.authority(), "s3.example.com");
    }

    #[test]
    fn endpoint_rejects_unknown_scheme() {
        let err = Endpoint::parse("ftp://host").unwrap_err();
        assert!(matches!(err, CosiError::Configuration(_)));
    }

    #[test]
    fn endpoint_rejects_missing_scheme_and_empty() {
        assert!(matches!(
            Endpoint::parse("minio.local:9000"),
            Err(CosiError::Configuration(_))
        ));
        assert!(matches!(
            Endpoint::parse(""),
            Err(CosiError::Configuration(_))
        ));
    }
}
