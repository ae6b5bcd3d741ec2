//! Command-line and environment configuration for `rkcosi`.
//!
//! Every flag falls back to an environment variable, so the driver can be
//! configured entirely from a pod spec.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use libcosi::backend::s3::DEFAULT_REGION;
use libcosi::identity::DEFAULT_DRIVER_NAME;

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// COSI provisioner for MinIO-compatible object stores.
#[derive(Parser, Debug)]
#[command(name = "rkcosi", version, about)]
pub struct Args {
    /// gRPC listen address (tcp://ip:port or unix:///path)
    #[arg(long, env = "LISTEN_ADDRESS", default_value = "tcp://0.0.0.0:9000")]
    pub listen_address: String,

    /// Object store endpoint; the scheme selects TLS (http or https)
    #[arg(long, env = "S3_ENDPOINT")]
    pub s3_endpoint: String,

    /// Access key of the object store admin account
    #[arg(long, env = "ACCESS_KEY", hide_env_values = true)]
    pub access_key: String,

    /// Secret key of the object store admin account
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Driver name reported to the COSI sidecar
    #[arg(long, env = "DRIVER_NAME", default_value = DEFAULT_DRIVER_NAME)]
    pub driver_name: String,

    /// Region for created buckets and request signing
    #[arg(long, env = "S3_REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Seconds to wait for the object store before giving up at startup
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value_t = 30)]
    pub connect_timeout_secs: u64,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

impl Args {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
