//! `rkcosi`: COSI provisioner for MinIO-compatible object stores.
//!
//! Connects to the object store (giving up on timeout or on SIGINT/SIGTERM),
//! then serves the `cosi.v1alpha1.Provisioner` gRPC service until a shutdown
//! signal arrives.

mod config;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use libcosi::backend::S3Connector;
use libcosi::transport::server::DriverServer;
use libcosi::transport::{self, ListenAddress};
use libcosi::{Connection, Credentials, DriverIdentity};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use crate::config::Args;

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM, only ctrl-c stops the driver");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = term.recv() => info!("received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log_format)?;

    let identity = DriverIdentity::new(&args.driver_name, env!("CARGO_PKG_VERSION"));
    identity.validate().context("invalid driver identity")?;
    let listen: ListenAddress = args
        .listen_address
        .parse()
        .context("invalid listen address")?;

    info!(
        driver = %identity.identity(),
        endpoint = %args.s3_endpoint,
        listen = %listen,
        "starting COSI driver"
    );

    let timeout = args.connect_timeout();
    let cancel = async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => warn!(?timeout, "object store connection timed out"),
            _ = shutdown_signal() => {}
        }
    };
    let connection = Connection::connect(
        &args.s3_endpoint,
        Credentials::new(&args.access_key, &args.secret_key),
        &S3Connector::new(&args.region),
        cancel,
    )
    .await
    .with_context(|| format!("failed to connect to {}", args.s3_endpoint))?;
    if !connection.is_admin_capable() {
        warn!("object store granted data-plane access only; grant and revoke are disabled");
    }

    let listener = listen
        .bind()
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    let driver = DriverServer::new(identity, &connection);

    transport::serve(listener, driver, shutdown_signal())
        .await
        .context("gRPC server failed")?;
    info!("COSI driver stopped");
    Ok(())
}
