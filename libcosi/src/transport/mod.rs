//! gRPC transport for the COSI provisioner.
//!
//! [`server::DriverServer`] implements the generated `Provisioner` service.
//! This module resolves the listen address, binds TCP or Unix-domain
//! listeners and runs the tonic server until shutdown.

pub mod server;

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use tokio::net::{TcpListener, UnixListener};
use tokio_stream::wrappers::{TcpListenerStream, UnixListenerStream};
use tonic::transport::Server;
use tracing::{info, warn};
use url::Url;

use crate::error::CosiError;
use crate::proto::provisioner_server::ProvisionerServer;
use server::DriverServer;

/// Where the gRPC service listens: `tcp://ip:port` or `unix:///path`.
///
/// A bare `ip:port` is taken as TCP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl FromStr for ListenAddress {
    type Err = CosiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Self::Tcp(addr));
        }

        let url = Url::parse(s)
            .map_err(|e| CosiError::Configuration(format!("invalid listen address {s}: {e}")))?;
        match url.scheme() {
            "tcp" => {
                let host = url.host_str().unwrap_or_default();
                let port = url.port().ok_or_else(|| {
                    CosiError::Configuration(format!("listen address {s} has no port"))
                })?;
                format!("{host}:{port}")
                    .parse()
                    .map(Self::Tcp)
                    .map_err(|e| CosiError::Configuration(format!("invalid listen address {s}: {e}")))
            }
            "unix" => {
                let path = url.path();
                if path.is_empty() || path == "/" {
                    return Err(CosiError::Configuration(format!(
                        "listen address {s} has no socket path"
                    )));
                }
                Ok(Self::Unix(PathBuf::from(path)))
            }
            other => Err(CosiError::Configuration(format!(
                "unsupported listen address scheme '{other}', expected tcp or unix"
            ))),
        }
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

impl ListenAddress {
    /// Bind the listener. A stale Unix socket file at the path is replaced.
    pub async fn bind(&self) -> Result<Listener, CosiError> {
        match self {
            Self::Tcp(addr) => {
                let listener = TcpListener::bind(addr).await.map_err(CosiError::transport)?;
                Ok(Listener::Tcp(listener))
            }
            Self::Unix(path) => {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => warn!(path = %path.display(), "removed stale socket file"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(CosiError::transport(e)),
                }
                let listener = UnixListener::bind(path).map_err(CosiError::transport)?;
                Ok(Listener::Unix {
                    listener,
                    path: path.clone(),
                })
            }
        }
    }
}

/// A bound listener, ready for [`serve`].
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Unix { listener: UnixListener, path: PathBuf },
}

impl Listener {
    /// Bound TCP address; `None` for Unix sockets.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok(),
            Self::Unix { .. } => None,
        }
    }
}

/// Serve `driver` on `listener` until `shutdown` completes.
///
/// A Unix socket file is removed once the server stops.
pub async fn serve<F>(listener: Listener, driver: DriverServer, shutdown: F) -> Result<(), CosiError>
where
    F: Future<Output = ()> + Send,
{
    let router = Server::builder().add_service(ProvisionerServer::new(driver));

    let result = match listener {
        Listener::Tcp(listener) => {
            if let Ok(addr) = listener.local_addr() {
                info!(%addr, "COSI provisioner listening");
            }
            router
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
                .await
        }
        Listener::Unix { listener, path } => {
            info!(path = %path.display(), "COSI provisioner listening");
            let result = router
                .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown)
                .await;
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove socket file");
            }
            result
        }
    };

    info!("COSI provisioner stopped");
    result.map_err(CosiError::transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tcp_addresses() {
        assert_eq!(
            "tcp://0.0.0.0:9000".parse::<ListenAddress>().unwrap(),
            ListenAddress::Tcp("0.0.0.0:9000".parse().unwrap())
        );
        assert_eq!(
            "127.0.0.1:7000".parse::<ListenAddress>().unwrap(),
            ListenAddress::Tcp("127.0.0.1:7000".parse().unwrap())
        );
        assert_eq!(
            "tcp://[::1]:9000".parse::<ListenAddress>().unwrap(),
            ListenAddress::Tcp("[::1]:9000".parse().unwrap())
        );
    }

    #[test]
    fn parse_unix_address() {
        assert_eq!(
            "unix:///var/lib/cosi/cosi.sock"
                .parse::<ListenAddress>()
                .unwrap(),
            ListenAddress::Unix(PathBuf::from("/var/lib/cosi/cosi.sock"))
        );
    }

    #[test]
    fn reject_other_schemes() {
        assert!(matches!(
            "http://0.0.0.0:9000".parse::<ListenAddress>(),
            Err(CosiError::Configuration(_))
        ));
        assert!(matches!(
            "tcp://0.0.0.0".parse::<ListenAddress>(),
            Err(CosiError::Configuration(_))
        ));
        assert!(matches!(
            "unix://".parse::<ListenAddress>(),
            Err(CosiError::Configuration(_))
        ));
    }

    #[test]
    fn display_round_trips_scheme() {
        let addr: ListenAddress = "tcp://127.0.0.1:9000".parse().unwrap();
        assert_eq!(addr.to_string(), "tcp://127.0.0.1:9000");
    }

    #[tokio::test]
    async fn bind_unix_replaces_stale_socket() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cosi.sock");
        std::fs::write(&path, b"stale").unwrap();

        let listener = ListenAddress::Unix(path.clone()).bind().await.unwrap();
        assert!(listener.local_addr().is_none());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn bind_tcp_ephemeral_port() {
        let listener = ListenAddress::Tcp("127.0.0.1:0".parse().unwrap())
            .bind()
            .await
            .unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
