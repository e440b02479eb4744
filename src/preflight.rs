//! # Rendezvous preflight check.
//!
//! Best-effort check that the rendezvous endpoint is usable before any worker
//! is spawned:
//!
//! ```text
//! connect(addr:port, timeout) ── ok ──► Listening   (someone already serves it)
//!        │
//!        └─ err ──► bind(addr:port) ── ok ──► Bindable (released immediately)
//!                          │
//!                          └─ err ──► LaunchError::EndpointUnavailable
//! ```
//!
//! The bind goes through a plain [`TcpSocket`] without `SO_REUSEADDR`
//! (`TcpListener::bind` would set it), so a port held by an unrelated socket
//! that is bound but not listening is reported as unavailable.
//!
//! The result is advisory. A worker binding the port later can still lose a
//! race against an unrelated process; making the check atomic with the spawn
//! would need a lock outside the launcher.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio::time;

use crate::error::LaunchError;

/// Outcome of a successful preflight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointStatus {
    /// A connection succeeded: another party is listening.
    Listening,
    /// Nothing answered, but the address/port can be bound locally.
    Bindable,
}

impl EndpointStatus {
    /// Short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::Listening => "listening",
            EndpointStatus::Bindable => "bindable",
        }
    }
}

/// Checks that `addr:port` is either served by someone or bindable by us.
pub async fn check_endpoint(
    addr: &str,
    port: u16,
    timeout: Duration,
) -> Result<EndpointStatus, LaunchError> {
    match time::timeout(timeout, TcpStream::connect((addr, port))).await {
        Ok(Ok(_stream)) => return Ok(EndpointStatus::Listening),
        Ok(Err(e)) => tracing::debug!(addr, port, error = %e, "rendezvous connect failed"),
        Err(_elapsed) => tracing::debug!(addr, port, ?timeout, "rendezvous connect timed out"),
    }

    match try_bind(addr, port).await {
        Ok(()) => Ok(EndpointStatus::Bindable),
        Err(source) => Err(LaunchError::EndpointUnavailable {
            endpoint: format!("{addr}:{port}"),
            source,
        }),
    }
}

/// Binds every resolved address in turn; the socket is released on return.
async fn try_bind(addr: &str, port: u16) -> io::Result<()> {
    let mut last_err = None;
    for sa in lookup_host((addr, port)).await? {
        match bind_once(sa) {
            Ok(()) => return Ok(()),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "address resolved to nothing")
    }))
}

fn bind_once(sa: SocketAddr) -> io::Result<()> {
    let socket = match sa {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.bind(sa)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(300);

    #[tokio::test]
    async fn listening_endpoint_is_trusted() {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let status = check_endpoint("127.0.0.1", port, SHORT).await.unwrap();
        assert_eq!(status, EndpointStatus::Listening);
    }

    #[tokio::test]
    async fn free_port_is_bindable() {
        let port = {
            let l = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
            l.local_addr().unwrap().port()
        };

        let status = check_endpoint("127.0.0.1", port, SHORT).await.unwrap();
        assert_eq!(status, EndpointStatus::Bindable);
    }

    /// Binds a socket without listening on it, optionally with `SO_REUSEADDR`.
    fn hold_port(reuseaddr: bool) -> (TcpSocket, u16) {
        let socket = TcpSocket::new_v4().unwrap();
        socket.set_reuseaddr(reuseaddr).unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    #[tokio::test]
    async fn port_held_by_unrelated_socket_is_unavailable() {
        for reuseaddr in [false, true] {
            let (_holder, port) = hold_port(reuseaddr);

            let err = check_endpoint("127.0.0.1", port, SHORT).await.unwrap_err();
            match err {
                LaunchError::EndpointUnavailable { source, .. } => {
                    assert_eq!(source.kind(), io::ErrorKind::AddrInUse, "reuseaddr={reuseaddr}");
                }
                other => panic!("unexpected: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn foreign_address_is_unavailable() {
        // TEST-NET-1: never routable and never a local interface.
        let err = check_endpoint("192.0.2.1", 29500, SHORT).await.unwrap_err();
        match err {
            LaunchError::EndpointUnavailable { endpoint, .. } => assert_eq!(endpoint, "192.0.2.1:29500"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
