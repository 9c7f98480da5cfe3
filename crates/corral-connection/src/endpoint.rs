//! Transport endpoints
//!
//! The control plane runs over stream sockets, either networked (TCP) or
//! local (Unix domain). TLS always runs on top; these helpers only dial and
//! bind the raw socket.

use crate::session::BoxedStream;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// Kind of stream socket carrying a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Networked stream socket; targets are `host:port`
    #[default]
    Tcp,
    /// Local stream socket; targets are filesystem paths
    #[cfg(unix)]
    Unix,
}

impl TransportKind {
    /// Dial a raw stream to `target`
    pub async fn connect(self, target: &str) -> std::io::Result<BoxedStream> {
        match self {
            TransportKind::Tcp => {
                let stream = TcpStream::connect(target).await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            TransportKind::Unix => {
                let stream = UnixStream::connect(target).await?;
                Ok(Box::new(stream))
            }
        }
    }

    /// Bind a listener on `addr`
    pub async fn bind(self, addr: &str) -> std::io::Result<Listener> {
        match self {
            TransportKind::Tcp => Ok(Listener::Tcp(TcpListener::bind(addr).await?)),
            #[cfg(unix)]
            TransportKind::Unix => Ok(Listener::Unix(UnixListener::bind(addr)?)),
        }
    }
}

/// A bound stream-socket listener
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Listener {
    /// Accept one raw connection
    pub async fn accept(&self) -> std::io::Result<BoxedStream> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Box::new(stream))
            }
        }
    }

    /// The bound socket address (TCP only)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Listener::Unix(_) => None,
        }
    }
}

/// Host portion of a `host:port` target, used as the default TLS server name
pub fn host_of(target: &str) -> &str {
    let host = match target.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => target,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}
