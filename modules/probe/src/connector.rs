use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use sift_core::ProbeError;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};

/// Control-plane reachability check. Returns the time to connect.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, addr: SocketAddr, limit: Duration) -> Result<Duration, ProbeError>;
}

/// Plain TCP connect; the stream is dropped as soon as the handshake completes.
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: SocketAddr, limit: Duration) -> Result<Duration, ProbeError> {
        let start = Instant::now();
        match timeout(limit, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(start.elapsed()),
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => Err(ProbeError::Refused(e.to_string())),
            Ok(Err(e)) => Err(ProbeError::Io(e.to_string())),
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}
