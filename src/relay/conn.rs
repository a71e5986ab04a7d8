//! Connection capability used by the relay

use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A byte stream the relay can splice.
///
/// Reads and writes come from `AsyncRead`/`AsyncWrite`. Half-closing the
/// write side is `AsyncWriteExt::shutdown`, and the connection is fully
/// closed when the value is dropped. The relay owns each connection and
/// drops it exactly once.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Address of the remote end
    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

impl Connection for TcpStream {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }
}
