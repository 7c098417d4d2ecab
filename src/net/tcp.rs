use async_trait::async_trait;
use core::net::SocketAddr;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::ToSocketAddrs as TokioToSocketAddrs;
use tokio::net::{TcpListener as TokioTcpListener, TcpStream as TokioTcpStream};
use turmoil::ToSocketAddrs as TurmoilToSocketAddrs;
use turmoil::net::{TcpListener as TurmoilTcpListener, TcpStream as TurmoilTcpStream};

pub const STRESS_PORT: u16 = 5303; // Well-known service port for stress/bandwidth traffic

/// A connected duplex byte stream. The stress core only ever sees this
/// trait, never a concrete socket type.
#[async_trait]
pub trait ConnectStream: AsyncRead + AsyncWrite + Unpin + Send + Sized + 'static {
    async fn connect(addr: &str) -> std::io::Result<Self>;
}

#[async_trait]
impl ConnectStream for TokioTcpStream {
    async fn connect(addr: &str) -> std::io::Result<Self> {
        TokioTcpStream::connect(addr).await
    }
}

#[async_trait]
impl ConnectStream for TurmoilTcpStream {
    async fn connect(addr: &str) -> std::io::Result<Self> {
        TurmoilTcpStream::connect(addr).await
    }
}

#[async_trait]
pub trait StreamListener: Send + Sync + Unpin + Sized + 'static {
    type Stream: ConnectStream;

    async fn bind<T: TokioToSocketAddrs + TurmoilToSocketAddrs + Send>(
        addr: T,
    ) -> std::io::Result<Self>;
    async fn accept(&self) -> std::io::Result<(Self::Stream, SocketAddr)>;
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

#[async_trait]
impl StreamListener for TokioTcpListener {
    type Stream = TokioTcpStream;

    async fn bind<T: TokioToSocketAddrs + TurmoilToSocketAddrs + Send>(
        addr: T,
    ) -> std::io::Result<Self> {
        TokioTcpListener::bind(addr).await
    }

    async fn accept(&self) -> std::io::Result<(Self::Stream, SocketAddr)> {
        self.accept().await
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.local_addr()
    }
}

#[async_trait]
impl StreamListener for TurmoilTcpListener {
    type Stream = TurmoilTcpStream;

    async fn bind<T: TokioToSocketAddrs + TurmoilToSocketAddrs + Send>(
        addr: T,
    ) -> std::io::Result<Self> {
        TurmoilTcpListener::bind(addr).await
    }

    async fn accept(&self) -> std::io::Result<(Self::Stream, SocketAddr)> {
        self.accept().await
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.local_addr()
    }
}

/// Classifies accept() errors. Transient failures concern only the
/// connection being accepted; the listener itself is still healthy and
/// the accept loop should continue.
pub fn accept_error_is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_accept_errors() {
        assert!(accept_error_is_transient(&io::Error::from(
            io::ErrorKind::ConnectionReset
        )));
        assert!(accept_error_is_transient(&io::Error::from(
            io::ErrorKind::Interrupted
        )));
        // Listener teardown and resource exhaustion are fatal
        assert!(!accept_error_is_transient(&io::Error::from(
            io::ErrorKind::NotConnected
        )));
        assert!(!accept_error_is_transient(&io::Error::from(
            io::ErrorKind::OutOfMemory
        )));
    }
}
