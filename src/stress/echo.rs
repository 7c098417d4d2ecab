use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::StressError;
use super::session::alloc_buf;

pub const ECHO_CHUNK_LEN: usize = 3 * 4096; // Responder receive buffer
pub const FAREWELL: &[u8] = b"Bye!"; // Trailer sent by the farewell variant

/// What a responder saw over the lifetime of one connection.
#[derive(Debug, Clone, Copy)]
pub struct EchoStats {
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Echoes received chunks back verbatim until the peer half-closes.
///
/// Strictly sequential: receive a chunk, write it back in full, receive
/// again. The peer is expected to drain its receive direction
/// concurrently, otherwise both sides fill up and stall.
pub async fn echo<S>(stream: &mut S, chunk_len: usize) -> Result<EchoStats, StressError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let chunk = if chunk_len == 0 { ECHO_CHUNK_LEN } else { chunk_len };
    let mut buf = alloc_buf(chunk)?;

    let start = Instant::now();
    let mut total = 0u64;
    loop {
        let n = stream.read(&mut buf).await.map_err(|e| {
            StressError::ReceiveFailed {
                received: total,
                source: e,
            }
        })?;
        if n == 0 {
            break;
        }
        // write_all loops over partial writes for us
        stream
            .write_all(&buf[..n])
            .await
            .map_err(|e| StressError::SendFailed {
                sent: total,
                source: e,
            })?;
        total += n as u64;
    }

    Ok(EchoStats {
        bytes: total,
        elapsed: start.elapsed(),
    })
}

/// Echo variant for the simple echo mode: once the peer half-closes,
/// send a fixed farewell trailer before closing our side.
pub async fn echo_with_farewell<S>(
    stream: &mut S,
    chunk_len: usize,
) -> Result<EchoStats, StressError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let stats = echo(stream, chunk_len).await?;
    stream
        .write_all(FAREWELL)
        .await
        .map_err(|e| StressError::SendFailed {
            sent: stats.bytes,
            source: e,
        })?;
    stream
        .shutdown()
        .await
        .map_err(|e| StressError::SendFailed {
            sent: stats.bytes,
            source: e,
        })?;
    Ok(stats)
}

/// Pure-drain responder for bandwidth RX: read until EOF, never write.
pub async fn drain<S>(stream: &mut S, chunk_len: usize) -> Result<EchoStats, StressError>
where
    S: AsyncRead + Unpin,
{
    let chunk = if chunk_len == 0 { ECHO_CHUNK_LEN } else { chunk_len };
    let mut buf = alloc_buf(chunk)?;

    let start = Instant::now();
    let mut total = 0u64;
    loop {
        let n = stream.read(&mut buf).await.map_err(|e| {
            StressError::ReceiveFailed {
                received: total,
                source: e,
            }
        })?;
        if n == 0 {
            break;
        }
        total += n as u64;
    }

    Ok(EchoStats {
        bytes: total,
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_until_peer_closes() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let responder = tokio::spawn(async move { echo(&mut b, 0).await });

        a.write_all(b"hello").await.unwrap();
        let mut back = [0u8; 5];
        a.read_exact(&mut back).await.unwrap();
        assert_eq!(&back, b"hello");

        a.shutdown().await.unwrap();
        let stats = responder.await.unwrap().unwrap();
        assert_eq!(stats.bytes, 5);
    }

    #[tokio::test]
    async fn farewell_trailer_follows_the_echo() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        tokio::spawn(async move { echo_with_farewell(&mut b, 0).await });

        a.write_all(b"ping").await.unwrap();
        a.shutdown().await.unwrap();

        let mut all = Vec::new();
        a.read_to_end(&mut all).await.unwrap();
        assert_eq!(&all, b"pingBye!");
    }

    #[tokio::test]
    async fn drain_counts_everything() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let responder = tokio::spawn(async move { drain(&mut b, 16).await });

        a.write_all(&[7u8; 300]).await.unwrap();
        a.shutdown().await.unwrap();

        let stats = responder.await.unwrap().unwrap();
        assert_eq!(stats.bytes, 300);
    }
}
