use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::error::StressError;

pub const MAX_DATA_LEN: u64 = 20 * 1024 * 1024; // Largest random payload per connection
pub const DEFAULT_CHUNK_LEN: usize = 32 * 1024; // Send chunk when the plan leaves it at 0

/// Parameters for one connection's transfer. Immutable once the session
/// starts.
#[derive(Debug, Clone, Copy)]
pub struct TransferPlan {
    pub total_bytes: u64,
    /// Largest number of bytes moved per send/receive call. 0 means
    /// [`DEFAULT_CHUNK_LEN`].
    pub chunk_len: usize,
}

impl TransferPlan {
    pub fn new(total_bytes: u64, chunk_len: usize) -> Self {
        Self {
            total_bytes,
            chunk_len,
        }
    }

    pub fn chunk(&self) -> usize {
        if self.chunk_len == 0 {
            DEFAULT_CHUNK_LEN
        } else {
            self.chunk_len
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    PeerClosedEarly,
    /// Every byte arrived, but the echoed content differs from what
    /// was sent.
    ChecksumMismatch,
    IoError(io::ErrorKind),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Produced exactly once per session. On success `bytes_sent` and
/// `bytes_received` both equal the plan's `total_bytes`; on failure they
/// hold the byte offsets reached when the session aborted.
#[derive(Debug, Clone)]
pub struct TransferResult {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub elapsed: Duration,
    pub outcome: Outcome,
}

pub(crate) fn alloc_buf(len: usize) -> Result<Vec<u8>, StressError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| StressError::AllocationFailed { len })?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Drives one duplex transfer session: transmit exactly
/// `plan.total_bytes` while concurrently receiving the same amount back.
///
/// Both directions are hashed as they go; when the byte counts line up
/// but the digests do not, the echo path corrupted the payload and the
/// session reports [`Outcome::ChecksumMismatch`].
///
/// The send side half-closes the stream once the payload is out, so a
/// well-behaved echo peer sees EOF and winds down. The first error on
/// either direction wins and the sibling direction is cancelled; the
/// stream is dropped (closed) on every exit path.
pub async fn run_duplex<S>(stream: S, plan: &TransferPlan) -> TransferResult
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let sent = AtomicU64::new(0);
    let received = AtomicU64::new(0);
    let (mut rd, mut wr) = tokio::io::split(stream);

    let start = Instant::now();
    let res = tokio::try_join!(
        send_side(&mut wr, plan, &sent),
        recv_side(&mut rd, plan, &received),
    );
    let elapsed = start.elapsed();

    let outcome = match res {
        Ok((tx_digest, rx_digest)) if tx_digest == rx_digest => Outcome::Success,
        Ok(_) => {
            debug!("checksums don't match");
            Outcome::ChecksumMismatch
        }
        Err(err) => {
            debug!("duplex session aborted: {err}");
            match err {
                StressError::PeerClosedEarly { .. } => Outcome::PeerClosedEarly,
                StressError::SendFailed { source, .. }
                | StressError::ReceiveFailed { source, .. } => Outcome::IoError(source.kind()),
                StressError::AllocationFailed { .. } => {
                    Outcome::IoError(io::ErrorKind::OutOfMemory)
                }
                _ => Outcome::IoError(io::ErrorKind::Other),
            }
        }
    };

    TransferResult {
        bytes_sent: sent.load(Ordering::Relaxed),
        bytes_received: received.load(Ordering::Relaxed),
        elapsed,
        outcome,
    }
}

async fn send_side<W>(
    wr: &mut W,
    plan: &TransferPlan,
    sent: &AtomicU64,
) -> Result<blake3::Hash, StressError>
where
    W: AsyncWrite + Unpin,
{
    let chunk = plan.chunk();
    let mut buf = alloc_buf(chunk)?;
    rand::thread_rng().fill_bytes(&mut buf);
    let mut hasher = blake3::Hasher::new();

    let mut remaining = plan.total_bytes;
    while remaining > 0 {
        let batch = chunk.min(remaining as usize);
        // Partial writes are normal; accumulate until the target is met.
        let n = wr.write(&buf[..batch]).await.map_err(|e| {
            StressError::SendFailed {
                sent: sent.load(Ordering::Relaxed),
                source: e,
            }
        })?;
        if n == 0 {
            return Err(StressError::SendFailed {
                sent: sent.load(Ordering::Relaxed),
                source: io::ErrorKind::WriteZero.into(),
            });
        }
        // Hash exactly what went out on the wire
        hasher.update(&buf[..n]);
        sent.fetch_add(n as u64, Ordering::Relaxed);
        remaining -= n as u64;
    }

    // Half-close: tells the peer we are done sending.
    wr.shutdown().await.map_err(|e| StressError::SendFailed {
        sent: sent.load(Ordering::Relaxed),
        source: e,
    })?;
    Ok(hasher.finalize())
}

async fn recv_side<R>(
    rd: &mut R,
    plan: &TransferPlan,
    received: &AtomicU64,
) -> Result<blake3::Hash, StressError>
where
    R: AsyncRead + Unpin,
{
    let chunk = plan.chunk();
    let mut buf = alloc_buf(chunk)?;
    let mut hasher = blake3::Hasher::new();

    let mut total = 0u64;
    while total < plan.total_bytes {
        let want = chunk.min((plan.total_bytes - total) as usize);
        let n = rd.read(&mut buf[..want]).await.map_err(|e| {
            StressError::ReceiveFailed {
                received: total,
                source: e,
            }
        })?;
        if n == 0 {
            // Orderly shutdown is only fine once everything arrived.
            return Err(StressError::PeerClosedEarly {
                received: total,
                expected: plan.total_bytes,
            });
        }
        hasher.update(&buf[..n]);
        total += n as u64;
        received.fetch_add(n as u64, Ordering::Relaxed);
    }
    Ok(hasher.finalize())
}
