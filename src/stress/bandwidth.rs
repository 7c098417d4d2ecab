use std::time::{Duration, Instant};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::error::StressError;
use super::session::{Outcome, TransferResult, alloc_buf};

pub const BW_TOTAL_BYTES: u64 = 1024 * 1024 * 1024; // Payload per bandwidth iteration (1 GiB)
pub const BW_CHUNK_LEN: usize = 2 * 1024 * 1024; // Message size when none is given

/// Throughput in megabits per second, or `None` for a degenerate
/// zero-duration measurement.
pub fn megabits_per_sec(bytes: u64, elapsed: Duration) -> Option<u64> {
    let ns = elapsed.as_nanos();
    if ns == 0 {
        return None;
    }
    Some(((8u128 * bytes as u128 * 1_000_000_000) / (ns * 1024 * 1024)) as u64)
}

/// Bandwidth TX: push `total_bytes` down the stream in `chunk_len`
/// sized messages and time the whole transfer. One-directional; the
/// peer is expected to drain and never write back.
pub async fn bw_tx<S>(
    stream: &mut S,
    total_bytes: u64,
    chunk_len: usize,
) -> Result<TransferResult, StressError>
where
    S: AsyncWrite + Unpin,
{
    let chunk = if chunk_len == 0 { BW_CHUNK_LEN } else { chunk_len };
    let buf = alloc_buf(chunk)?;
    debug!("bw_tx: chunk={chunk} total={total_bytes}");

    let start = Instant::now();
    let mut sent = 0u64;
    while sent < total_bytes {
        let batch = chunk.min((total_bytes - sent) as usize);
        stream
            .write_all(&buf[..batch])
            .await
            .map_err(|e| StressError::SendFailed { sent, source: e })?;
        sent += batch as u64;
    }
    stream
        .shutdown()
        .await
        .map_err(|e| StressError::SendFailed { sent, source: e })?;

    Ok(TransferResult {
        bytes_sent: sent,
        bytes_received: 0,
        elapsed: start.elapsed(),
        outcome: Outcome::Success,
    })
}
