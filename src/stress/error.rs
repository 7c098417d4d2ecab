use std::io;
use thiserror::Error;

/// Everything that can go wrong while stressing a transport. Byte
/// offsets are carried so a failure can be logged with how far the
/// transfer got.
#[derive(Debug, Error)]
pub enum StressError {
    #[error("failed to connect: {0}")]
    ConnectFailed(#[source] io::Error),

    // tokio binds and listens in one call, so listen failures surface here too
    #[error("failed to bind listener: {0}")]
    BindFailed(#[source] io::Error),

    #[error("failed to accept connection: {0}")]
    AcceptFailed(#[source] io::Error),

    #[error("send failed after {sent} bytes: {source}")]
    SendFailed {
        sent: u64,
        #[source]
        source: io::Error,
    },

    #[error("receive failed after {received} bytes: {source}")]
    ReceiveFailed {
        received: u64,
        #[source]
        source: io::Error,
    },

    #[error("peer closed after {received} of {expected} bytes")]
    PeerClosedEarly { received: u64, expected: u64 },

    #[error("failed to allocate a {len} byte buffer")]
    AllocationFailed { len: usize },
}
