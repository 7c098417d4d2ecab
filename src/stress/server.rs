use core::net::SocketAddr;

use tokio::net::ToSocketAddrs as TokioToSocketAddrs;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use turmoil::ToSocketAddrs as TurmoilToSocketAddrs;

use crate::net::{StreamListener, accept_error_is_transient};

use super::echo::{drain, echo, echo_with_farewell};
use super::error::StressError;

/// What a spawned responder does with its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderMode {
    /// Echo received bytes back until the peer half-closes.
    Echo,
    /// Echo, then send the farewell trailer (simple echo mode).
    EchoFarewell,
    /// Read and discard until EOF (bandwidth RX).
    Drain,
}

/// Accepts connections and hands each one to its own responder task.
///
/// Responders are tracked in a JoinSet rather than detached, so the
/// dispatcher can reap their panics and wait for in-flight connections
/// when it stops. Concurrency is unbounded on purpose: piling up
/// responders is part of the stress.
pub struct Dispatcher<L: StreamListener> {
    listener: L,
    mode: ResponderMode,
    chunk_len: usize,
}

impl<L: StreamListener> Dispatcher<L> {
    pub async fn bind<T: TokioToSocketAddrs + TurmoilToSocketAddrs + Send>(
        addr: T,
        mode: ResponderMode,
        chunk_len: usize,
    ) -> Result<Self, StressError> {
        let listener = L::bind(addr).await.map_err(StressError::BindFailed)?;
        Ok(Self {
            listener,
            mode,
            chunk_len,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts forever. Returns only on a fatal listener error.
    pub async fn serve(&self) -> Result<(), StressError> {
        self.serve_n(None).await
    }

    /// Like [`serve`](Self::serve) but stops after `max_conns` accepts
    /// and waits for the responders still running.
    pub async fn serve_n(&self, max_conns: Option<u64>) -> Result<(), StressError> {
        let mut responders = JoinSet::new();
        let mut conn_id: u64 = 0;

        loop {
            if let Some(max) = max_conns {
                if conn_id >= max {
                    break;
                }
            }

            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) if accept_error_is_transient(&e) => {
                    warn!("accept() failed, continuing: {e}");
                    continue;
                }
                Err(e) => return Err(StressError::AcceptFailed(e)),
            };
            debug!("[{conn_id:05}] accept(): {peer}");

            let mode = self.mode;
            let chunk_len = self.chunk_len;
            responders.spawn(async move {
                let mut stream = stream;
                let res = match mode {
                    ResponderMode::Echo => echo(&mut stream, chunk_len).await,
                    ResponderMode::EchoFarewell => echo_with_farewell(&mut stream, chunk_len).await,
                    ResponderMode::Drain => drain(&mut stream, chunk_len).await,
                };
                match res {
                    Ok(stats) => info!(
                        "[{conn_id:05}] ECHOED: {:>10} bytes in {:>10.4} ms",
                        stats.bytes,
                        stats.elapsed.as_secs_f64() * 1000.0
                    ),
                    Err(e) => warn!("[{conn_id:05}] responder failed: {e}"),
                }
            });
            conn_id += 1;

            // Reap finished responders without blocking the accept loop.
            while responders.try_join_next().is_some() {}
        }

        while responders.join_next().await.is_some() {}
        Ok(())
    }
}
