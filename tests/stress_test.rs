// End-to-end tests over real loopback TCP. Every server binds an
// ephemeral port, so these can run in parallel.

use std::net::SocketAddr;

use sockstress::stress::{
    BW_CHUNK_LEN, Dispatcher, FAREWELL, LoadConfig, LoadGenerator, Outcome, ResponderMode,
    TransferPlan, bw_tx, megabits_per_sec, overall_failed, run_duplex,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

async fn start_server(
    mode: ResponderMode,
    max_conns: u64,
) -> (
    SocketAddr,
    JoinHandle<Result<(), sockstress::stress::StressError>>,
) {
    let dispatcher = Dispatcher::<TcpListener>::bind("127.0.0.1:0", mode, 0)
        .await
        .expect("Failed to bind dispatcher");
    let addr = dispatcher.local_addr().unwrap();
    let task = tokio::spawn(async move { dispatcher.serve_n(Some(max_conns)).await });
    (addr, task)
}

#[tokio::test]
async fn echo_roundtrip_4096() {
    let (addr, server) = start_server(ResponderMode::Echo, 1).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let result = run_duplex(stream, &TransferPlan::new(4096, 4096)).await;

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.bytes_sent, 4096);
    assert_eq!(result.bytes_received, 4096);
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn same_plan_twice_against_fresh_responders() {
    let (addr, server) = start_server(ResponderMode::Echo, 2).await;
    let plan = TransferPlan::new(10_000, 512);

    for _ in 0..2 {
        let stream = TcpStream::connect(addr).await.unwrap();
        let result = run_duplex(stream, &plan).await;
        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.bytes_received, 10_000);
    }
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn responder_closing_early_fails_the_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let total: u64 = 16 * 1024;

    // Misbehaving responder: consumes the payload, echoes a prefix, closes.
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let mut seen = 0u64;
        while seen < total {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            seen += n as u64;
        }
        stream.write_all(&buf[..1000]).await.unwrap();
        stream.shutdown().await.unwrap();
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let result = run_duplex(stream, &TransferPlan::new(total, 0)).await;
    assert_eq!(result.outcome, Outcome::PeerClosedEarly);
    assert_eq!(result.bytes_sent, total);
    assert_eq!(result.bytes_received, 1000);
}

#[tokio::test(flavor = "multi_thread")]
async fn load_generator_partitions_and_passes() {
    let (addr, server) = start_server(ResponderMode::Echo, 100).await;

    let config = LoadConfig {
        connections: 100,
        parallel: 10,
        min_len: 1,
        max_len: 2048,
        ..LoadConfig::default()
    };
    let reports = LoadGenerator::new(addr.to_string(), config)
        .run::<TcpStream>()
        .await;

    assert!(!overall_failed(&reports));
    assert_eq!(reports.len(), 10);
    for (i, report) in reports.iter().enumerate() {
        // Reports come back in worker-index order, 10 connections each
        assert_eq!(report.worker, i as u32);
        assert_eq!(report.results.len(), 10);
        assert!(report.results.iter().all(|r| r.outcome.is_success()));
    }
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn load_generator_fails_when_nothing_listens() {
    // Grab an ephemeral port, then free it again.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = LoadConfig {
        connections: 4,
        parallel: 2,
        max_len: 1024,
        ..LoadConfig::default()
    };
    let reports = LoadGenerator::new(addr.to_string(), config)
        .run::<TcpStream>()
        .await;

    assert!(overall_failed(&reports));
    for report in &reports {
        assert!(report.failed);
        assert!(report.results.is_empty());
    }
}

#[tokio::test]
async fn bandwidth_tx_against_drain_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let total: u64 = 8 * 1024 * 1024;

    let drained = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        sockstress::stress::drain(&mut stream, BW_CHUNK_LEN)
            .await
            .unwrap()
            .bytes
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let result = bw_tx(&mut stream, total, 64 * 1024).await.unwrap();

    assert_eq!(result.bytes_sent, total);
    assert_eq!(result.bytes_received, 0);
    assert!(megabits_per_sec(result.bytes_sent, result.elapsed).unwrap() > 0);
    assert_eq!(drained.await.unwrap(), total);
}

#[tokio::test]
async fn farewell_server_sends_the_trailer() {
    let (addr, server) = start_server(ResponderMode::EchoFarewell, 1).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"0123456789").await.unwrap();
    stream.shutdown().await.unwrap();

    let mut all = Vec::new();
    stream.read_to_end(&mut all).await.unwrap();
    assert_eq!(&all[..10], b"0123456789");
    assert_eq!(&all[10..], FAREWELL);
    server.await.unwrap().unwrap();
}
