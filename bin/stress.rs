// Generic stress test program for stream sockets: the client opens many
// concurrent connections, sends a random amount of data over each, and
// the server echoes it back.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use sockstress::net::STRESS_PORT;
use sockstress::stress::{
    Dispatcher, LoadConfig, LoadGenerator, MAX_DATA_LEN, ResponderMode, overall_failed,
};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Run as the echo server, listening on this address
    #[arg(short = 's', long, conflicts_with = "connect")]
    server: Option<String>,

    /// Run as the client, connecting to this address
    #[arg(short = 'c', long)]
    connect: Option<String>,

    /// Total number of connections
    #[arg(short = 'i', long, default_value_t = 100)]
    connections: u32,

    /// Number of connections to run in parallel
    #[arg(short = 'p', long, default_value_t = 1)]
    parallel: u32,

    /// Minimum payload length per connection
    #[arg(short = 'L', long, default_value_t = 1)]
    min_len: u64,

    /// Maximum payload length per connection
    #[arg(short = 'l', long, default_value_t = MAX_DATA_LEN)]
    max_len: u64,

    /// Chunk size per send/receive call (0 = default)
    #[arg(short = 'b', long, default_value_t = 0)]
    chunk: usize,

    /// Sleep time in seconds between connections within a worker
    #[arg(short = 'w', long, default_value_t = 0)]
    sleep: u64,

    /// Send a farewell trailer after echoing (server mode)
    #[arg(long)]
    farewell: bool,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn with_default_port(addr: &str) -> String {
    if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{addr}:{STRESS_PORT}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Some(addr) = args.server {
        let addr = with_default_port(&addr);
        let mode = if args.farewell {
            ResponderMode::EchoFarewell
        } else {
            ResponderMode::Echo
        };
        let dispatcher = Dispatcher::<TcpListener>::bind(addr.as_str(), mode, args.chunk).await?;
        println!("Starting server on {addr}");
        dispatcher.serve().await?;
        return Ok(());
    }

    let Some(addr) = args.connect else {
        anyhow::bail!("either --server or --connect is required");
    };
    anyhow::ensure!(args.min_len <= args.max_len, "min-len > max-len");

    let addr = with_default_port(&addr);
    let config = LoadConfig {
        connections: args.connections,
        parallel: args.parallel,
        min_len: args.min_len,
        max_len: args.max_len,
        chunk_len: args.chunk,
        sleep: Duration::from_secs(args.sleep),
    };
    println!("Client connecting to {addr}");

    let reports = LoadGenerator::new(addr, config).run::<TcpStream>().await;
    for report in &reports {
        if report.failed {
            eprintln!(
                "worker {} failed after {} connections",
                report.worker,
                report.results.len()
            );
        }
    }
    if overall_failed(&reports) {
        std::process::exit(1);
    }
    Ok(())
}
