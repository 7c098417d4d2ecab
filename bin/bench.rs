// Bandwidth benchmark: the TX side sends a fixed amount of data in
// fixed sized messages, the RX side drains until EOF. Prints the
// message size and the measured throughput in Mbits/s.

use anyhow::Result;
use clap::Parser;
use sockstress::net::STRESS_PORT;
use sockstress::stress::{BW_TOTAL_BYTES, Dispatcher, ResponderMode, bw_tx, megabits_per_sec};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Run as the receiving (drain) server, listening on this address
    #[arg(short = 's', long, conflicts_with = "connect")]
    server: Option<String>,

    /// Run as the sending client, connecting to this address
    #[arg(short = 'c', long)]
    connect: Option<String>,

    /// Message size in bytes (0 = 2 MiB default)
    #[arg(short = 'm', long, default_value_t = 0)]
    msg_len: usize,

    /// Total bytes to send per iteration
    #[arg(long, default_value_t = BW_TOTAL_BYTES)]
    total: u64,

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
        let dispatcher =
            Dispatcher::<TcpListener>::bind(addr.as_str(), ResponderMode::Drain, args.msg_len)
                .await?;
        println!("Server listening on {addr}");
        // One accept per iteration, then wait for the drain to finish.
        dispatcher.serve_n(Some(1)).await?;
        return Ok(());
    }

    let Some(addr) = args.connect else {
        anyhow::bail!("either --server or --connect is required");
    };
    let addr = with_default_port(&addr);

    let mut stream = TcpStream::connect(&addr).await?;
    let result = bw_tx(&mut stream, args.total, args.msg_len).await?;
    match megabits_per_sec(result.bytes_sent, result.elapsed) {
        Some(mbits) => println!("{} {}", args.msg_len, mbits),
        None => anyhow::bail!("transfer finished too quickly to measure"),
    }
    Ok(())
}
