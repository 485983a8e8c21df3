#![forbid(unsafe_code)]

mod responder;

use std::net::{IpAddr, SocketAddr, UdpSocket};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Companion server for enclink boards: answers time and alive requests, acknowledges the rest.
#[derive(Debug, Clone, Parser)]
#[command(name = "enclink-udp-server", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// UDP port the boards send to.
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Receive buffer size in bytes. Longer datagrams are truncated.
    #[arg(long, default_value_t = 2048)]
    buffer: usize,

    /// Log requests without answering them.
    #[arg(long)]
    no_ack: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let addr = SocketAddr::new(args.bind, args.port);
    let socket = UdpSocket::bind(addr).with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        bind = %addr,
        buffer = args.buffer,
        ack = !args.no_ack,
        "enclink-udp-server listening"
    );

    let mut buf = vec![0u8; args.buffer.max(1)];
    loop {
        let served = responder::serve_one(&socket, &mut buf, !args.no_ack, responder::local_now);
        if let Err(err) = served {
            tracing::warn!(%err, "datagram not handled");
        }
    }
}
