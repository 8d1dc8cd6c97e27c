//! Palaver chat server binary.
//!
//! Binds a TCP listener and a UDP socket on the same port and serves both.
//!
//! ```text
//! palaver-server 7070
//! palaver-server -v --quips --host 127.0.0.1 7070
//! RUST_LOG=palaver_server=trace palaver-server 7070
//! ```

use std::net::IpAddr;

use clap::Parser;
use palaver_core::DispatcherConfig;
use palaver_server::{ChatServer, ServerConfig, ServerError};
use tokio::net::{TcpListener, UdpSocket};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "palaver-server", version, about = "Line-protocol chat server over TCP and UDP")]
struct Args {
    /// Port for both the TCP and the UDP listener
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Log every frame sent and received
    #[arg(short, long)]
    verbose: bool,

    /// Let other users chime in with canned quips
    #[arg(long)]
    quips: bool,

    /// Dispatcher request mailbox capacity
    #[arg(long, default_value_t = 10)]
    mailbox: usize,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        mailbox_capacity: args.mailbox,
        dispatcher: DispatcherConfig { quips: args.quips, ..DispatcherConfig::default() },
        ..ServerConfig::default()
    };
    config.validate()?;

    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;
    let socket = UdpSocket::bind(addr).await?;
    info!(%addr, quips = args.quips, "listening on tcp and udp");

    ChatServer::with_system(config)
        .serve(listener, socket)
        .await
        .inspect_err(|err| error!(error = %err, "server stopped"))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
