//! haproxy-whoami
//!
//! Answers each TCP connection with the client and destination addresses it
//! sees, reading them from a PROXY header when one is sent.
//!
//! Usage:
//!   haproxy-whoami --bind 0.0.0.0:7070 --proxy-protocol
//!
//!   # From behind HAProxy (send-proxy / send-proxy-v2), or by hand:
//!   printf 'PROXY TCP4 203.0.113.9 10.0.0.1 443 7070\r\n' | nc 127.0.0.1 7070

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use haproxy_attribute::{Config, ProxiedStream, ProxyAttributeExt, ProxyProtocolConfig};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "haproxy-whoami",
    version,
    about = "Report the real client address of each connection"
)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Expect a PROXY header on each connection
    #[arg(long)]
    proxy_protocol: bool,

    /// Accept connections without a PROXY header
    #[arg(long, requires = "proxy_protocol")]
    optional: bool,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if args.proxy_protocol {
        config.proxy_protocol.enabled = true;
        config.proxy_protocol.required = !args.optional;
    }

    if let Err(e) = run(config).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.bind).await?;
    info!(
        "Listening on {} (PROXY protocol: {})",
        listener.local_addr()?,
        match (config.proxy_protocol.enabled, config.proxy_protocol.required) {
            (false, _) => "off",
            (true, true) => "required",
            (true, false) => "optional",
        }
    );

    loop {
        let (socket, peer) = listener.accept().await?;
        let proxy_config = config.proxy_protocol.clone();

        tokio::spawn(async move {
            if let Err(e) = handle(socket, &proxy_config).await {
                warn!("Connection from {} failed: {}", peer, e);
            }
        });
    }
}

async fn handle(
    socket: TcpStream,
    config: &ProxyProtocolConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut conn = ProxiedStream::accept_tcp(socket, config).await?;

    let reply = format!(
        "source={} destination={} proxied={}\n",
        conn.source_address()?,
        conn.destination_address()?,
        conn.proxy_attribute().is_some()
    );
    debug!("{}", reply.trim_end());

    conn.write_all(reply.as_bytes()).await?;
    conn.shutdown().await?;
    Ok(())
}
