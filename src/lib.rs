//! HAProxy PROXY protocol support for connections.
//!
//! Behind a load balancer, a connection's peer address is the balancer's.
//! When the balancer speaks the PROXY protocol, the header it sends carries
//! the real client and destination. This crate stores that header as a
//! [`ProxyAttribute`] on the connection and answers address queries from it,
//! falling back to the socket's own addresses when there is none.
//!
//! ```no_run
//! use haproxy_attribute::{ProxiedStream, ProxyAttributeExt, ProxyProtocolConfig};
//! use tokio::net::TcpListener;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = TcpListener::bind("0.0.0.0:8080").await?;
//! let config = ProxyProtocolConfig { enabled: true, ..Default::default() };
//!
//! let (socket, _) = listener.accept().await?;
//! let conn = ProxiedStream::accept_tcp(socket, &config).await?;
//! println!("client {}", conn.source_address()?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod proxy;

pub use config::{Config, ConfigError, ProxyProtocolConfig};
pub use connection::{
    Address, AddressError, AttributeKey, AttributeMap, Connection, ProxiedStream, ProxyAttributeExt,
};
pub use proxy::{
    read_proxy_header, Preamble, ProxiedProtocol, ProxyAttribute, ProxyError, ProxyVersion,
    UnresolvedAddr,
};
