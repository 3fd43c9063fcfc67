//! PROXY Protocol Module
//!
//! Holds the attribute built from a HAProxy PROXY v1/v2 header, and the
//! intake stage that reads the header off a stream. Decoding itself is done
//! by the `ppp` crate.

mod attribute;
mod parser;

pub use attribute::{ProxiedProtocol, ProxyAttribute, ProxyVersion, UnresolvedAddr};
pub use parser::{read_proxy_header, Preamble, ProxyError};
