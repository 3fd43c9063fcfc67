//! Effective Address Resolution
//!
//! Answers "who is the real client, and what did they connect to" for any
//! [`Connection`]. A stored [`ProxyAttribute`] wins; otherwise the
//! connection's own remote (source) or local (destination) address is used.
//! Nothing here resolves DNS or blocks.

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

use super::AttributeMap;
use crate::proxy::{ProxyAttribute, UnresolvedAddr};

/// A connection that carries attributes and knows its transport addresses.
pub trait Connection {
    fn attributes(&self) -> &AttributeMap;

    fn attributes_mut(&mut self) -> &mut AttributeMap;

    /// Address of the peer, `None` if not connected
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Address of our end, `None` if not bound
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Neither a PROXY attribute nor a native address was available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("remote address unavailable")]
    RemoteUnavailable,
    #[error("local address unavailable")]
    LocalUnavailable,
}

/// The address an accessor settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address<'a> {
    /// Taken from the PROXY header
    Proxied(&'a UnresolvedAddr),
    /// The connection's own transport address
    Socket(SocketAddr),
}

impl<'a> Address<'a> {
    /// Host component; link-local IPv6 hosts keep their `%scope` suffix.
    pub fn host(&self) -> Cow<'a, str> {
        match *self {
            Address::Proxied(addr) => Cow::Borrowed(addr.host()),
            Address::Socket(SocketAddr::V6(addr)) if addr.scope_id() != 0 => {
                Cow::Owned(format!("{}%{}", addr.ip(), addr.scope_id()))
            }
            Address::Socket(addr) => Cow::Owned(addr.ip().to_string()),
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Address::Proxied(addr) => addr.port(),
            Address::Socket(addr) => addr.port(),
        }
    }

    pub fn is_proxied(&self) -> bool {
        matches!(self, Address::Proxied(_))
    }

    /// IP form of the address, without any lookup.
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Address::Proxied(addr) => addr.to_socket_addr(),
            Address::Socket(addr) => Some(*addr),
        }
    }
}

impl fmt::Display for Address<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Proxied(addr) => fmt::Display::fmt(addr, f),
            Address::Socket(addr) => fmt::Display::fmt(addr, f),
        }
    }
}

/// PROXY attribute accessors for every [`Connection`].
pub trait ProxyAttributeExt: Connection {
    /// The attribute from the connection if present.
    ///
    /// `None` when the connection did not come through a proxy.
    fn proxy_attribute(&self) -> Option<&ProxyAttribute> {
        self.attributes().get(&ProxyAttribute::KEY)
    }

    /// Store or clear the attribute, returning the previous one.
    fn set_proxy_attribute(&mut self, attribute: Option<ProxyAttribute>) -> Option<ProxyAttribute> {
        self.attributes_mut().set(&ProxyAttribute::KEY, attribute)
    }

    /// The real source address: the header's source if proxied, the
    /// connection's remote address otherwise.
    fn source_address(&self) -> Result<Address<'_>, AddressError> {
        match self.proxy_attribute() {
            Some(attr) => Ok(Address::Proxied(attr.source_address())),
            None => self
                .remote_addr()
                .map(Address::Socket)
                .ok_or(AddressError::RemoteUnavailable),
        }
    }

    /// The real destination address: the header's destination if proxied,
    /// the connection's local address otherwise.
    fn destination_address(&self) -> Result<Address<'_>, AddressError> {
        match self.proxy_attribute() {
            Some(attr) => Ok(Address::Proxied(attr.destination_address())),
            None => self
                .local_addr()
                .map(Address::Socket)
                .ok_or(AddressError::LocalUnavailable),
        }
    }

    fn source_host(&self) -> Result<Cow<'_, str>, AddressError> {
        self.source_address().map(|addr| addr.host())
    }

    fn destination_host(&self) -> Result<Cow<'_, str>, AddressError> {
        self.destination_address().map(|addr| addr.host())
    }
}

impl<C: Connection + ?Sized> ProxyAttributeExt for C {}
