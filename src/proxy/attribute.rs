//! PROXY Protocol Attribute
//!
//! The per-connection record of what a PROXY header said about the real
//! client and the address it originally connected to.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::connection::AttributeKey;

/// PROXY protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyVersion {
    V1,
    V2,
}

/// Transport and address family of the proxied connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxiedProtocol {
    Unknown,
    Tcp4,
    Tcp6,
    Udp4,
    Udp6,
    UnixStream,
    UnixDgram,
}

/// A host and port pair that has not been resolved.
///
/// The host is kept exactly as the header carried it. Nothing here ever
/// performs a DNS lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnresolvedAddr {
    host: String,
    port: u16,
}

impl UnresolvedAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Converts to a [`SocketAddr`] when the host is an IP literal.
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        let ip: IpAddr = self.host.parse().ok()?;
        Some(SocketAddr::new(ip, self.port))
    }
}

impl fmt::Display for UnresolvedAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Attributes parsed from a PROXY protocol header.
///
/// Immutable once built; the source and destination addresses are derived
/// from the host/port fields at construction and never change independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyAttribute {
    version: ProxyVersion,
    protocol: ProxiedProtocol,
    source_address: UnresolvedAddr,
    destination_address: UnresolvedAddr,
}

impl ProxyAttribute {
    /// Lookup key for the attribute in a connection's
    /// [`AttributeMap`](crate::connection::AttributeMap).
    pub const KEY: AttributeKey<ProxyAttribute> =
        AttributeKey::new(concat!(module_path!(), "::ProxyAttribute"));

    pub fn new(
        version: ProxyVersion,
        protocol: ProxiedProtocol,
        source_host: impl Into<String>,
        source_port: u16,
        destination_host: impl Into<String>,
        destination_port: u16,
    ) -> Self {
        Self {
            version,
            protocol,
            source_address: UnresolvedAddr::new(source_host, source_port),
            destination_address: UnresolvedAddr::new(destination_host, destination_port),
        }
    }

    /// Build from a decoded v1 header.
    ///
    /// Returns `None` for `UNKNOWN`, which carries no addresses.
    pub fn from_v1_header(header: &ppp::v1::Header<'_>) -> Option<Self> {
        let attribute = match &header.addresses {
            ppp::v1::Addresses::Tcp4(addrs) => Self::new(
                ProxyVersion::V1,
                ProxiedProtocol::Tcp4,
                addrs.source_address.to_string(),
                addrs.source_port,
                addrs.destination_address.to_string(),
                addrs.destination_port,
            ),
            ppp::v1::Addresses::Tcp6(addrs) => Self::new(
                ProxyVersion::V1,
                ProxiedProtocol::Tcp6,
                addrs.source_address.to_string(),
                addrs.source_port,
                addrs.destination_address.to_string(),
                addrs.destination_port,
            ),
            ppp::v1::Addresses::Unknown => return None,
        };
        Some(attribute)
    }

    /// Build from a decoded v2 header.
    ///
    /// Returns `None` for the `LOCAL` command and for `AF_UNSPEC`; in both
    /// cases the connection's own addresses are the real ones.
    pub fn from_v2_header(header: &ppp::v2::Header<'_>) -> Option<Self> {
        if matches!(header.command, ppp::v2::Command::Local) {
            return None;
        }

        let family = |stream, dgram| match header.protocol {
            ppp::v2::Protocol::Stream => stream,
            ppp::v2::Protocol::Datagram => dgram,
            ppp::v2::Protocol::Unspecified => ProxiedProtocol::Unknown,
        };

        let attribute = match &header.addresses {
            ppp::v2::Addresses::IPv4(addrs) => Self::new(
                ProxyVersion::V2,
                family(ProxiedProtocol::Tcp4, ProxiedProtocol::Udp4),
                addrs.source_address.to_string(),
                addrs.source_port,
                addrs.destination_address.to_string(),
                addrs.destination_port,
            ),
            ppp::v2::Addresses::IPv6(addrs) => Self::new(
                ProxyVersion::V2,
                family(ProxiedProtocol::Tcp6, ProxiedProtocol::Udp6),
                addrs.source_address.to_string(),
                addrs.source_port,
                addrs.destination_address.to_string(),
                addrs.destination_port,
            ),
            // Unix sockets have no port
            ppp::v2::Addresses::Unix(addrs) => Self::new(
                ProxyVersion::V2,
                family(ProxiedProtocol::UnixStream, ProxiedProtocol::UnixDgram),
                unix_path(&addrs.source),
                0,
                unix_path(&addrs.destination),
                0,
            ),
            ppp::v2::Addresses::Unspecified => return None,
        };
        Some(attribute)
    }

    pub fn version(&self) -> ProxyVersion {
        self.version
    }

    pub fn protocol(&self) -> ProxiedProtocol {
        self.protocol
    }

    pub fn source_host(&self) -> &str {
        self.source_address.host()
    }

    pub fn source_port(&self) -> u16 {
        self.source_address.port()
    }

    pub fn destination_host(&self) -> &str {
        self.destination_address.host()
    }

    pub fn destination_port(&self) -> u16 {
        self.destination_address.port()
    }

    pub fn source_address(&self) -> &UnresolvedAddr {
        &self.source_address
    }

    pub fn destination_address(&self) -> &UnresolvedAddr {
        &self.destination_address
    }
}

/// Unix socket paths are NUL padded to 108 bytes
fn unix_path(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn v2_header(ver_cmd: u8, fam_proto: u8, addrs: &[u8]) -> Vec<u8> {
        let mut buf = b"\r\n\r\n\x00\r\nQUIT\n".to_vec();
        buf.push(ver_cmd);
        buf.push(fam_proto);
        buf.extend_from_slice(&(addrs.len() as u16).to_be_bytes());
        buf.extend_from_slice(addrs);
        buf
    }

    proptest! {
        #[test]
        fn fields_read_back_unchanged(
            source_host in "\\PC{0,40}",
            source_port in any::<u16>(),
            destination_host in "\\PC{0,40}",
            destination_port in any::<u16>(),
        ) {
            let attr = ProxyAttribute::new(
                ProxyVersion::V2,
                ProxiedProtocol::Tcp6,
                source_host.clone(),
                source_port,
                destination_host.clone(),
                destination_port,
            );

            prop_assert_eq!(attr.version(), ProxyVersion::V2);
            prop_assert_eq!(attr.protocol(), ProxiedProtocol::Tcp6);
            prop_assert_eq!(attr.source_host(), source_host.as_str());
            prop_assert_eq!(attr.source_port(), source_port);
            prop_assert_eq!(attr.destination_host(), destination_host.as_str());
            prop_assert_eq!(attr.destination_port(), destination_port);
        }

        #[test]
        fn derived_addresses_pair_host_and_port(
            source_host in "[a-z0-9.]{1,30}",
            source_port in any::<u16>(),
            destination_host in "[a-z0-9.]{1,30}",
            destination_port in any::<u16>(),
        ) {
            let attr = ProxyAttribute::new(
                ProxyVersion::V1,
                ProxiedProtocol::Tcp4,
                source_host.clone(),
                source_port,
                destination_host.clone(),
                destination_port,
            );

            prop_assert_eq!(attr.source_address(), &UnresolvedAddr::new(source_host, source_port));
            prop_assert_eq!(
                attr.destination_address(),
                &UnresolvedAddr::new(destination_host, destination_port)
            );
        }
    }

    #[test]
    fn test_value_equality() {
        let a = ProxyAttribute::new(
            ProxyVersion::V1,
            ProxiedProtocol::Tcp4,
            "203.0.113.9",
            443,
            "10.0.0.1",
            80,
        );
        let b = ProxyAttribute::new(
            ProxyVersion::V1,
            ProxiedProtocol::Tcp4,
            String::from("203.0.113.9"),
            443,
            String::from("10.0.0.1"),
            80,
        );
        assert_eq!(a, b);
        assert_ne!(
            a,
            ProxyAttribute::new(
                ProxyVersion::V2,
                ProxiedProtocol::Tcp4,
                "203.0.113.9",
                443,
                "10.0.0.1",
                80
            )
        );
    }

    #[test]
    fn test_host_is_never_resolved() {
        let addr = UnresolvedAddr::new("localhost", 8080);
        assert_eq!(addr.host(), "localhost");
        assert_eq!(addr.to_socket_addr(), None);
        assert_eq!(addr.to_string(), "localhost:8080");
    }

    #[test]
    fn test_unresolved_display_brackets_ipv6() {
        let addr = UnresolvedAddr::new("2001:db8::1", 443);
        assert_eq!(addr.to_string(), "[2001:db8::1]:443");
        assert_eq!(
            addr.to_socket_addr(),
            Some("[2001:db8::1]:443".parse().unwrap())
        );
    }

    #[test]
    fn test_from_v1_tcp4() {
        let raw: &[u8] = b"PROXY TCP4 203.0.113.9 10.0.0.1 443 80\r\n";
        let header = ppp::v1::Header::try_from(raw).unwrap();
        let attr = ProxyAttribute::from_v1_header(&header).unwrap();

        assert_eq!(
            attr,
            ProxyAttribute::new(
                ProxyVersion::V1,
                ProxiedProtocol::Tcp4,
                "203.0.113.9",
                443,
                "10.0.0.1",
                80
            )
        );
    }

    #[test]
    fn test_from_v1_tcp6() {
        let raw: &[u8] = b"PROXY TCP6 ::1 ::2 12345 80\r\n";
        let header = ppp::v1::Header::try_from(raw).unwrap();
        let attr = ProxyAttribute::from_v1_header(&header).unwrap();

        assert_eq!(attr.protocol(), ProxiedProtocol::Tcp6);
        assert_eq!(attr.source_host(), "::1");
        assert_eq!(attr.destination_address().to_string(), "[::2]:80");
    }

    #[test]
    fn test_from_v1_unknown_has_no_attribute() {
        let raw: &[u8] = b"PROXY UNKNOWN\r\n";
        let header = ppp::v1::Header::try_from(raw).unwrap();
        assert_eq!(ProxyAttribute::from_v1_header(&header), None);
    }

    #[test]
    fn test_from_v2_tcp4() {
        let raw = v2_header(
            0x21,
            0x11,
            &[203, 0, 113, 9, 10, 0, 0, 1, 0x01, 0xbb, 0x00, 0x50],
        );
        let header = ppp::v2::Header::try_from(raw.as_slice()).unwrap();
        let attr = ProxyAttribute::from_v2_header(&header).unwrap();

        assert_eq!(attr.version(), ProxyVersion::V2);
        assert_eq!(attr.protocol(), ProxiedProtocol::Tcp4);
        assert_eq!(attr.source_address().to_string(), "203.0.113.9:443");
        assert_eq!(attr.destination_address().to_string(), "10.0.0.1:80");
    }

    #[test]
    fn test_from_v2_udp4() {
        let raw = v2_header(
            0x21,
            0x12,
            &[192, 0, 2, 1, 192, 0, 2, 2, 0x13, 0x88, 0x00, 0x35],
        );
        let header = ppp::v2::Header::try_from(raw.as_slice()).unwrap();
        let attr = ProxyAttribute::from_v2_header(&header).unwrap();

        assert_eq!(attr.protocol(), ProxiedProtocol::Udp4);
        assert_eq!(attr.source_port(), 5000);
        assert_eq!(attr.destination_port(), 53);
    }

    #[test]
    fn test_from_v2_unix_stream() {
        let mut addrs = vec![0u8; 216];
        addrs[..8].copy_from_slice(b"/tmp/src");
        addrs[108..117].copy_from_slice(b"/tmp/dest");
        let raw = v2_header(0x21, 0x31, &addrs);
        let header = ppp::v2::Header::try_from(raw.as_slice()).unwrap();
        let attr = ProxyAttribute::from_v2_header(&header).unwrap();

        assert_eq!(attr.protocol(), ProxiedProtocol::UnixStream);
        assert_eq!(attr.source_host(), "/tmp/src");
        assert_eq!(attr.destination_host(), "/tmp/dest");
        assert_eq!(attr.source_port(), 0);
    }

    #[test]
    fn test_from_v2_tcp6() {
        let mut addrs = Vec::new();
        addrs.extend_from_slice(&"2001:db8::9".parse::<std::net::Ipv6Addr>().unwrap().octets());
        addrs.extend_from_slice(&"2001:db8::1".parse::<std::net::Ipv6Addr>().unwrap().octets());
        addrs.extend_from_slice(&40000u16.to_be_bytes());
        addrs.extend_from_slice(&443u16.to_be_bytes());
        let raw = v2_header(0x21, 0x21, &addrs);
        let header = ppp::v2::Header::try_from(raw.as_slice()).unwrap();
        let attr = ProxyAttribute::from_v2_header(&header).unwrap();

        assert_eq!(attr.protocol(), ProxiedProtocol::Tcp6);
        assert_eq!(attr.source_host(), "2001:db8::9");
        assert_eq!(attr.destination_host(), "2001:db8::1");
        assert_eq!(attr.source_address().to_string(), "[2001:db8::9]:40000");
    }

    #[test]
    fn test_from_v2_unspecified_transport_keeps_addresses() {
        let raw = v2_header(
            0x21,
            0x10,
            &[203, 0, 113, 9, 10, 0, 0, 1, 0x01, 0xbb, 0x00, 0x50],
        );
        let header = ppp::v2::Header::try_from(raw.as_slice()).unwrap();
        let attr = ProxyAttribute::from_v2_header(&header).unwrap();

        assert_eq!(attr.protocol(), ProxiedProtocol::Unknown);
        assert_eq!(attr.source_address().to_string(), "203.0.113.9:443");
    }

    #[test]
    fn test_from_v2_unspec_family_has_no_attribute() {
        let raw = v2_header(0x21, 0x00, &[]);
        let header = ppp::v2::Header::try_from(raw.as_slice()).unwrap();
        assert_eq!(ProxyAttribute::from_v2_header(&header), None);
    }

    #[test]
    fn test_from_v2_local_has_no_attribute() {
        let raw = v2_header(0x20, 0x00, &[]);
        let header = ppp::v2::Header::try_from(raw.as_slice()).unwrap();
        assert_eq!(ProxyAttribute::from_v2_header(&header), None);
    }
}
