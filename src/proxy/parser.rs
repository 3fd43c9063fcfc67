//! PROXY Header Intake
//!
//! Frames a PROXY v1 (text) or v2 (binary) header off the front of a stream
//! and hands it to the `ppp` decoder. Streams that do not open with a PROXY
//! signature are reported as such, with every byte read so far returned.

use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use super::{ProxyAttribute, ProxyVersion};

/// PROXY v1 signature: "PROXY "
const PROXY_V1_SIGNATURE: &[u8] = b"PROXY ";

/// PROXY v2 signature (12 bytes)
const PROXY_V2_SIGNATURE: &[u8] = b"\r\n\r\n\x00\r\nQUIT\n";

/// v2 fixed prefix: signature, ver/cmd, fam/proto, length
const PROXY_V2_PREFIX_LEN: usize = 16;

/// Longest v1 line including CRLF
const MAX_V1_HEADER_SIZE: usize = 107;

/// Maximum PROXY header size
const MAX_HEADER_SIZE: usize = 536;

/// What the front of the stream held
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preamble {
    /// A header carrying the real addresses
    Proxied(ProxyAttribute),
    /// A header without addresses (v1 UNKNOWN, v2 LOCAL or AF_UNSPEC)
    Local(ProxyVersion),
    /// No PROXY signature, or no bytes at all before the timeout
    Absent,
}

/// Errors that can occur while reading a PROXY header
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Timeout partway through a PROXY header
    #[error("PROXY header timeout")]
    Timeout,
    /// Invalid or malformed PROXY header
    #[error("invalid PROXY header: {0}")]
    InvalidHeader(String),
    /// IO error reading from socket
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Connection closed before header received
    #[error("connection closed")]
    ConnectionClosed,
    /// PROXY protocol required but not detected
    #[error("no PROXY protocol signature")]
    NotProxyProtocol,
}

enum Framed {
    V1(usize),
    V2(usize),
    Absent,
}

/// Read a PROXY header from a stream
///
/// Returns what was found and the bytes read past the header, which belong
/// to the application and must be replayed before further reads. For
/// [`Preamble::Absent`] that is everything read.
///
/// A stream that stays silent for the whole timeout is reported as
/// [`Preamble::Absent`]; one that stops partway through a header fails with
/// [`ProxyError::Timeout`].
pub async fn read_proxy_header<S: AsyncRead + Unpin>(
    stream: &mut S,
    timeout_duration: Duration,
) -> Result<(Preamble, BytesMut), ProxyError> {
    let mut buf = BytesMut::with_capacity(MAX_HEADER_SIZE);

    let framed = match timeout(timeout_duration, frame_header(stream, &mut buf)).await {
        Ok(result) => result?,
        // Nothing sent yet: the client expects the server to speak first
        Err(_) if buf.is_empty() => Framed::Absent,
        Err(_) => return Err(ProxyError::Timeout),
    };

    let (preamble, header_len) = match framed {
        Framed::V1(len) => (decode_v1(&buf[..len])?, len),
        Framed::V2(len) => (decode_v2(&buf[..len])?, len),
        Framed::Absent => return Ok((Preamble::Absent, buf)),
    };
    let remaining = buf.split_off(header_len);

    Ok((preamble, remaining))
}

/// Whether `buf` is still a prefix of either signature
fn could_be_header(buf: &[u8]) -> bool {
    let v1 = buf.len().min(PROXY_V1_SIGNATURE.len());
    let v2 = buf.len().min(PROXY_V2_SIGNATURE.len());
    buf[..v1] == PROXY_V1_SIGNATURE[..v1] || buf[..v2] == PROXY_V2_SIGNATURE[..v2]
}

/// Read until a complete header is buffered, or the bytes rule one out
async fn frame_header<S: AsyncRead + Unpin>(
    stream: &mut S,
    buf: &mut BytesMut,
) -> Result<Framed, ProxyError> {
    loop {
        if buf.starts_with(PROXY_V1_SIGNATURE) {
            // V1: up to and including CRLF
            let scan = buf.len().min(MAX_V1_HEADER_SIZE);
            if let Some(pos) = buf[..scan].windows(2).position(|w| w == b"\r\n") {
                return Ok(Framed::V1(pos + 2));
            }
            if buf.len() >= MAX_V1_HEADER_SIZE {
                return Err(ProxyError::InvalidHeader("v1 header too long".to_string()));
            }
        } else if buf.len() >= PROXY_V2_PREFIX_LEN && buf.starts_with(PROXY_V2_SIGNATURE) {
            // V2: length is in bytes 14-15 (big-endian u16)
            let header_len = u16::from_be_bytes([buf[14], buf[15]]) as usize;
            let total_len = PROXY_V2_PREFIX_LEN + header_len;

            if total_len > MAX_HEADER_SIZE {
                return Err(ProxyError::InvalidHeader(format!(
                    "v2 header too large: {} bytes",
                    total_len
                )));
            }
            if buf.len() >= total_len {
                return Ok(Framed::V2(total_len));
            }
        } else if !could_be_header(buf) {
            return Ok(Framed::Absent);
        }

        let n = stream.read_buf(buf).await?;
        if n == 0 {
            if buf.is_empty() {
                return Err(ProxyError::ConnectionClosed);
            }
            // A short first message that merely looks like a signature
            return if could_be_header(buf) {
                Err(ProxyError::ConnectionClosed)
            } else {
                Ok(Framed::Absent)
            };
        }
    }
}

/// Decode a PROXY v1 (text) header
fn decode_v1(header: &[u8]) -> Result<Preamble, ProxyError> {
    let header = ppp::v1::Header::try_from(header)
        .map_err(|e| ProxyError::InvalidHeader(format!("v1 parse error: {:?}", e)))?;

    Ok(match ProxyAttribute::from_v1_header(&header) {
        Some(attribute) => Preamble::Proxied(attribute),
        None => Preamble::Local(ProxyVersion::V1),
    })
}

/// Decode a PROXY v2 (binary) header
fn decode_v2(header: &[u8]) -> Result<Preamble, ProxyError> {
    let header = ppp::v2::Header::try_from(header)
        .map_err(|e| ProxyError::InvalidHeader(format!("v2 parse error: {:?}", e)))?;

    Ok(match ProxyAttribute::from_v2_header(&header) {
        Some(attribute) => Preamble::Proxied(attribute),
        None => Preamble::Local(ProxyVersion::V2),
    })
}
