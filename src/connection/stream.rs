//! Proxied Stream
//!
//! A stream wrapper that owns a connection's attributes and native
//! addresses. Bytes read while looking for a PROXY header are replayed
//! before the inner stream is read again.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::{AttributeMap, Connection, ProxyAttributeExt};
use crate::config::ProxyProtocolConfig;
use crate::proxy::{read_proxy_header, Preamble, ProxyError};

#[derive(Debug)]
pub struct ProxiedStream<S> {
    inner: S,
    buffered: BytesMut,
    attributes: AttributeMap,
    remote: Option<SocketAddr>,
    local: Option<SocketAddr>,
}

impl<S> ProxiedStream<S> {
    pub fn new(inner: S, remote: Option<SocketAddr>, local: Option<SocketAddr>) -> Self {
        Self {
            inner,
            buffered: BytesMut::new(),
            attributes: AttributeMap::new(),
            remote,
            local,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Unwrap the stream, along with any bytes not yet read through it.
    pub fn into_parts(self) -> (S, BytesMut) {
        (self.inner, self.buffered)
    }
}

impl<S: AsyncRead + Unpin> ProxiedStream<S> {
    /// Run PROXY header intake on a freshly accepted stream.
    ///
    /// With intake disabled the stream is wrapped untouched. A header with
    /// addresses is stored as the connection's [`ProxyAttribute`](crate::ProxyAttribute);
    /// a stream without one is rejected when the config requires a header
    /// and passed through otherwise. A client that sends nothing before the
    /// timeout counts as having no header, so server-speaks-first protocols
    /// pass through in optional mode after waiting out the timeout.
    pub async fn accept(
        mut inner: S,
        remote: Option<SocketAddr>,
        local: Option<SocketAddr>,
        config: &ProxyProtocolConfig,
    ) -> Result<Self, ProxyError> {
        if !config.enabled {
            return Ok(Self::new(inner, remote, local));
        }

        let (preamble, buffered) = read_proxy_header(&mut inner, config.timeout_duration()).await?;
        let mut stream = Self::new(inner, remote, local);
        stream.buffered = buffered;

        match preamble {
            Preamble::Proxied(attribute) => {
                debug!(
                    "PROXY {:?} from {:?}: source {}, destination {}",
                    attribute.version(),
                    remote,
                    attribute.source_address(),
                    attribute.destination_address()
                );
                stream.set_proxy_attribute(Some(attribute));
            }
            Preamble::Local(version) => {
                debug!(
                    "PROXY {:?} without addresses from {:?}, using socket addresses",
                    version, remote
                );
            }
            Preamble::Absent if config.required => {
                warn!("Connection from {:?} rejected: no PROXY header", remote);
                return Err(ProxyError::NotProxyProtocol);
            }
            Preamble::Absent => {
                debug!("No PROXY header from {:?}, using socket addresses", remote);
            }
        }

        Ok(stream)
    }
}

impl ProxiedStream<TcpStream> {
    /// [`accept`](Self::accept) for a TCP stream, taking its addresses from the socket.
    pub async fn accept_tcp(
        stream: TcpStream,
        config: &ProxyProtocolConfig,
    ) -> Result<Self, ProxyError> {
        let remote = stream.peer_addr().ok();
        let local = stream.local_addr().ok();
        Self::accept(stream, remote, local, config).await
    }
}

impl<S> Connection for ProxiedStream<S> {
    fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ProxiedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.buffered.is_empty() {
            let n = self.buffered.len().min(buf.remaining());
            buf.put_slice(&self.buffered[..n]);
            self.buffered.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ProxiedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
