//! Connection Module
//!
//! Per-connection attribute storage, the [`Connection`] seam pipeline code
//! implements, and the PROXY-aware address accessors layered on top of it.

mod attributes;
mod resolve;
mod stream;

pub use attributes::{AttributeKey, AttributeMap};
pub use resolve::{Address, AddressError, Connection, ProxyAttributeExt};
pub use stream::ProxiedStream;
