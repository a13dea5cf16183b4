//! Networking helpers for netmux.
//!
//! This library provides:
//! - Outbound proxy traversal (HTTP CONNECT, SOCKS4, SOCKS5) as a
//!   poll-driven step machine over a non-blocking socket
//! - Socket tuning (no-delay, keepalive, buffer sizes, address reuse)
//! - CIDR allow lists for screening inbound peers

mod allow;
mod error;
mod proxy;
mod sockopt;

pub use allow::{AllowList, IpPrefix};
pub use error::{NetworkError, ProxyError};
pub use proxy::{
    Credentials, ProxyConnector, ProxyKind, ProxyStatus, ProxyStep, HTTP_REPLY_LIMIT,
};
pub use sockopt::{
    keepalive_params, set_keepalive, set_nodelay, set_recv_buffer_size, set_reuse_address,
    set_send_buffer_size, KEEPALIVE_IDLE, KEEPALIVE_INTERVAL, KEEPALIVE_RETRIES,
};
