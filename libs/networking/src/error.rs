//! Networking errors.

use thiserror::Error;

/// Errors from address parsing and allow-list configuration.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Invalid IP address.
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// Invalid CIDR prefix.
    #[error("invalid CIDR prefix: {0}")]
    InvalidPrefix(String),
}

/// Failure of one proxy traversal step.
///
/// Every variant maps to a distinct numeric [`code`](ProxyError::code) naming
/// the step that failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("connect rejected: {0}")]
    ConnectRejected(String),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("sending proxy request failed: {0}")]
    RequestSend(String),

    #[error("receiving HTTP proxy reply failed: {0}")]
    HttpRecv(String),

    #[error("HTTP proxy refused the tunnel: {0:?}")]
    HttpRejected(String),

    #[error("HTTP proxy reply exceeds {0} bytes")]
    HttpReplyTooLong(usize),

    #[error("receiving SOCKS4 reply failed: {0}")]
    Socks4Recv(String),

    #[error("SOCKS4 request rejected with status {0}")]
    Socks4Rejected(u8),

    #[error("SOCKS4 only reaches IPv4 destinations")]
    Socks4NeedsIpv4,

    #[error("receiving SOCKS5 method selection failed: {0}")]
    Socks5MethodRecv(String),

    #[error("SOCKS5 proxy selected unsupported method {0}")]
    Socks5MethodRejected(u8),

    #[error("SOCKS5 proxy selected method {0} although credentials were offered")]
    Socks5AuthMethodRejected(u8),

    #[error("sending SOCKS5 credentials failed: {0}")]
    Socks5AuthSend(String),

    #[error("receiving SOCKS5 credential reply failed: {0}")]
    Socks5AuthRecv(String),

    #[error("SOCKS5 credentials rejected with status {0}")]
    Socks5AuthRejected(u8),

    #[error("SOCKS5 username and password must each be 1 to 255 bytes")]
    Socks5CredentialsTooLong,

    #[error("sending SOCKS5 CONNECT failed: {0}")]
    Socks5ConnectSend(String),

    #[error("receiving SOCKS5 CONNECT reply failed: {0}")]
    Socks5ConnectRecv(String),

    #[error("SOCKS5 CONNECT rejected with reply {0}")]
    Socks5ConnectRejected(u8),
}

impl ProxyError {
    /// Numeric code identifying the failing step.
    pub fn code(&self) -> i32 {
        match self {
            ProxyError::ConnectRejected(_) => 1,
            ProxyError::ConnectFailed(_) => 2,
            ProxyError::RequestSend(_) => 3,
            ProxyError::HttpRecv(_) => 10,
            ProxyError::HttpRejected(_) => 11,
            ProxyError::HttpReplyTooLong(_) => 12,
            ProxyError::Socks4Recv(_) => 20,
            ProxyError::Socks4Rejected(_) => 21,
            ProxyError::Socks4NeedsIpv4 => 30,
            ProxyError::Socks5MethodRecv(_) => 31,
            ProxyError::Socks5MethodRejected(_) => 32,
            ProxyError::Socks5AuthMethodRejected(_) => 33,
            ProxyError::Socks5AuthSend(_) => 40,
            ProxyError::Socks5AuthRecv(_) => 41,
            ProxyError::Socks5AuthRejected(_) => 42,
            ProxyError::Socks5CredentialsTooLong => 43,
            ProxyError::Socks5ConnectSend(_) => 50,
            ProxyError::Socks5ConnectRecv(_) => 51,
            ProxyError::Socks5ConnectRejected(_) => 52,
        }
    }

    /// Returns true when the proxy answered but refused the request.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ProxyError::HttpRejected(_)
                | ProxyError::Socks4Rejected(_)
                | ProxyError::Socks5MethodRejected(_)
                | ProxyError::Socks5AuthMethodRejected(_)
                | ProxyError::Socks5AuthRejected(_)
                | ProxyError::Socks5ConnectRejected(_)
        )
    }
}
