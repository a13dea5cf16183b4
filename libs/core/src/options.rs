//! Per-connection options and connection kinds.

/// A setting applied with [`Core::set_option`](crate::Core::set_option).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOption {
    /// Disable Nagle's algorithm.
    NoDelay(bool),
    /// Allow rebinding an address in TIME_WAIT.
    ReuseAddr(bool),
    /// Keepalive with fixed timing (40 s idle, 1 s interval, 5 probes).
    KeepAlive(bool),
    /// Kernel send buffer size.
    SendBuffer(usize),
    /// Kernel receive buffer size.
    RecvBuffer(usize),
    /// Send-queue ceiling for this connection (0 = unlimited).
    SendLimit(usize),
    /// Largest frame this connection accepts.
    MaxMessageSize(usize),
}

/// How a connection came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// Accepted by a listener.
    Inbound,
    /// Created by `new_connect` or `new_assign`.
    Outbound,
    ListenerV4,
    ListenerV6,
}

impl ConnectionKind {
    pub fn is_listener(self) -> bool {
        matches!(self, ConnectionKind::ListenerV4 | ConnectionKind::ListenerV6)
    }
}

impl std::fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionKind::Inbound => "inbound",
            ConnectionKind::Outbound => "outbound",
            ConnectionKind::ListenerV4 => "listener-v4",
            ConnectionKind::ListenerV6 => "listener-v6",
        };
        write!(f, "{}", s)
    }
}
