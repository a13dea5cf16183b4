//! Multiplexer counters.

/// Running totals kept by a [`Core`](crate::Core).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoreStats {
    /// Inbound connections admitted.
    pub accepted: u64,
    /// Inbound connections vetoed by the firewall or refused for lack of handles.
    pub rejected: u64,
    /// Connections closed by the idle sweep.
    pub evicted: u64,
    /// Connections closed for any reason.
    pub closed: u64,
    /// DATA events produced.
    pub messages_in: u64,
    /// Messages queued for sending.
    pub messages_out: u64,
    /// Bytes read from sockets.
    pub bytes_in: u64,
    /// Bytes written to sockets.
    pub bytes_out: u64,
    /// Times the scratch buffer grew.
    pub scratch_growths: u64,
}
