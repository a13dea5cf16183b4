//! Accept-time admission policy.

use std::net::SocketAddr;

use netmux_id::Handle;
use netmux_networking::AllowList;

/// Decides whether an inbound connection is admitted.
///
/// Consulted once per accepted socket, before a handle is allocated. A
/// rejected socket is closed without producing any event.
pub trait Firewall {
    /// `listener` is the handle of the listener that accepted `peer`.
    fn allow(&mut self, peer: &SocketAddr, listener: Handle) -> bool;
}

impl<F> Firewall for F
where
    F: FnMut(&SocketAddr, Handle) -> bool,
{
    fn allow(&mut self, peer: &SocketAddr, listener: Handle) -> bool {
        self(peer, listener)
    }
}

impl Firewall for AllowList {
    fn allow(&mut self, peer: &SocketAddr, _listener: Handle) -> bool {
        self.allows(peer.ip())
    }
}
