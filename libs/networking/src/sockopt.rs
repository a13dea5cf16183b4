//! Socket tuning.
//!
//! Thin wrappers over `socket2::SockRef`, so they apply to any socket type
//! exposing its descriptor (mio or std streams and listeners alike).

use std::io;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};

/// Idle time before the first keepalive probe.
pub const KEEPALIVE_IDLE: Duration = Duration::from_secs(40);

/// Interval between keepalive probes.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Unanswered probes before the connection is dropped.
pub const KEEPALIVE_RETRIES: u32 = 5;

/// The fixed keepalive parameters, limited to what the platform supports.
pub fn keepalive_params() -> TcpKeepalive {
    let params = TcpKeepalive::new().with_time(KEEPALIVE_IDLE);

    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "windows"
    ))]
    let params = params.with_interval(KEEPALIVE_INTERVAL);

    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd"
    ))]
    let params = params.with_retries(KEEPALIVE_RETRIES);

    params
}

/// Enable or disable Nagle's algorithm.
pub fn set_nodelay(socket: SockRef<'_>, nodelay: bool) -> io::Result<()> {
    socket.set_nodelay(nodelay)
}

/// Enable keepalive with the fixed parameters, or disable it.
pub fn set_keepalive(socket: SockRef<'_>, enable: bool) -> io::Result<()> {
    if enable {
        socket.set_tcp_keepalive(&keepalive_params())
    } else {
        socket.set_keepalive(false)
    }
}

/// Allow rebinding an address still in TIME_WAIT.
pub fn set_reuse_address(socket: SockRef<'_>, reuse: bool) -> io::Result<()> {
    socket.set_reuse_address(reuse)
}

/// Set the kernel send buffer size.
pub fn set_send_buffer_size(socket: SockRef<'_>, size: usize) -> io::Result<()> {
    socket.set_send_buffer_size(size)
}

/// Set the kernel receive buffer size.
pub fn set_recv_buffer_size(socket: SockRef<'_>, size: usize) -> io::Result<()> {
    socket.set_recv_buffer_size(size)
}
