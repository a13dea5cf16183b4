//! Multiplexer configuration.

use std::time::Duration;

use netmux_id::MAX_LIVE_HANDLES;

/// Default ceiling on a decoded message, header included.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 0x80_0000;

/// Initial size of the shared scratch buffer.
pub const DEFAULT_SCRATCH_CAPACITY: usize = 0x40_0000;

/// Listen backlog for every listener.
pub const DEFAULT_BACKLOG: i32 = 20;

/// Readiness events fetched per poll.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Settings for one [`Core`](crate::Core).
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Close connections idle for longer than this. `None` disables eviction.
    pub idle_timeout: Option<Duration>,

    /// Send-queue ceiling copied into new connections (0 = unlimited).
    pub send_limit: usize,

    /// Maximum decoded frame size copied into new connections.
    pub max_message_size: usize,

    /// Initial capacity of the shared scratch buffer.
    pub scratch_capacity: usize,

    /// Listen backlog.
    pub backlog: i32,

    /// Readiness events fetched per poll.
    pub event_capacity: usize,

    /// Inbound connections are refused once this many handles are live.
    pub max_connections: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            send_limit: 0,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
            backlog: DEFAULT_BACKLOG,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_connections: MAX_LIVE_HANDLES,
        }
    }
}

impl CoreConfig {
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_limits(mut self, send_limit: usize, max_message_size: usize) -> Self {
        self.send_limit = send_limit;
        self.max_message_size = max_message_size;
        self
    }

    pub fn with_scratch_capacity(mut self, capacity: usize) -> Self {
        self.scratch_capacity = capacity;
        self
    }

    /// Caps live handles counted at accept time, never above the table's own limit.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.min(MAX_LIVE_HANDLES);
        self
    }
}
