//! Error types for the multiplexer.

use std::io;
use std::net::SocketAddr;

use netmux_events::EventError;
use netmux_framing::FramingError;
use netmux_id::{Handle, IdError};
use thiserror::Error;

/// Errors returned synchronously by [`Core`](crate::Core) operations.
///
/// Faults detected while processing readiness never surface here; they close
/// the affected connection and are reported as LEAVE events instead.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No live connection behind this handle.
    #[error("unknown handle: {0}")]
    UnknownHandle(Handle),

    /// The operation needs a stream but the handle names a listener.
    #[error("handle {0} is a listener")]
    Listener(Handle),

    /// The send queue was already over its limit; the connection was closed.
    #[error("send queue of {handle} holds {pending} bytes, over its {limit} byte limit")]
    SendLimit {
        handle: Handle,
        pending: usize,
        limit: usize,
    },

    /// Creating or binding the listening socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The outbound connect was refused synchronously.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Negative code for callers that speak integers.
    pub fn code(&self) -> i32 {
        match self {
            CoreError::UnknownHandle(_) => -100,
            CoreError::SendLimit { .. } => -200,
            CoreError::Listener(_) => -300,
            CoreError::Id(_) => -1,
            CoreError::Bind { .. } => -2,
            CoreError::Connect { .. } => -3,
            CoreError::Framing(_) => -4,
            CoreError::Event(_) => -5,
            CoreError::Io(_) => -6,
        }
    }

    /// Returns true when the handle table is full.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, CoreError::Id(e) if e.is_exhausted())
    }

    /// Returns true when the caller passed a stale or foreign handle.
    pub fn is_unknown_handle(&self) -> bool {
        matches!(self, CoreError::UnknownHandle(_))
    }
}
