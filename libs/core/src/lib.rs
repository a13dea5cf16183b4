//! # netmux-core
//!
//! A single-threaded, non-blocking TCP multiplexer.
//!
//! One [`Core`] owns a poller, a table of connections keyed by generational
//! [`Handle`]s, and a FIFO of [`Event`]s. The caller drives it by calling
//! [`Core::process`] and then draining events:
//!
//! ```text
//!   new_listener / new_connect / new_assign
//!                  |
//!                  v
//!   +-----------------------------+      +----------------+
//!   |  process(timeout)           | ---> |  event queue   | ---> read_event / pop_event
//!   |   accept, connect, recv,    |      |  NEW ESTAB     |
//!   |   frame, send, idle sweep   |      |  DATA LEAVE    |
//!   +-----------------------------+      +----------------+
//!                  ^
//!                  |
//!        send / send_vector / close
//! ```
//!
//! ## Design Principles
//!
//! - Nothing blocks: every socket is non-blocking and `process` returns
//!   after at most one poll timeout
//! - Faults never escape `process`; they close the connection and surface as
//!   a LEAVE event carrying a numeric code
//! - A destroyed handle is never confused with a live one: slot reuse always
//!   bumps the generation
//! - Frames are decoded into one shared scratch buffer that only grows
//!
//! ## Close Codes
//!
//! | Code | Meaning                                   |
//! |------|-------------------------------------------|
//! | 2000 | receive failed or peer closed             |
//! | 2001 | frame header violated the size limits     |
//! | 2002 | scratch buffer could not grow             |
//! | 2003 | send or connect failed                    |
//! | 2004 | idle timeout                              |
//! | 2005 | send queue over its limit                 |
//! | 2010 | stream found closed after processing      |

mod config;
mod error;
mod firewall;
mod idle;
mod mux;
mod options;
mod scratch;
mod stats;
mod stream;

pub use config::{
    CoreConfig, DEFAULT_BACKLOG, DEFAULT_EVENT_CAPACITY, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_SCRATCH_CAPACITY,
};
pub use error::CoreError;
pub use firewall::Firewall;
pub use mux::{Core, Handles};
pub use options::{ConnectionKind, SocketOption};
pub use stats::CoreStats;
pub use stream::{ByteStream, RecvOutcome, StreamState, RAW_CHUNK};

pub use netmux_events::{Event, EventKind, LeaveCode, LeaveInfo, RecordHeader};
pub use netmux_framing::HeaderMode;
pub use netmux_id::Handle;
