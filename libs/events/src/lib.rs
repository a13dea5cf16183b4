//! # netmux-events
//!
//! Event records produced by the multiplexer and the queue that holds them.
//!
//! ## Design Principles
//!
//! - Events are appended in the order they are produced and read strictly FIFO
//! - The queue stores records in their wire encoding, so a record can be
//!   handed to another process byte for byte
//! - Reading never consumes a record the caller could not fit
//!
//! ## Record Encoding
//!
//! ```text
//! +--------------+----------+-------------+-------------+-----------------+
//! | length (u32) | kind u16 | wparam i32  | lparam i32  | payload ...     |
//! +--------------+----------+-------------+-------------+-----------------+
//! ```
//!
//! All integers are little-endian and `length` includes the 14-byte header.
//!
//! ## Event Kinds
//!
//! - `New`: listener bound, outbound connect started, or inbound accepted
//! - `Leave`: connection destroyed; payload carries socket error and close code
//! - `Estab`: outbound connection established
//! - `Data`: one decoded message

mod error;
mod event;
mod queue;

pub use error::EventError;
pub use event::*;
pub use queue::{decode_record, EventQueue, RecordHeader, RECORD_HEADER_LEN};
