//! # netmux-id
//!
//! Connection handles and the slot table that issues them.
//!
//! ## Design Principles
//!
//! - A handle is an opaque 31-bit value: `generation << 16 | slot`
//! - Lookups are O(1) and reject handles whose slot was recycled
//! - A recycled slot always comes back with a different generation
//! - Occupied slots are linked in creation order for head/next/prev walks
//!
//! ## Handle Format
//!
//! ```text
//!  30            16 15             0
//! +----------------+----------------+
//! |   generation   |      slot      |
//! +----------------+----------------+
//! ```
//!
//! The generation is a table-wide counter in `1..0x7fff`, so a handle is
//! always positive when viewed as an `i32` and never zero.

mod error;
mod handle;
mod table;

pub use error::IdError;
pub use handle::Handle;
pub use table::{HandleTable, Iter, MAX_LIVE_HANDLES};
