//! # netmux-framing
//!
//! Message framing on top of byte streams, plus the optional RC4 layer.
//!
//! A connection picks one of fourteen header modes. Modes 0–11 prefix each
//! message with a 1, 2 or 4 byte length in either byte order; the upper six
//! of those announce only the payload length, the lower six count the header
//! too. Mode 12 packs a caller-supplied mask byte above a 24-bit length.
//! Mode 13 has no header at all: whatever is buffered is one message.
//!
//! Encoding and decoding are pure functions of the mode and the first
//! header bytes, so a decoder can be asked again every pass until enough
//! bytes have arrived.

mod error;
mod header;
mod rc4;

pub use error::FramingError;
pub use header::{decode_frame, encode_header, FrameStatus, HeaderBytes, HeaderMode};
pub use rc4::Rc4;
