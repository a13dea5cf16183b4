//! Serialized FIFO event queue.

use bytes::{Buf, BufMut, BytesMut};

use crate::{Event, EventError, EventKind};

/// Size of the fixed record header.
pub const RECORD_HEADER_LEN: usize = 14;

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: EventKind,
    pub wparam: i32,
    pub lparam: i32,
    /// Payload length, excluding the header.
    pub len: usize,
}

impl RecordHeader {
    /// Writes the 14-byte header for this record.
    pub fn encode(&self, out: &mut impl BufMut) {
        out.put_u32_le((self.len + RECORD_HEADER_LEN) as u32);
        out.put_u16_le(self.kind as u16);
        out.put_i32_le(self.wparam);
        out.put_i32_le(self.lparam);
    }

    /// Parses a header from the first 14 bytes of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, EventError> {
        if data.len() < RECORD_HEADER_LEN {
            return Err(EventError::Malformed(format!(
                "header needs {} bytes, got {}",
                RECORD_HEADER_LEN,
                data.len()
            )));
        }
        let mut buf = &data[..RECORD_HEADER_LEN];
        let total = buf.get_u32_le() as usize;
        if total < RECORD_HEADER_LEN {
            return Err(EventError::Malformed(format!(
                "record length {} shorter than its header",
                total
            )));
        }
        let kind = EventKind::try_from(buf.get_u16_le())?;
        let wparam = buf.get_i32_le();
        let lparam = buf.get_i32_le();
        Ok(Self {
            kind,
            wparam,
            lparam,
            len: total - RECORD_HEADER_LEN,
        })
    }
}

/// Decodes one complete record from the front of `data`.
///
/// Returns the event and the number of bytes it occupied.
pub fn decode_record(data: &[u8]) -> Result<(Event, usize), EventError> {
    let header = RecordHeader::decode(data)?;
    let total = header.len + RECORD_HEADER_LEN;
    if data.len() < total {
        return Err(EventError::Malformed(format!(
            "record needs {} bytes, got {}",
            total,
            data.len()
        )));
    }
    let payload = bytes::Bytes::copy_from_slice(&data[RECORD_HEADER_LEN..total]);
    Ok((
        Event {
            kind: header.kind,
            wparam: header.wparam,
            lparam: header.lparam,
            payload,
        },
        total,
    ))
}

/// FIFO of wire-encoded event records.
#[derive(Debug, Default)]
pub struct EventQueue {
    buf: BytesMut,
    count: usize,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued records.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true when no record is queued.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bytes currently held, headers included.
    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    /// Appends one record.
    pub fn push(&mut self, kind: EventKind, wparam: i32, lparam: i32, payload: &[u8]) {
        self.buf.reserve(RECORD_HEADER_LEN + payload.len());
        RecordHeader {
            kind,
            wparam,
            lparam,
            len: payload.len(),
        }
        .encode(&mut self.buf);
        self.buf.put_slice(payload);
        self.count += 1;
    }

    /// Payload length of the next record, without consuming it.
    pub fn peek_size(&self) -> Option<usize> {
        if self.buf.len() < 4 {
            return None;
        }
        let total = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        Some((total as usize).saturating_sub(RECORD_HEADER_LEN))
    }

    /// Copies the next record's payload into `out` and consumes it.
    ///
    /// Returns `Ok(None)` when the queue is empty. If `out` is too small the
    /// record stays queued and `BufferTooSmall` reports the size needed.
    pub fn read_into(&mut self, out: &mut [u8]) -> Result<Option<RecordHeader>, EventError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let header = RecordHeader::decode(&self.buf)?;
        if out.len() < header.len {
            return Err(EventError::BufferTooSmall {
                needed: header.len,
                available: out.len(),
            });
        }
        self.buf.advance(RECORD_HEADER_LEN);
        out[..header.len].copy_from_slice(&self.buf[..header.len]);
        self.buf.advance(header.len);
        self.count -= 1;
        Ok(Some(header))
    }

    /// Removes and returns the next record as an owned event.
    pub fn pop(&mut self) -> Option<Event> {
        if self.buf.is_empty() {
            return None;
        }
        let header = RecordHeader::decode(&self.buf).ok()?;
        self.buf.advance(RECORD_HEADER_LEN);
        let payload = self.buf.split_to(header.len).freeze();
        self.count -= 1;
        Some(Event {
            kind: header.kind,
            wparam: header.wparam,
            lparam: header.lparam,
            payload,
        })
    }

    /// Moves every queued record, still encoded, into `out`.
    pub fn drain_encoded(&mut self, out: &mut BytesMut) -> usize {
        let count = self.count;
        out.extend_from_slice(&self.buf);
        self.buf.clear();
        self.count = 0;
        count
    }
}
