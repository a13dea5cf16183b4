//! Event kinds, close codes, and the owned event value.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;
use netmux_id::Handle;

use crate::EventError;

/// What happened to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EventKind {
    /// New connection: (handle, listener handle | 0 | -1, address).
    New = 0,
    /// Connection destroyed: (handle, tag, [socket error, close code]).
    Leave = 1,
    /// Outbound connection established: (handle, tag, empty).
    Estab = 2,
    /// Message received: (handle, tag, payload).
    Data = 3,
}

impl TryFrom<u16> for EventKind {
    type Error = EventError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventKind::New),
            1 => Ok(EventKind::Leave),
            2 => Ok(EventKind::Estab),
            3 => Ok(EventKind::Data),
            other => Err(EventError::UnknownKind(other)),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::New => "new",
            EventKind::Leave => "leave",
            EventKind::Estab => "estab",
            EventKind::Data => "data",
        };
        write!(f, "{}", s)
    }
}

/// Close codes the multiplexer attaches to LEAVE events it initiates.
///
/// Explicit closes carry whatever code the caller supplied instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LeaveCode {
    /// Receive failed or the peer closed the stream.
    RecvFailed = 2000,
    /// A frame header announced an impossible or oversized length.
    ProtocolViolation = 2001,
    /// The shared scratch buffer could not grow to fit a frame.
    ScratchGrowth = 2002,
    /// Send or connect failed.
    SendFailed = 2003,
    /// Idle for longer than the configured timeout.
    IdleTimeout = 2004,
    /// The send queue exceeded its configured ceiling.
    SendLimit = 2005,
    /// The connection was found closed after readiness processing.
    Closed = 2010,
}

impl LeaveCode {
    /// Numeric code as carried on the wire.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Maps a numeric code back to a known reason.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            2000 => Some(LeaveCode::RecvFailed),
            2001 => Some(LeaveCode::ProtocolViolation),
            2002 => Some(LeaveCode::ScratchGrowth),
            2003 => Some(LeaveCode::SendFailed),
            2004 => Some(LeaveCode::IdleTimeout),
            2005 => Some(LeaveCode::SendLimit),
            2010 => Some(LeaveCode::Closed),
            _ => None,
        }
    }
}

/// LEAVE payload: the last socket error and the close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveInfo {
    /// Raw OS error of the last failed socket call, 0 if none.
    pub error: u32,
    /// Close code (a [`LeaveCode`] or the caller's own value).
    pub code: u32,
}

impl LeaveInfo {
    /// Encoded size.
    pub const LEN: usize = 8;

    /// Encodes as `error (u32 LE) || code (u32 LE)`.
    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[..4].copy_from_slice(&self.error.to_le_bytes());
        out[4..].copy_from_slice(&self.code.to_le_bytes());
        out
    }

    /// Decodes from a LEAVE payload.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            error: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            code: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        })
    }
}

/// Address family tag: IPv4.
const FAMILY_V4: u8 = 4;

/// Address family tag: IPv6.
const FAMILY_V6: u8 = 6;

/// Encodes a socket address as carried by NEW events.
///
/// Layout: family (4 or 6) || port (u16 BE) || address octets.
pub fn encode_addr(addr: &SocketAddr) -> Vec<u8> {
    let mut buf = Vec::with_capacity(19);
    match addr.ip() {
        IpAddr::V4(ip) => {
            buf.push(FAMILY_V4);
            buf.extend_from_slice(&addr.port().to_be_bytes());
            buf.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            buf.push(FAMILY_V6);
            buf.extend_from_slice(&addr.port().to_be_bytes());
            buf.extend_from_slice(&ip.octets());
        }
    }
    buf
}

/// Decodes an address written by [`encode_addr`].
pub fn decode_addr(data: &[u8]) -> Option<SocketAddr> {
    let (&family, rest) = data.split_first()?;
    if rest.len() < 2 {
        return None;
    }
    let port = u16::from_be_bytes([rest[0], rest[1]]);
    let octets = &rest[2..];
    let ip = match family {
        FAMILY_V4 => {
            let o: [u8; 4] = octets.get(..4)?.try_into().ok()?;
            IpAddr::V4(Ipv4Addr::from(o))
        }
        FAMILY_V6 => {
            let o: [u8; 16] = octets.get(..16)?.try_into().ok()?;
            IpAddr::V6(Ipv6Addr::from(o))
        }
        _ => return None,
    };
    Some(SocketAddr::new(ip, port))
}

/// One dequeued event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// Always the handle of the connection the event is about.
    pub wparam: i32,
    /// Tag, or for NEW the listener handle (accepted), 0 (outbound) or -1 (listener).
    pub lparam: i32,
    pub payload: Bytes,
}

impl Event {
    /// Handle of the connection this event is about.
    pub fn handle(&self) -> Option<Handle> {
        Handle::try_from(self.wparam).ok()
    }

    /// For NEW events on accepted connections, the listener they came from.
    pub fn listener(&self) -> Option<Handle> {
        match self.kind {
            EventKind::New => Handle::try_from(self.lparam).ok(),
            _ => None,
        }
    }

    /// For NEW events, the address the payload carries.
    pub fn addr(&self) -> Option<SocketAddr> {
        match self.kind {
            EventKind::New => decode_addr(&self.payload),
            _ => None,
        }
    }

    /// For LEAVE events, the socket error and close code.
    pub fn leave_info(&self) -> Option<LeaveInfo> {
        match self.kind {
            EventKind::Leave => LeaveInfo::decode(&self.payload),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        for kind in [EventKind::New, EventKind::Leave, EventKind::Estab, EventKind::Data] {
            assert_eq!(EventKind::try_from(kind as u16).unwrap(), kind);
        }
        assert_eq!(EventKind::try_from(9), Err(EventError::UnknownKind(9)));
    }

    #[test]
    fn test_leave_code_lookup() {
        assert_eq!(LeaveCode::from_code(2004), Some(LeaveCode::IdleTimeout));
        assert_eq!(LeaveCode::SendLimit.code(), 2005);
        assert_eq!(LeaveCode::from_code(7), None);
    }

    #[test]
    fn test_leave_info_layout() {
        let info = LeaveInfo { error: 104, code: 2000 };
        let bytes = info.encode();
        assert_eq!(&bytes[..4], &104u32.to_le_bytes());
        assert_eq!(&bytes[4..], &2000u32.to_le_bytes());
        assert_eq!(LeaveInfo::decode(&bytes), Some(info));
        assert_eq!(LeaveInfo::decode(&bytes[..7]), None);
    }

    #[test]
    fn test_addr_encoding() {
        let v4: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let encoded = encode_addr(&v4);
        assert_eq!(encoded, vec![4, 0x1f, 0x90, 127, 0, 0, 1]);
        assert_eq!(decode_addr(&encoded), Some(v4));

        let v6: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        assert_eq!(decode_addr(&encode_addr(&v6)), Some(v6));

        assert_eq!(decode_addr(&[4, 0]), None);
        assert_eq!(decode_addr(&[5, 0, 1, 1, 2, 3, 4]), None);
    }

    #[test]
    fn test_event_accessors() {
        let listener = Handle::try_from(0x0001_0000).unwrap();
        let event = Event {
            kind: EventKind::New,
            wparam: 0x0002_0001,
            lparam: listener.into(),
            payload: Bytes::from(encode_addr(&"10.0.0.1:9".parse().unwrap())),
        };
        assert_eq!(event.handle().unwrap().slot(), 1);
        assert_eq!(event.listener(), Some(listener));
        assert_eq!(event.addr(), Some("10.0.0.1:9".parse().unwrap()));
        assert_eq!(event.leave_info(), None);
    }
}
