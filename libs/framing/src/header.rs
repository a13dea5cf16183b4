//! Header modes and the length-prefix codec.
//!
//! Wire layout per mode:
//!
//! | mode | width | order | length field counts |
//! |------|-------|-------|---------------------|
//! | 0, 6 | 2 | LSB first | 0: header + payload, 6: payload |
//! | 1, 7 | 2 | MSB first | 1: header + payload, 7: payload |
//! | 2, 8 | 4 | LSB first | 2: header + payload, 8: payload |
//! | 3, 9 | 4 | MSB first | 3: header + payload, 9: payload |
//! | 4, 10 | 1 | - | 4: header + payload, 10: payload |
//! | 5, 11 | 1 | - | 5: header + payload, 11: payload |
//! | 12 | 4 | LSB first | mask in bits 24..32, header + payload in bits 0..24 |
//! | 13 | 0 | - | no header |

use std::str::FromStr;

use crate::FramingError;

/// Selects how message boundaries are written on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum HeaderMode {
    #[default]
    WordLsb = 0,
    WordMsb = 1,
    DwordLsb = 2,
    DwordMsb = 3,
    ByteLsb = 4,
    ByteMsb = 5,
    WordLsbExclusive = 6,
    WordMsbExclusive = 7,
    DwordLsbExclusive = 8,
    DwordMsbExclusive = 9,
    ByteLsbExclusive = 10,
    ByteMsbExclusive = 11,
    DwordMask = 12,
    Raw = 13,
}

const HEADER_LEN: [usize; 14] = [2, 2, 4, 4, 1, 1, 2, 2, 4, 4, 1, 1, 4, 0];
const HEADER_INC: [usize; 14] = [0, 0, 0, 0, 0, 0, 2, 2, 4, 4, 1, 1, 0, 0];
const ALL_MODES: [HeaderMode; 14] = [
    HeaderMode::WordLsb,
    HeaderMode::WordMsb,
    HeaderMode::DwordLsb,
    HeaderMode::DwordMsb,
    HeaderMode::ByteLsb,
    HeaderMode::ByteMsb,
    HeaderMode::WordLsbExclusive,
    HeaderMode::WordMsbExclusive,
    HeaderMode::DwordLsbExclusive,
    HeaderMode::DwordMsbExclusive,
    HeaderMode::ByteLsbExclusive,
    HeaderMode::ByteMsbExclusive,
    HeaderMode::DwordMask,
    HeaderMode::Raw,
];

/// Largest value the 24-bit length of mode 12 can hold.
const MASK_LEN_MAX: usize = 0x00ff_ffff;

impl HeaderMode {
    /// Every mode, in numeric order.
    pub const ALL: [HeaderMode; 14] = ALL_MODES;

    /// Bytes the header occupies on the wire.
    pub const fn header_len(self) -> usize {
        HEADER_LEN[self as usize]
    }

    /// Amount the decoded length field is short of the full frame.
    pub const fn increment(self) -> usize {
        HEADER_INC[self as usize]
    }

    /// Numeric mode.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Largest payload this mode can announce.
    pub const fn max_payload(self) -> usize {
        let field_max = match self.header_len() {
            0 => return usize::MAX,
            1 => u8::MAX as usize,
            2 => u16::MAX as usize,
            _ => match self {
                HeaderMode::DwordMask => MASK_LEN_MAX,
                _ => u32::MAX as usize,
            },
        };
        field_max + self.increment() - self.header_len()
    }

    /// The base layout (width and byte order) this mode shares with its family.
    const fn layout(self) -> Layout {
        match self {
            HeaderMode::WordLsb | HeaderMode::WordLsbExclusive => Layout::U16Le,
            HeaderMode::WordMsb | HeaderMode::WordMsbExclusive => Layout::U16Be,
            HeaderMode::DwordLsb | HeaderMode::DwordLsbExclusive | HeaderMode::DwordMask => {
                Layout::U32Le
            }
            HeaderMode::DwordMsb | HeaderMode::DwordMsbExclusive => Layout::U32Be,
            HeaderMode::ByteLsb
            | HeaderMode::ByteMsb
            | HeaderMode::ByteLsbExclusive
            | HeaderMode::ByteMsbExclusive => Layout::U8,
            HeaderMode::Raw => Layout::None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Layout {
    U8,
    U16Le,
    U16Be,
    U32Le,
    U32Be,
    None,
}

impl TryFrom<u8> for HeaderMode {
    type Error = FramingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ALL_MODES
            .get(value as usize)
            .copied()
            .ok_or_else(|| FramingError::InvalidMode(value.to_string()))
    }
}

impl FromStr for HeaderMode {
    type Err = FramingError;

    /// Accepts the numeric mode or its kebab-case name (`dword-lsb`, `raw`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<u8>() {
            return Self::try_from(n);
        }
        let mode = match s.to_ascii_lowercase().as_str() {
            "word-lsb" => HeaderMode::WordLsb,
            "word-msb" => HeaderMode::WordMsb,
            "dword-lsb" => HeaderMode::DwordLsb,
            "dword-msb" => HeaderMode::DwordMsb,
            "byte-lsb" => HeaderMode::ByteLsb,
            "byte-msb" => HeaderMode::ByteMsb,
            "word-lsb-exclusive" => HeaderMode::WordLsbExclusive,
            "word-msb-exclusive" => HeaderMode::WordMsbExclusive,
            "dword-lsb-exclusive" => HeaderMode::DwordLsbExclusive,
            "dword-msb-exclusive" => HeaderMode::DwordMsbExclusive,
            "byte-lsb-exclusive" => HeaderMode::ByteLsbExclusive,
            "byte-msb-exclusive" => HeaderMode::ByteMsbExclusive,
            "dword-mask" => HeaderMode::DwordMask,
            "raw" => HeaderMode::Raw,
            _ => return Err(FramingError::InvalidMode(s.to_string())),
        };
        Ok(mode)
    }
}

impl std::fmt::Display for HeaderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// An encoded header, at most four bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderBytes {
    bytes: [u8; 4],
    len: usize,
}

impl HeaderBytes {
    /// The header as written on the wire.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Mutable view, used to obfuscate the header in place.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.len]
    }

    /// Header length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for mode 13.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Builds the header announcing a payload of `payload_len` bytes.
///
/// `mask` is only used by [`HeaderMode::DwordMask`].
pub fn encode_header(
    mode: HeaderMode,
    payload_len: usize,
    mask: u8,
) -> Result<HeaderBytes, FramingError> {
    let max = mode.max_payload();
    if payload_len > max {
        return Err(FramingError::PayloadTooLarge {
            len: payload_len,
            max,
        });
    }

    let hdrlen = mode.header_len();
    let value = payload_len + hdrlen - mode.increment();
    let mut bytes = [0u8; 4];

    match mode.layout() {
        Layout::None => {}
        Layout::U8 => bytes[0] = value as u8,
        Layout::U16Le => bytes[..2].copy_from_slice(&(value as u16).to_le_bytes()),
        Layout::U16Be => bytes[..2].copy_from_slice(&(value as u16).to_be_bytes()),
        Layout::U32Le => {
            let mut word = value as u32;
            if mode == HeaderMode::DwordMask {
                word = (word & MASK_LEN_MAX as u32) | ((mask as u32) << 24);
            }
            bytes.copy_from_slice(&word.to_le_bytes());
        }
        Layout::U32Be => bytes.copy_from_slice(&(value as u32).to_be_bytes()),
    }

    Ok(HeaderBytes { bytes, len: hdrlen })
}

/// Outcome of inspecting the front of a receive queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Not enough bytes buffered yet; nothing was consumed.
    Incomplete,
    /// A whole frame is buffered.
    Ready {
        /// Frame length including the header.
        total: usize,
        /// Header bytes to skip before the payload.
        header: usize,
        /// Mask byte (mode 12 only, 0 otherwise).
        mask: u8,
    },
}

/// Decodes the frame at the front of `buffered`.
///
/// `raw_cap` bounds a mode-13 message; `max_size` bounds every other frame.
pub fn decode_frame(
    mode: HeaderMode,
    buffered: &[u8],
    raw_cap: usize,
    max_size: usize,
) -> Result<FrameStatus, FramingError> {
    let hdrlen = mode.header_len();

    if mode == HeaderMode::Raw {
        let total = buffered.len().min(raw_cap);
        if total == 0 {
            return Ok(FrameStatus::Incomplete);
        }
        return Ok(FrameStatus::Ready {
            total,
            header: 0,
            mask: 0,
        });
    }

    if buffered.len() < hdrlen {
        return Ok(FrameStatus::Incomplete);
    }

    let head = &buffered[..hdrlen];
    let mut mask = 0u8;
    let field = match mode.layout() {
        Layout::U8 => head[0] as usize,
        Layout::U16Le => u16::from_le_bytes([head[0], head[1]]) as usize,
        Layout::U16Be => u16::from_be_bytes([head[0], head[1]]) as usize,
        Layout::U32Le => {
            let word = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
            if mode == HeaderMode::DwordMask {
                mask = (word >> 24) as u8;
                (word & MASK_LEN_MAX as u32) as usize
            } else {
                word as usize
            }
        }
        Layout::U32Be => u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as usize,
        Layout::None => unreachable!("raw mode handled above"),
    };

    let total = field + mode.increment();
    if total < hdrlen {
        return Err(FramingError::FrameTooShort {
            len: total,
            header: hdrlen,
        });
    }
    if total > max_size {
        return Err(FramingError::FrameTooLarge {
            len: total,
            max: max_size,
        });
    }
    if buffered.len() < total {
        return Ok(FrameStatus::Incomplete);
    }

    Ok(FrameStatus::Ready {
        total,
        header: hdrlen,
        mask,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAX: usize = 0x80_0000;

    fn frame(mode: HeaderMode, payload: &[u8], mask: u8) -> Vec<u8> {
        let header = encode_header(mode, payload.len(), mask).unwrap();
        let mut out = header.as_slice().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_mode_table() {
        for (n, mode) in HeaderMode::ALL.iter().enumerate() {
            assert_eq!(HeaderMode::try_from(n as u8).unwrap(), *mode);
        }
        assert!(HeaderMode::try_from(14).is_err());
        assert_eq!(HeaderMode::DwordMsbExclusive.header_len(), 4);
        assert_eq!(HeaderMode::DwordMsbExclusive.increment(), 4);
        assert_eq!(HeaderMode::Raw.header_len(), 0);
    }

    #[test]
    fn test_parse_names_and_numbers() {
        assert_eq!("2".parse::<HeaderMode>().unwrap(), HeaderMode::DwordLsb);
        assert_eq!("dword-mask".parse::<HeaderMode>().unwrap(), HeaderMode::DwordMask);
        assert_eq!("RAW".parse::<HeaderMode>().unwrap(), HeaderMode::Raw);
        assert!("20".parse::<HeaderMode>().is_err());
        assert!("quad".parse::<HeaderMode>().is_err());
    }

    #[test]
    fn test_known_encodings() {
        assert_eq!(
            encode_header(HeaderMode::WordLsb, 5, 0).unwrap().as_slice(),
            &[7, 0]
        );
        assert_eq!(
            encode_header(HeaderMode::WordMsb, 5, 0).unwrap().as_slice(),
            &[0, 7]
        );
        assert_eq!(
            encode_header(HeaderMode::DwordLsb, 5, 0).unwrap().as_slice(),
            &[9, 0, 0, 0]
        );
        assert_eq!(
            encode_header(HeaderMode::DwordMsbExclusive, 5, 0)
                .unwrap()
                .as_slice(),
            &[0, 0, 0, 5]
        );
        assert_eq!(
            encode_header(HeaderMode::ByteLsbExclusive, 5, 0)
                .unwrap()
                .as_slice(),
            &[5]
        );
        assert_eq!(
            encode_header(HeaderMode::DwordMask, 5, 0xab)
                .unwrap()
                .as_slice(),
            &[9, 0, 0, 0xab]
        );
        assert!(encode_header(HeaderMode::Raw, 5, 0).unwrap().is_empty());
    }

    #[test]
    fn test_payload_too_large_for_field() {
        assert_eq!(
            encode_header(HeaderMode::ByteLsb, 254, 0).unwrap().as_slice(),
            &[255]
        );
        assert_eq!(
            encode_header(HeaderMode::ByteLsb, 255, 0),
            Err(FramingError::PayloadTooLarge { len: 255, max: 254 })
        );
        assert!(encode_header(HeaderMode::ByteLsbExclusive, 255, 0).is_ok());
        assert!(encode_header(HeaderMode::WordLsb, 0xfffe, 0).is_err());
        assert!(encode_header(HeaderMode::DwordMask, MASK_LEN_MAX - 3, 0).is_err());
    }

    #[test]
    fn test_incomplete_until_header_present() {
        let data = frame(HeaderMode::DwordLsb, b"hello", 0);
        for cut in 0..4 {
            assert_eq!(
                decode_frame(HeaderMode::DwordLsb, &data[..cut], 0x4000, MAX),
                Ok(FrameStatus::Incomplete)
            );
        }
        // Header present, payload partial: still incomplete, and repeatable.
        for _ in 0..3 {
            assert_eq!(
                decode_frame(HeaderMode::DwordLsb, &data[..6], 0x4000, MAX),
                Ok(FrameStatus::Incomplete)
            );
        }
        assert_eq!(
            decode_frame(HeaderMode::DwordLsb, &data, 0x4000, MAX),
            Ok(FrameStatus::Ready {
                total: 9,
                header: 4,
                mask: 0
            })
        );
    }

    #[test]
    fn test_rejects_short_and_oversized_frames() {
        let err = decode_frame(HeaderMode::WordLsb, &[1, 0], 0x4000, MAX).unwrap_err();
        assert_eq!(err, FramingError::FrameTooShort { len: 1, header: 2 });
        assert!(err.is_protocol_fault());

        let err = decode_frame(HeaderMode::DwordLsb, &[0, 0, 0, 1], 0x4000, 1024).unwrap_err();
        assert_eq!(
            err,
            FramingError::FrameTooLarge {
                len: 0x0100_0000,
                max: 1024
            }
        );

        // Exclusive modes can never be shorter than their header.
        assert_eq!(
            decode_frame(HeaderMode::WordLsbExclusive, &[0, 0], 0x4000, MAX),
            Ok(FrameStatus::Ready {
                total: 2,
                header: 2,
                mask: 0
            })
        );
    }

    #[test]
    fn test_raw_mode_takes_what_is_buffered() {
        assert_eq!(
            decode_frame(HeaderMode::Raw, &[], 4, MAX),
            Ok(FrameStatus::Incomplete)
        );
        assert_eq!(
            decode_frame(HeaderMode::Raw, b"abcdef", 4, MAX),
            Ok(FrameStatus::Ready {
                total: 4,
                header: 0,
                mask: 0
            })
        );
    }

    #[test]
    fn test_mask_survives_decode() {
        let data = frame(HeaderMode::DwordMask, b"xy", 0x7e);
        assert_eq!(
            decode_frame(HeaderMode::DwordMask, &data, 0x4000, MAX),
            Ok(FrameStatus::Ready {
                total: 6,
                header: 4,
                mask: 0x7e
            })
        );
    }

    proptest! {
        #[test]
        fn prop_encode_decode_roundtrip(mode_n in 0u8..13, len in 0usize..70_000, mask in any::<u8>()) {
            let mode = HeaderMode::try_from(mode_n).unwrap();
            let len = len.min(mode.max_payload());
            let header = encode_header(mode, len, mask).unwrap();
            let mut buffered = header.as_slice().to_vec();
            buffered.resize(header.len() + len, 0);

            let status = decode_frame(mode, &buffered, 0x4000, usize::MAX).unwrap();
            match status {
                FrameStatus::Ready { total, header: h, .. } => {
                    prop_assert_eq!(h, mode.header_len());
                    prop_assert_eq!(total - h, len);
                }
                FrameStatus::Incomplete => prop_assert!(false, "complete frame reported incomplete"),
            }

            if mode.header_len() > 0 {
                let short = &buffered[..mode.header_len() - 1];
                prop_assert_eq!(
                    decode_frame(mode, short, 0x4000, usize::MAX).unwrap(),
                    FrameStatus::Incomplete
                );
            }
        }
    }
}
