//! Typed decoding of raw little-endian guest memory.

use encoding_rs::UTF_16LE;
use memchr::memchr;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Declared type of a field read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    F32,
    /// Raw bytes of caller-specified length.
    Bytes,
    /// Null-terminated UTF-8, caller-bounded.
    Utf8,
    /// Null-terminated UTF-16LE, caller-bounded.
    Utf16,
}

impl ValueKind {
    /// Width in bytes for fixed-width kinds; `None` for length-prefixed ones.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::U8 | Self::I8 => Some(1),
            Self::U16 | Self::I16 => Some(2),
            Self::U32 | Self::I32 | Self::F32 => Some(4),
            Self::U64 => Some(8),
            Self::Bytes | Self::Utf8 | Self::Utf16 => None,
        }
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    Float(f32),
    Bytes(Vec<u8>),
    Text(String),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned(v) => Some(*v),
            Self::Signed(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Signed(v) => Some(*v),
            Self::Unsigned(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

fn slice_at(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| bytes.get(offset..end))
        .ok_or_else(|| {
            Error::Decode(format!(
                "read of {} bytes at offset {} overruns {}-byte buffer",
                len,
                offset,
                bytes.len()
            ))
        })
}

/// Decode a fixed-width scalar at `offset`.
///
/// A kind that overruns the buffer is a schema bug, not a runtime condition:
/// it trips the debug assertion in development and surfaces as a decode
/// error in release builds.
pub fn decode_scalar(bytes: &[u8], offset: usize, kind: ValueKind) -> Result<Value> {
    let size = kind
        .fixed_size()
        .ok_or_else(|| Error::Decode(format!("{:?} is not fixed-width", kind)))?;
    debug_assert!(
        offset + size <= bytes.len(),
        "scalar {:?} at offset {} overruns {}-byte region",
        kind,
        offset,
        bytes.len()
    );
    let s = slice_at(bytes, offset, size)?;

    let value = match kind {
        ValueKind::U8 => Value::Unsigned(s[0] as u64),
        ValueKind::U16 => Value::Unsigned(u16::from_le_bytes([s[0], s[1]]) as u64),
        ValueKind::U32 => Value::Unsigned(u32::from_le_bytes([s[0], s[1], s[2], s[3]]) as u64),
        ValueKind::U64 => Value::Unsigned(u64::from_le_bytes(s.try_into().unwrap())),
        ValueKind::I8 => Value::Signed(s[0] as i8 as i64),
        ValueKind::I16 => Value::Signed(i16::from_le_bytes([s[0], s[1]]) as i64),
        ValueKind::I32 => Value::Signed(i32::from_le_bytes([s[0], s[1], s[2], s[3]]) as i64),
        ValueKind::F32 => Value::Float(f32::from_le_bytes([s[0], s[1], s[2], s[3]])),
        _ => unreachable!(),
    };
    Ok(value)
}

/// Decode a null-terminated UTF-8 string, truncating at `max_len` when no
/// terminator shows up within the bound.
pub fn decode_utf8(bytes: &[u8], max_len: usize) -> String {
    let bound = bytes.len().min(max_len);
    let window = &bytes[..bound];
    let end = memchr(0, window).unwrap_or(bound);
    String::from_utf8_lossy(&window[..end]).into_owned()
}

/// Decode a null-terminated UTF-16LE string (player names, machine names).
pub fn decode_utf16(bytes: &[u8], max_len: usize) -> String {
    let bound = bytes.len().min(max_len) & !1;
    let window = &bytes[..bound];
    let end = window
        .chunks_exact(2)
        .position(|pair| pair == [0, 0])
        .map(|i| i * 2)
        .unwrap_or(bound);
    let (decoded, _, _) = UTF_16LE.decode(&window[..end]);
    decoded.into_owned()
}
