//! # OER Primitives
//!
//! The small subset of Octet Encoding Rules the ILP packets use:
//!
//! ```text
//! uint8 / uint32 / uint64   fixed width, big-endian
//! octet string (fixed)      raw bytes
//! var octet string          length prefix + bytes
//!                             len < 128  → 1 byte: len
//!                             otherwise  → 1 byte: 0x80 | n, then n bytes of len (BE)
//! timestamp                 17 ASCII digits, YYYYMMDDHHmmssfff, UTC
//! envelope                  type:uint8 + var octet string(contents)
//! ```
//!
//! Every read checks bounds first. Nothing in here panics on hostile input.

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use super::error::PacketError;

const TIMESTAMP_LENGTH: usize = 17;

/// Append-only OER writer.
#[derive(Debug, Default)]
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    /// An empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Write a big-endian `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    /// Write a big-endian `u64`.
    pub fn write_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    /// Write raw bytes with no length prefix.
    pub fn write_octet_string(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Write an OER length prefix.
    pub fn write_length_prefix(&mut self, len: usize) {
        if len < 0x80 {
            self.buf.put_u8(len as u8);
            return;
        }
        let be = (len as u64).to_be_bytes();
        let skip = be.iter().take_while(|b| **b == 0).count();
        let width = be.len() - skip;
        self.buf.put_u8(0x80 | width as u8);
        self.buf.put_slice(&be[skip..]);
    }

    /// Write a length-prefixed byte string.
    pub fn write_var_octet_string(&mut self, bytes: &[u8]) {
        self.write_length_prefix(bytes.len());
        self.buf.put_slice(bytes);
    }

    /// Write a length-prefixed ASCII string.
    pub fn write_var_ascii(&mut self, text: &str) -> Result<(), PacketError> {
        if !text.is_ascii() {
            return Err(PacketError::NonAscii);
        }
        self.write_var_octet_string(text.as_bytes());
        Ok(())
    }

    /// Write a 17-digit UTC timestamp.
    pub fn write_timestamp(&mut self, at: &DateTime<Utc>) -> Result<(), PacketError> {
        let text = at.format("%Y%m%d%H%M%S%3f").to_string();
        if text.len() != TIMESTAMP_LENGTH {
            return Err(PacketError::InvalidTimestamp(text));
        }
        self.buf.put_slice(text.as_bytes());
        Ok(())
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the writer.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Bounds-checked OER reader over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    /// Read from `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), PacketError> {
        if self.buf.remaining() < needed {
            return Err(PacketError::UnexpectedEnd {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, PacketError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, PacketError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    /// Read a big-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, PacketError> {
        self.ensure(8)?;
        Ok(self.buf.get_u64())
    }

    /// Read exactly `len` raw bytes.
    pub fn read_octet_string(&mut self, len: usize) -> Result<&'a [u8], PacketError> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Read an OER length prefix.
    pub fn read_length_prefix(&mut self) -> Result<usize, PacketError> {
        let first = self.read_u8()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let width = (first & 0x7f) as usize;
        if width == 0 || width > 8 {
            return Err(PacketError::InvalidLengthPrefix);
        }
        let bytes = self.read_octet_string(width)?;
        let len = bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
        usize::try_from(len).map_err(|_| PacketError::InvalidLengthPrefix)
    }

    /// Read a length-prefixed byte string.
    pub fn read_var_octet_string(&mut self) -> Result<&'a [u8], PacketError> {
        let len = self.read_length_prefix()?;
        self.read_octet_string(len)
    }

    /// Read a length-prefixed ASCII string.
    pub fn read_var_ascii(&mut self) -> Result<&'a str, PacketError> {
        let bytes = self.read_var_octet_string()?;
        if !bytes.is_ascii() {
            return Err(PacketError::NonAscii);
        }
        std::str::from_utf8(bytes).map_err(|_| PacketError::NonAscii)
    }

    /// Read a 17-digit UTC timestamp.
    pub fn read_timestamp(&mut self) -> Result<DateTime<Utc>, PacketError> {
        let raw = self.read_octet_string(TIMESTAMP_LENGTH)?;
        parse_timestamp(raw)
    }

    /// Discard everything left (trailing extensions we do not interpret).
    pub fn skip_rest(&mut self) {
        self.buf = &[];
    }

    /// Fail if anything is left unread.
    pub fn finish(&self) -> Result<(), PacketError> {
        match self.buf.remaining() {
            0 => Ok(()),
            n => Err(PacketError::TrailingBytes(n)),
        }
    }
}

fn parse_timestamp(raw: &[u8]) -> Result<DateTime<Utc>, PacketError> {
    let invalid = || PacketError::InvalidTimestamp(String::from_utf8_lossy(raw).into_owned());
    if !raw.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    let field = |range: std::ops::Range<usize>| -> u32 {
        raw[range]
            .iter()
            .fold(0u32, |acc, d| acc * 10 + (d - b'0') as u32)
    };
    let naive = NaiveDate::from_ymd_opt(field(0..4) as i32, field(4..6), field(6..8))
        .and_then(|date| date.and_hms_milli_opt(field(8..10), field(10..12), field(12..14), field(14..17)))
        .ok_or_else(invalid)?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Wrap `contents` in a typed envelope.
pub fn write_envelope(packet_type: u8, contents: &[u8]) -> Vec<u8> {
    let mut writer = Writer::new();
    writer.write_u8(packet_type);
    writer.write_var_octet_string(contents);
    writer.into_vec()
}

/// Split an envelope into its type byte and contents. The envelope must
/// span the whole buffer.
pub fn read_envelope(bytes: &[u8]) -> Result<(u8, &[u8]), PacketError> {
    let mut reader = Reader::new(bytes);
    let packet_type = reader.read_u8()?;
    let contents = reader.read_var_octet_string()?;
    reader.finish()?;
    Ok((packet_type, contents))
}
