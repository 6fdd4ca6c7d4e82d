//! Typed byte cursor used by every package encoder/decoder.
//!
//! A [`ByteChannel`] is a small cursor over a [`BytesMut`] buffer: decoders
//! consume bytes from the front, encoders append bytes at the back. Every
//! multi-byte numeric read/write respects the connection's negotiated byte
//! order (`Endianness`), which is fixed once at login (§4.1) and passed
//! in by the caller rather than stored as global state here.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

use crate::error::{Error, Result};

/// Byte order negotiated for the connection. Header fields on the wire are
/// always big-endian regardless of this setting; this only applies to
/// package bodies once a connection has chosen an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

impl Default for Endianness {
    fn default() -> Self {
        // Matches the host's native order, which is what a freshly
        // constructed Login package declares before any negotiation has
        // taken place.
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }
}

/// A typed cursor over an in-memory buffer, reading/writing in the
/// connection's negotiated byte order.
#[derive(Debug, Default)]
pub struct ByteChannel {
    buf: BytesMut,
    order: Endianness,
}

macro_rules! read_int {
    ($name:ident, $ty:ty, $read_be:ident, $read_le:ident) => {
        pub fn $name(&mut self) -> Result<$ty> {
            const WIDTH: usize = std::mem::size_of::<$ty>();
            self.require(WIDTH)?;
            let value = match self.order {
                Endianness::Big => BigEndian::$read_be(&self.buf[..WIDTH]),
                Endianness::Little => LittleEndian::$read_le(&self.buf[..WIDTH]),
            };
            self.buf.advance(WIDTH);
            Ok(value)
        }
    };
}

macro_rules! write_int {
    ($name:ident, $ty:ty, $write_be:ident, $write_le:ident) => {
        pub fn $name(&mut self, value: $ty) {
            let mut tmp = [0u8; std::mem::size_of::<$ty>()];
            match self.order {
                Endianness::Big => BigEndian::$write_be(&mut tmp, value),
                Endianness::Little => LittleEndian::$write_le(&mut tmp, value),
            };
            self.buf.put_slice(&tmp);
        }
    };
}

impl ByteChannel {
    pub fn new(order: Endianness) -> Self {
        ByteChannel {
            buf: BytesMut::new(),
            order,
        }
    }

    pub fn from_bytes(bytes: impl Into<BytesMut>, order: Endianness) -> Self {
        ByteChannel {
            buf: bytes.into(),
            order,
        }
    }

    pub fn order(&self) -> Endianness {
        self.order
    }

    pub fn set_order(&mut self, order: Endianness) {
        self.order = order;
    }

    /// Bytes still unread (for reading) or already written (for writing).
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends more bytes to be read, handed to us by the packet framer
    /// after it pulls another packet off the wire.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_inner(self) -> BytesMut {
        self.buf
    }

    /// A cheap clone of the unread bytes, used to probe-decode a
    /// package without committing to consuming it until the decode
    /// actually succeeds.
    pub fn clone_remaining(&self) -> BytesMut {
        self.buf.clone()
    }

    /// Discards the first `n` bytes, used after a probe-decode to
    /// commit the bytes it consumed.
    pub fn advance(&mut self, n: usize) {
        self.buf.advance(n);
    }

    fn require(&self, n: usize) -> Result<()> {
        if self.buf.len() < n {
            Err(Error::NotEnoughBytes {
                wanted: n,
                available: self.buf.len(),
            })
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.require(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.require(1)?;
        Ok(self.buf.get_i8())
    }

    read_int!(read_u16, u16, read_u16, read_u16);
    read_int!(read_i16, i16, read_i16, read_i16);
    read_int!(read_u32, u32, read_u32, read_u32);
    read_int!(read_i32, i32, read_i32, read_i32);
    read_int!(read_u64, u64, read_u64, read_u64);
    read_int!(read_i64, i64, read_i64, read_i64);
    read_int!(read_f32, f32, read_f32, read_f32);
    read_int!(read_f64, f64, read_f64, read_f64);

    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        self.require(n)?;
        Ok(self.buf.split_to(n).freeze())
    }

    /// Reads `n` bytes and decodes them as a string. The protocol's
    /// character set is negotiated separately (EnvChange, §4.8); this
    /// performs a lossy UTF-8 decode, which is correct for the common
    /// ASCII-compatible server charsets and is what callers fall back to
    /// when they want the raw text rather than opaque bytes.
    pub fn read_string(&mut self, n: usize) -> Result<String> {
        let bytes = self.read_bytes(n)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    write_int!(write_u16, u16, write_u16, write_u16);
    write_int!(write_i16, i16, write_i16, write_i16);
    write_int!(write_u32, u32, write_u32, write_u32);
    write_int!(write_i32, i32, write_i32, write_i32);
    write_int!(write_u64, u64, write_u64, write_u64);
    write_int!(write_i64, i64, write_i64, write_i64);
    write_int!(write_f32, f32, write_f32, write_f32);
    write_int!(write_f64, f64, write_f64, write_f64);

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn write_string(&mut self, value: &str) {
        self.buf.put_slice(value.as_bytes());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_integers_big_endian() {
        let mut ch = ByteChannel::new(Endianness::Big);
        ch.write_u32(0xdead_beef);
        ch.write_i16(-7);
        let bytes = ch.into_inner();
        let mut reader = ByteChannel::from_bytes(bytes, Endianness::Big);
        assert_eq!(reader.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(reader.read_i16().unwrap(), -7);
    }

    #[test]
    fn round_trips_integers_little_endian() {
        let mut ch = ByteChannel::new(Endianness::Little);
        ch.write_u64(0x0102030405060708);
        let bytes = ch.into_inner();
        let mut reader = ByteChannel::from_bytes(bytes, Endianness::Little);
        assert_eq!(reader.read_u64().unwrap(), 0x0102030405060708);
    }

    #[test]
    fn short_read_fails_without_consuming() {
        let mut ch = ByteChannel::from_bytes(vec![1, 2], Endianness::Big);
        let err = ch.read_u32().unwrap_err();
        assert!(matches!(err, Error::NotEnoughBytes { wanted: 4, available: 2 }));
        // buffer untouched; a subsequent smaller read still succeeds
        assert_eq!(ch.read_u16().unwrap(), 0x0102);
    }

    #[test]
    fn string_round_trip() {
        let mut ch = ByteChannel::new(Endianness::Big);
        ch.write_string("hello");
        let bytes = ch.into_inner();
        let mut reader = ByteChannel::from_bytes(bytes, Endianness::Big);
        assert_eq!(reader.read_string(5).unwrap(), "hello");
    }
}
