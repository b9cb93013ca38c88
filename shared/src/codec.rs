//! Byte-level packet encoding and decoding
//!
//! The query protocol mixes byte orders: every integer and float is
//! little-endian except the address entries of the master server reply,
//! which carry an IPv4 address and a big-endian port. Strings are
//! null-terminated and carry no length prefix.

use std::net::Ipv4Addr;
use thiserror::Error;

/// Failures raised while decoding a packet
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("read out of bounds: wanted {wanted} bytes at offset {pos}, {remaining} remaining")]
    OutOfBounds {
        pos: usize,
        wanted: usize,
        remaining: usize,
    },
    #[error("string starting at offset {pos} is not null terminated")]
    UnterminatedString { pos: usize },
    #[error("unexpected packet header: expected {expected:#04x}, got {got:#04x}")]
    UnexpectedHeader { expected: u8, got: u8 },
    #[error("unexpected packet prefix {0:#010x}")]
    UnexpectedPrefix(i32),
    #[error("split packet responses are not supported")]
    SplitPacket,
}

/// Growable output buffer for outgoing packets
#[derive(Debug, Default, Clone)]
pub struct PacketBuilder {
    buffer: Vec<u8>,
}

impl PacketBuilder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Writes the UTF-8 bytes of `value` followed by a single zero byte
    pub fn write_cstring(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
        self.write_u8(0);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Bounds-checked cursor over a received packet
///
/// Fixed-width reads either consume exactly their width or fail with
/// [`CodecError::OutOfBounds`] without moving the cursor.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, pos: 0 }
    }

    /// Number of bytes consumed so far
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.pos
    }

    /// Returns true while unread bytes remain
    pub fn more(&self) -> bool {
        self.pos < self.buffer.len()
    }

    fn can_read(&self, size: usize) -> Result<(), CodecError> {
        if size > self.remaining() {
            return Err(CodecError::OutOfBounds {
                pos: self.pos,
                wanted: size,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    /// Borrows the next `count` bytes
    pub fn slice(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
        self.can_read(count)?;
        let bytes = &self.buffer[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(N)?);
        Ok(out)
    }

    pub fn read_ipv4(&mut self) -> Result<Ipv4Addr, CodecError> {
        Ok(Ipv4Addr::from(self.array::<4>()?))
    }

    /// Reads a port in network byte order
    pub fn read_port(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Reads a null-terminated string, tolerating truncated input
    ///
    /// Returns `None` without moving the cursor when the buffer ends before
    /// a terminator is found. Invalid UTF-8 is replaced lossily.
    pub fn try_read_string(&mut self) -> Option<String> {
        let rest = &self.buffer[self.pos..];
        let end = rest.iter().position(|&b| b == 0)?;
        let value = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Some(value)
    }

    /// Reads a null-terminated string that must be present in full
    ///
    /// A missing terminator means the packet is malformed; callers abandon
    /// the whole decode on this error.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let pos = self.pos;
        self.try_read_string()
            .ok_or(CodecError::UnterminatedString { pos })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_cstring_encoding() {
        let mut builder = PacketBuilder::new();
        builder.write_cstring("abc");
        builder.write_cstring("");
        assert_eq!(builder.as_bytes(), b"abc\0\0");
        assert_eq!(builder.len(), 5);
    }

    #[test]
    fn test_string_roundtrip_advances_cursor() {
        let mut builder = PacketBuilder::new();
        builder.write_cstring("de_dust2");
        builder.write_u8(7);
        let bytes = builder.into_bytes();

        let mut reader = PacketReader::new(&bytes);
        assert_eq!(reader.try_read_string().as_deref(), Some("de_dust2"));
        assert_eq!(reader.pos(), "de_dust2".len() + 1);
        assert_eq!(reader.read_u8(), Ok(7));
        assert!(!reader.more());
    }

    #[test]
    fn test_multibyte_string_roundtrip() {
        let name = "Сервер №1 ☢";
        let mut builder = PacketBuilder::new();
        builder.write_cstring(name);
        let bytes = builder.into_bytes();

        let mut reader = PacketReader::new(&bytes);
        assert_eq!(reader.read_string().unwrap(), name);
        assert_eq!(reader.pos(), name.len() + 1);
    }

    #[test]
    fn test_unterminated_string() {
        let bytes = b"no terminator";
        let mut reader = PacketReader::new(bytes);

        assert_eq!(reader.try_read_string(), None);
        assert_eq!(reader.pos(), 0);
        assert_eq!(
            reader.read_string(),
            Err(CodecError::UnterminatedString { pos: 0 })
        );
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let bytes = [0x66, 0xff, 0x6f, 0x00];
        let mut reader = PacketReader::new(&bytes);
        assert_eq!(reader.read_string().unwrap(), "f\u{fffd}o");
    }

    #[test]
    fn test_little_endian_integers() {
        let bytes = [
            0x34, 0x12, // u16
            0x78, 0x56, 0x34, 0x12, // u32
            0xff, 0xff, 0xff, 0xff, // i32
            0x01, 0, 0, 0, 0, 0, 0, 0x80, // u64
        ];
        let mut reader = PacketReader::new(&bytes);
        assert_eq!(reader.read_u16(), Ok(0x1234));
        assert_eq!(reader.read_u32(), Ok(0x1234_5678));
        assert_eq!(reader.read_i32(), Ok(-1));
        assert_eq!(reader.read_u64(), Ok(0x8000_0000_0000_0001));
        assert_eq!(reader.pos(), bytes.len());
    }

    #[test]
    fn test_address_fields_are_big_endian() {
        let bytes = [192, 168, 0, 10, 0x69, 0x87];
        let mut reader = PacketReader::new(&bytes);
        assert_eq!(reader.read_ipv4(), Ok(Ipv4Addr::new(192, 168, 0, 10)));
        assert_eq!(reader.read_port(), Ok(27015));
    }

    #[test]
    fn test_float_roundtrip() {
        let mut builder = PacketBuilder::new();
        builder.write_f32(1234.5);
        let bytes = builder.into_bytes();
        assert_eq!(bytes, 1234.5f32.to_le_bytes());

        let mut reader = PacketReader::new(&bytes);
        assert_approx_eq!(reader.read_f32().unwrap(), 1234.5, 0.0001);
    }

    #[test]
    fn test_short_reads_leave_cursor_unchanged() {
        let bytes = [1, 2, 3];
        let mut reader = PacketReader::new(&bytes);
        reader.read_u8().unwrap();

        let err = reader.read_u32().unwrap_err();
        assert_eq!(
            err,
            CodecError::OutOfBounds {
                pos: 1,
                wanted: 4,
                remaining: 2
            }
        );
        assert_eq!(reader.pos(), 1);

        assert!(reader.read_u64().is_err());
        assert!(reader.read_f32().is_err());
        assert!(reader.read_ipv4().is_err());
        assert!(reader.slice(3).is_err());
        assert_eq!(reader.pos(), 1);

        assert_eq!(reader.read_u16(), Ok(0x0302));
        assert!(reader.read_u8().is_err());
        assert_eq!(reader.pos(), 3);
    }

    #[test]
    fn test_empty_buffer() {
        let mut reader = PacketReader::new(&[]);
        assert!(!reader.more());
        assert_eq!(reader.remaining(), 0);
        assert!(reader.read_u8().is_err());
        assert_eq!(reader.try_read_string(), None);
        assert_eq!(reader.slice(0), Ok(&[][..]));
    }
}
