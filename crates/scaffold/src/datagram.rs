//! Register-access datagram encoder/decoder.
//!
//! This module handles the pure byte-level side of the host↔board protocol:
//! building request datagrams and splitting read responses. It performs no
//! I/O; chunking and acknowledgment checking live in [`bus`](crate::bus).
//!
//! # Request format
//!
//! ```text
//! <cmd> <addr_hi> <addr_lo> [<poll_hi> <poll_lo> <mask> <value>] [<size>] [<payload>...]
//! ```
//!
//! - `cmd`: bit 0 = write, bit 1 = explicit size byte follows, bit 2 = poll
//! - `addr`: big-endian register address
//! - poll fields present only when bit 2 is set
//! - `size`: present only when the chunk is longer than one byte (1..=255)
//! - `payload`: write datagrams only
//!
//! # Responses
//!
//! A write is answered by one byte, the number of bytes the board accepted.
//! A read is answered by `size` data bytes followed by the number of bytes
//! actually read. Either count falls short of `size` when the polling
//! condition was not met before the device timeout.

use bytes::{BufMut, BytesMut};
use scaffold_core::{Error, Result};

/// Command bit set for write requests.
pub const CMD_WRITE: u8 = 0x01;

/// Command bit announcing an explicit size byte.
pub const CMD_SIZE: u8 = 0x02;

/// Command bit announcing poll fields.
pub const CMD_POLL: u8 = 0x04;

/// Opcode of the polling-timeout configuration datagram.
pub const CMD_SET_TIMEOUT: u8 = 0x08;

/// Largest chunk a single datagram can carry.
pub const MAX_CHUNK: usize = 255;

/// Transfer direction of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Device-side completion condition attached to a read or write.
///
/// The board waits, for each byte of the transfer, until
/// `register[address] & mask == value` or its polling timeout expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poll {
    pub address: u16,
    pub mask: u8,
    pub value: u8,
}

impl Poll {
    /// Poll `address` with mask `0xff` and expected value `0x00`.
    pub fn on(address: u16) -> Self {
        Poll {
            address,
            mask: 0xff,
            value: 0x00,
        }
    }

    /// Replace the mask.
    pub fn mask(mut self, mask: u8) -> Self {
        self.mask = mask;
        self
    }

    /// Replace the expected value.
    pub fn value(mut self, value: u8) -> Self {
        self.value = value;
        self
    }

    /// Wait until all bits of `bits` are set.
    pub fn until_set(address: u16, bits: u8) -> Self {
        Poll::on(address).mask(bits).value(bits)
    }

    /// Wait until all bits of `bits` are clear.
    pub fn until_clear(address: u16, bits: u8) -> Self {
        Poll::on(address).mask(bits).value(0)
    }
}

/// Build the header of a request datagram for one chunk.
///
/// `size` must be in `1..=255`. For writes, the caller appends exactly
/// `size` payload bytes; see [`encode_write`].
pub fn encode_header(
    direction: Direction,
    address: u16,
    size: usize,
    poll: Option<&Poll>,
) -> Result<BytesMut> {
    if size == 0 || size > MAX_CHUNK {
        return Err(Error::InvalidArgument(format!(
            "chunk size {size} outside 1..={MAX_CHUNK}"
        )));
    }

    let mut command = match direction {
        Direction::Read => 0,
        Direction::Write => CMD_WRITE,
    };
    if size > 1 {
        command |= CMD_SIZE;
    }
    if poll.is_some() {
        command |= CMD_POLL;
    }

    let capacity = 3 + if poll.is_some() { 4 } else { 0 } + 1;
    let mut buf = BytesMut::with_capacity(capacity);
    buf.put_u8(command);
    buf.put_u16(address);
    if let Some(p) = poll {
        buf.put_u16(p.address);
        buf.put_u8(p.mask);
        buf.put_u8(p.value);
    }
    if size > 1 {
        buf.put_u8(size as u8);
    }
    Ok(buf)
}

/// Encode a read request for one chunk of `size` bytes.
pub fn encode_read(address: u16, size: usize, poll: Option<&Poll>) -> Result<Vec<u8>> {
    Ok(encode_header(Direction::Read, address, size, poll)?.to_vec())
}

/// Encode a write request carrying `chunk` (1..=255 bytes).
///
/// # Example
///
/// ```
/// use scaffold::datagram::encode_write;
///
/// // Write 0x14 to register 0x0201.
/// let bytes = encode_write(0x0201, &[0x14], None).unwrap();
/// assert_eq!(bytes, vec![0x01, 0x02, 0x01, 0x14]);
/// ```
pub fn encode_write(address: u16, chunk: &[u8], poll: Option<&Poll>) -> Result<Vec<u8>> {
    let mut buf = encode_header(Direction::Write, address, chunk.len(), poll)?;
    buf.put_slice(chunk);
    Ok(buf.to_vec())
}

/// Encode the polling-timeout configuration datagram. The board does not
/// answer it.
pub fn encode_set_timeout(units: u32) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(CMD_SET_TIMEOUT);
    buf.put_u32(units);
    buf.to_vec()
}

/// A decoded read response for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse<'a> {
    /// The bytes the board actually read (`ack` bytes).
    pub data: &'a [u8],
    /// The trailing acknowledgment count.
    pub ack: usize,
}

impl ReadResponse<'_> {
    /// Whether the board returned every requested byte.
    pub fn is_complete(&self, requested: usize) -> bool {
        self.ack == requested
    }
}

/// Split a raw read response (`requested` data bytes plus one ack byte).
///
/// Fails if the buffer length does not match or the board claims more
/// bytes than were requested.
pub fn decode_read(raw: &[u8], requested: usize) -> Result<ReadResponse<'_>> {
    let Some((&ack, payload)) = raw.split_last() else {
        return Err(Error::Protocol("empty read response".into()));
    };
    if payload.len() != requested {
        return Err(Error::Protocol(format!(
            "read response carries {} data bytes, expected {requested}",
            payload.len()
        )));
    }
    let ack = ack as usize;
    if ack > requested {
        return Err(Error::Protocol(format!(
            "board acknowledged {ack} bytes for a {requested}-byte read"
        )));
    }
    Ok(ReadResponse {
        data: &payload[..ack],
        ack,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_byte_read_has_no_size() {
        let bytes = encode_read(0x0100, 1, None).unwrap();
        assert_eq!(bytes, vec![0x00, 0x01, 0x00]);
    }

    #[test]
    fn multi_byte_read_has_size() {
        let bytes = encode_read(0x0100, 66, None).unwrap();
        assert_eq!(bytes, vec![0x02, 0x01, 0x00, 66]);
    }

    #[test]
    fn polled_write_layout() {
        let poll = Poll::until_set(0x0400, 0x01);
        let bytes = encode_write(0x0404, b"hi", Some(&poll)).unwrap();
        assert_eq!(
            bytes,
            vec![0x07, 0x04, 0x04, 0x04, 0x00, 0x01, 0x01, 0x02, b'h', b'i']
        );
    }

    #[test]
    fn polled_single_read_layout() {
        let poll = Poll::until_clear(0x0500, 0x04);
        let bytes = encode_read(0x0505, 1, Some(&poll)).unwrap();
        assert_eq!(bytes, vec![0x04, 0x05, 0x05, 0x05, 0x00, 0x04, 0x00]);
    }

    #[test]
    fn poll_defaults() {
        let p = Poll::on(0x1234);
        assert_eq!(p.mask, 0xff);
        assert_eq!(p.value, 0x00);
    }

    #[test]
    fn chunk_size_bounds() {
        assert!(matches!(
            encode_read(0, 0, None),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            encode_write(0, &[0u8; 256], None),
            Err(Error::InvalidArgument(_))
        ));
        let full = encode_write(0xffff, &[0xaa; 255], None).unwrap();
        assert_eq!(&full[..4], &[0x03, 0xff, 0xff, 0xff]);
        assert_eq!(full.len(), 4 + 255);
    }

    #[test]
    fn set_timeout_layout() {
        assert_eq!(
            encode_set_timeout(0x0102_0304),
            vec![0x08, 0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn decode_complete_read() {
        let raw = [0x10, 0x20, 0x30, 0x03];
        let r = decode_read(&raw, 3).unwrap();
        assert_eq!(r.data, &[0x10, 0x20, 0x30]);
        assert!(r.is_complete(3));
    }

    #[test]
    fn decode_short_read() {
        let raw = [0x10, 0x00, 0x00, 0x01];
        let r = decode_read(&raw, 3).unwrap();
        assert_eq!(r.data, &[0x10]);
        assert!(!r.is_complete(3));
    }

    #[test]
    fn decode_rejects_overlong_ack() {
        let raw = [0x10, 0x05];
        assert!(matches!(decode_read(&raw, 1), Err(Error::Protocol(_))));
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(matches!(decode_read(&[], 1), Err(Error::Protocol(_))));
        assert!(matches!(decode_read(&[1, 2, 1], 1), Err(Error::Protocol(_))));
    }
}
