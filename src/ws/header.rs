//! Frame header codec (RFC 6455 section 5.2).
//!
//! ```text
//! byte0: FIN(1) RSV1-3(3) OPCODE(4)
//! byte1: MASK(1) PAYLOAD_LEN(7)
//!   126 -> 2 more bytes of big endian length
//!   127 -> 8 more bytes of big endian length
//! MASK set -> 4 bytes of masking key
//! ```

use std::io;
use std::io::Read;

use log::trace;

use crate::buffer::ScratchBuffer;
use crate::util::read_exact_or_eof;
use crate::ws::protocol::{self, OpCode};
use crate::ws::Error;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameHeader {
    pub fin: bool,
    pub op_code: OpCode,
    pub payload_length: u64,
    /// Present iff the mask bit is set.
    pub mask_key: Option<[u8; 4]>,
}

impl FrameHeader {
    pub const fn new(fin: bool, op_code: OpCode, payload_length: u64, mask_key: Option<[u8; 4]>) -> Self {
        Self {
            fin,
            op_code,
            payload_length,
            mask_key,
        }
    }

    #[inline]
    pub const fn masked(&self) -> bool {
        self.mask_key.is_some()
    }

    /// Number of bytes [`FrameHeader::encode`] will emit.
    pub const fn encoded_len(&self) -> usize {
        let extended = match self.payload_length {
            0..=protocol::MAX_DIRECT_LENGTH => 0,
            126..=0xFFFF => 2,
            _ => 8,
        };
        let mask = if self.mask_key.is_some() { 4 } else { 0 };
        2 + extended + mask
    }

    /// Appends the wire image of this header, using the shortest length form.
    pub fn encode(&self, buf: &mut ScratchBuffer) {
        let mut b0 = self.op_code.as_u8();
        if self.fin {
            b0 |= protocol::FIN_MASK;
        }
        buf.put_u8(b0);

        let mask_bit = if self.masked() { protocol::MASK_MASK } else { 0 };
        match self.payload_length {
            len @ 0..=protocol::MAX_DIRECT_LENGTH => buf.put_u8(mask_bit | len as u8),
            len @ 126..=0xFFFF => {
                buf.put_u8(mask_bit | protocol::EXTENDED_LENGTH_16);
                buf.put_u16(len as u16);
            }
            len => {
                buf.put_u8(mask_bit | protocol::EXTENDED_LENGTH_64);
                buf.put_u64(len);
            }
        }

        if let Some(key) = self.mask_key {
            buf.put_slice(&key);
        }
        trace!("encoded frame header {self:?}");
    }

    /// Reads one header, blocking until it is complete. A stream that ends before or
    /// during the header fails with `UnexpectedEof`.
    pub fn decode<S: Read + ?Sized>(stream: &mut S) -> Result<FrameHeader, Error> {
        Self::try_decode(stream)?.ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "stream closed").into())
    }

    /// Like [`FrameHeader::decode`] but returns `None` if the stream ended cleanly on
    /// a frame boundary. Any length form is accepted, even a longer than necessary one.
    pub fn try_decode<S: Read + ?Sized>(stream: &mut S) -> Result<Option<FrameHeader>, Error> {
        let mut buf = [0u8; 8];
        if !read_exact_or_eof(stream, &mut buf[..2])? {
            return Ok(None);
        }
        let (b0, b1) = (buf[0], buf[1]);

        if b0 & (protocol::RSV1_MASK | protocol::RSV2_MASK | protocol::RSV3_MASK) != 0 {
            return Err(Error::Protocol("non zero RSV value received"));
        }
        let fin = b0 & protocol::FIN_MASK != 0;
        let op_code = OpCode::try_from(b0 & protocol::OP_CODE_MASK)?;
        let masked = b1 & protocol::MASK_MASK != 0;

        let payload_length = match b1 & protocol::PAYLOAD_LENGTH_MASK {
            protocol::EXTENDED_LENGTH_16 => {
                stream.read_exact(&mut buf[..2])?;
                u16::from_be_bytes([buf[0], buf[1]]) as u64
            }
            protocol::EXTENDED_LENGTH_64 => {
                stream.read_exact(&mut buf)?;
                let length = u64::from_be_bytes(buf);
                if length & (1 << 63) != 0 {
                    return Err(Error::Protocol("most significant bit of payload length set"));
                }
                length
            }
            length => length as u64,
        };

        let mask_key = if masked {
            let mut key = [0u8; 4];
            stream.read_exact(&mut key)?;
            Some(key)
        } else {
            None
        };

        let header = FrameHeader {
            fin,
            op_code,
            payload_length,
            mask_key,
        };
        trace!("decoded frame header {header:?}");
        Ok(Some(header))
    }
}
