use std::io::Read;
use std::str::Utf8Error;
use std::{io, mem};

use log::warn;

use crate::buffer::{BufferPool, PooledBuffer, ScratchBuffer};
use crate::ws::config::Config;
use crate::ws::header::FrameHeader;
use crate::ws::mask::Mask;
use crate::ws::protocol::{OpCode, MAX_CONTROL_PAYLOAD};
use crate::ws::Error;

/// Complete text or binary message. The payload is borrowed from the decoder and is
/// valid until the next frame is decoded.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Message<'a> {
    pub op_code: OpCode,
    pub payload: &'a [u8],
}

impl<'a> Message<'a> {
    #[inline]
    pub fn is_text(&self) -> bool {
        self.op_code == OpCode::Text
    }

    #[inline]
    pub fn is_binary(&self) -> bool {
        self.op_code == OpCode::Binary
    }

    pub fn as_text(&self) -> Result<&'a str, Utf8Error> {
        std::str::from_utf8(self.payload)
    }
}

/// Unit surfaced by [`Decoder::decode_next`]; its payload is available through
/// [`Decoder::payload`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Event {
    /// Ping, pong or close frame, delivered as soon as it has been read, even in the
    /// middle of a fragmented message.
    Control(OpCode),
    /// Fully reassembled text or binary message.
    Message(OpCode),
}

impl Event {
    #[inline]
    pub const fn op_code(&self) -> OpCode {
        match self {
            Event::Control(op_code) | Event::Message(op_code) => *op_code,
        }
    }
}

#[derive(Debug)]
enum Assembly {
    Idle,
    Assembling { op_code: OpCode, buffer: PooledBuffer },
}

/// Receive half of the protocol: reads frames, enforces fragment ordering and
/// reassembles messages.
///
/// | state      | frame                  | outcome                                  |
/// |------------|------------------------|------------------------------------------|
/// | idle       | fin data               | message delivered                        |
/// | idle       | non-fin data           | start assembling                         |
/// | idle       | continuation           | `UnorderedFragment`                      |
/// | assembling | continuation           | append, deliver and go idle on fin       |
/// | assembling | data                   | `UnorderedFragment`, message kept intact |
/// | any        | fin control            | delivered, state untouched               |
/// | any        | non-fin control        | `InvalidControlFragment`                 |
#[derive(Debug)]
pub struct Decoder {
    expect_masked: bool,
    max_message_size: usize,
    pool: BufferPool,
    assembly: Assembly,
    delivered: Option<PooledBuffer>,
}

impl Decoder {
    pub fn new(config: &Config, pool: BufferPool) -> Decoder {
        Self {
            expect_masked: config.role.expects_masked_incoming(),
            max_message_size: config.max_message_size,
            pool,
            assembly: Assembly::Idle,
            delivered: None,
        }
    }

    /// Opcode of the fragmented message currently being reassembled.
    pub fn assembling(&self) -> Option<OpCode> {
        match &self.assembly {
            Assembly::Idle => None,
            Assembly::Assembling { op_code, .. } => Some(*op_code),
        }
    }

    /// Payload of the last delivered [`Event`].
    #[inline]
    pub fn payload(&self) -> &[u8] {
        self.delivered.as_ref().map(|buffer| buffer.view()).unwrap_or_default()
    }

    /// Reads frames until a control frame or a complete message is available. Returns
    /// `None` if the stream ended cleanly between messages.
    pub fn decode_next<S: Read + ?Sized>(&mut self, stream: &mut S) -> Result<Option<Event>, Error> {
        // hand the previous payload back to the pool
        self.delivered = None;

        loop {
            let header = match FrameHeader::try_decode(stream)? {
                Some(header) => header,
                None if self.assembling().is_none() => return Ok(None),
                None => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream closed mid message").into()),
            };

            if header.masked() != self.expect_masked {
                warn!("received frame with unexpected masking: {header:?}");
                return Err(Error::Protocol(if self.expect_masked {
                    "unmasked frame received from client"
                } else {
                    "masked frame received from server"
                }));
            }

            match header.op_code {
                op_code if op_code.is_control() => {
                    if !header.fin {
                        warn!("received fragmented {op_code} frame");
                        return Err(Error::InvalidControlFragment(op_code));
                    }
                    if header.payload_length > MAX_CONTROL_PAYLOAD as u64 {
                        warn!("received {op_code} frame of {} bytes", header.payload_length);
                        return Err(Error::OversizedControlFrame(header.payload_length));
                    }
                    let mut buffer = self.pool.acquire();
                    read_payload(stream, &header, &mut buffer)?;
                    self.delivered = Some(buffer);
                    return Ok(Some(Event::Control(op_code)));
                }
                OpCode::Continuation => {
                    let Assembly::Assembling { op_code, buffer } = &mut self.assembly else {
                        warn!("received continuation frame with no message in progress");
                        discard_payload(stream, &header, self.max_message_size)?;
                        return Err(Error::UnorderedFragment);
                    };
                    let op_code = *op_code;
                    ensure_within(buffer.len() as u64 + header.payload_length, self.max_message_size)?;
                    read_payload(stream, &header, buffer)?;

                    if header.fin {
                        if let Assembly::Assembling { buffer, .. } = mem::replace(&mut self.assembly, Assembly::Idle) {
                            self.delivered = Some(buffer);
                        }
                        return Ok(Some(Event::Message(op_code)));
                    }
                }
                op_code => {
                    if let Some(assembling) = self.assembling() {
                        warn!("received {op_code} frame while {assembling} message is in progress");
                        discard_payload(stream, &header, self.max_message_size)?;
                        return Err(Error::UnorderedFragment);
                    }
                    ensure_within(header.payload_length, self.max_message_size)?;
                    let mut buffer = self.pool.acquire();
                    read_payload(stream, &header, &mut buffer)?;

                    if header.fin {
                        self.delivered = Some(buffer);
                        return Ok(Some(Event::Message(op_code)));
                    }
                    self.assembly = Assembly::Assembling { op_code, buffer };
                }
            }
        }
    }

    /// Reads the next complete message, passing every control frame met on the way to
    /// `on_control` in wire order.
    pub fn read_message<S, F>(&mut self, stream: &mut S, mut on_control: F) -> Result<Message<'_>, Error>
    where
        S: Read + ?Sized,
        F: FnMut(OpCode, &[u8]) -> Result<(), Error>,
    {
        loop {
            match self.decode_next(stream)? {
                Some(Event::Control(op_code)) => on_control(op_code, self.payload())?,
                Some(Event::Message(op_code)) => {
                    return Ok(Message {
                        op_code,
                        payload: self.payload(),
                    });
                }
                None => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream closed").into()),
            }
        }
    }

    /// Hands every control frame and every complete message to `handler` until the
    /// stream ends (`Ok`) or anything fails, the handler included.
    pub fn read_loop<S, F>(&mut self, stream: &mut S, mut handler: F) -> Result<(), Error>
    where
        S: Read + ?Sized,
        F: FnMut(OpCode, &[u8]) -> Result<(), Error>,
    {
        while let Some(event) = self.decode_next(stream)? {
            handler(event.op_code(), self.payload())?;
        }
        Ok(())
    }
}

#[inline]
fn ensure_within(length: u64, max_message_size: usize) -> Result<(), Error> {
    if length > max_message_size as u64 {
        warn!("message of {length} bytes exceeds limit of {max_message_size} bytes");
        return Err(Error::MessageTooLarge(length));
    }
    Ok(())
}

/// Appends the frame payload to `buffer`, unmasking it with a cursor starting at zero.
fn read_payload<S: Read + ?Sized>(stream: &mut S, header: &FrameHeader, buffer: &mut ScratchBuffer) -> Result<(), Error> {
    let length = usize::try_from(header.payload_length).map_err(|_| Error::MessageTooLarge(header.payload_length))?;
    let range = buffer.read_from(stream, length)?;
    if let Some(key) = header.mask_key {
        Mask::new(key).apply(&mut buffer.view_mut()[range]);
    }
    Ok(())
}

/// Skips the payload of a rejected frame so the stream stays aligned on the next header.
fn discard_payload<S: Read + ?Sized>(stream: &mut S, header: &FrameHeader, max_message_size: usize) -> Result<(), Error> {
    ensure_within(header.payload_length, max_message_size)?;
    let skipped = io::copy(&mut (&mut *stream).take(header.payload_length), &mut io::sink())?;
    if skipped < header.payload_length {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream closed mid frame").into());
    }
    Ok(())
}
