//! Websocket protocol implementation over blocking streams.
//!
//! ## Examples
//!
//! Dial a server over plain TCP and exchange a message.
//! ```no_run
//! use std::net::TcpStream;
//! use wirews::ws::{Config, Websocket};
//!
//! let stream = TcpStream::connect("127.0.0.1:9001").unwrap();
//! let mut ws = Websocket::connect(stream, "ws://127.0.0.1:9001/echo", Config::client()).unwrap();
//! ws.send_text("hello").unwrap();
//! let message = ws.read_message().unwrap();
//! println!("{}", String::from_utf8_lossy(message.payload));
//! ```
//!
//! Serve an upgraded connection, echoing every message until the peer closes.
//! ```no_run
//! use std::net::TcpListener;
//! use wirews::ws::{Config, Websocket};
//!
//! let listener = TcpListener::bind("127.0.0.1:9001").unwrap();
//! let (stream, _) = listener.accept().unwrap();
//! let mut ws = Websocket::accept(stream, Config::server()).unwrap();
//! loop {
//!     let message = match ws.read_message() {
//!         Ok(message) => (message.op_code, message.payload.to_vec()),
//!         Err(_) => break,
//!     };
//!     ws.send(message.0, &message.1).unwrap();
//! }
//! ```
//!
//! Wrap a stream that has already been upgraded by another HTTP stack.
//! ```no_run
//! use std::net::TcpStream;
//! use wirews::ws::{IntoWebsocket, Role};
//!
//! let stream = TcpStream::connect("127.0.0.1:9001").unwrap();
//! let mut ws = stream.into_websocket_with_config(Role::Client, |cfg| cfg.with_fragment_size(4096));
//! ws.send_binary(&[1, 2, 3]).unwrap();
//! ```

use std::io;
use std::io::{Read, Write};

use log::debug;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::buffer::BufferPool;
use crate::stream::Close;
use crate::ws::Error::Closed;

// re-export
pub use crate::ws::config::{Config, Role};
pub use crate::ws::decoder::{Decoder, Event, Message};
pub use crate::ws::encoder::Encoder;
pub use crate::ws::error::{Error, Rejection};
pub use crate::ws::header::FrameHeader;
pub use crate::ws::mask::Mask;
pub use crate::ws::protocol::OpCode;

pub mod config;
pub mod decoder;
pub mod encoder;
mod error;
pub mod handshake;
pub mod header;
pub mod mask;
pub mod protocol;

/// Websocket connection that owns the underlying stream.
///
/// Any failure while reading, or an I/O failure while sending, marks the websocket as
/// closed and every later call fails with [`Error::Closed`]. Sending an invalid frame
/// (for example an oversized control payload) is reported without touching the
/// connection.
#[derive(Debug)]
pub struct Websocket<S, R = StdRng> {
    stream: S,
    encoder: Encoder<R>,
    decoder: Decoder,
    message_op_code: OpCode,
    closed: bool,
    read_offset: Option<usize>,
    endpoint: Option<String>,
}

impl<S> Websocket<S> {
    /// Wraps an already upgraded stream, masking keys come from an OS seeded generator.
    pub fn new(stream: S, config: Config) -> Self {
        Self::with_rng(stream, config, StdRng::from_os_rng())
    }
}

impl<S: Read + Write> Websocket<S> {
    /// Performs the server side of the opening handshake and wraps the stream.
    pub fn accept(mut stream: S, config: Config) -> Result<Self, Error> {
        let endpoint = handshake::accept(&mut stream)?;
        let mut ws = Self::new(stream, Config { role: Role::Server, ..config });
        ws.endpoint = Some(endpoint);
        Ok(ws)
    }

    /// Performs the client side of the opening handshake against `url` and wraps the
    /// stream.
    pub fn connect(stream: S, url: &str, config: Config) -> Result<Self, Error> {
        Self::connect_with_rng(stream, url, config, StdRng::from_os_rng())
    }
}

impl<S, R: RngCore> Websocket<S, R> {
    pub fn with_rng(stream: S, config: Config, rng: R) -> Self {
        let pool = BufferPool::new(config.pool_capacity, config.max_retained_capacity);
        Self {
            stream,
            encoder: Encoder::new(&config, rng, pool.clone()),
            decoder: Decoder::new(&config, pool),
            message_op_code: config.message_op_code,
            closed: false,
            read_offset: None,
            endpoint: None,
        }
    }

    /// Checks if the websocket is closed. This can be result of an IO error, a protocol
    /// violation or the close handshake.
    pub const fn closed(&self) -> bool {
        self.closed
    }

    /// Request target (path and query) of the handshake this websocket accepted.
    /// `None` unless it was created by [`Websocket::accept`].
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub const fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// `0` disables fragmentation of outgoing messages.
    pub fn set_fragment_size(&mut self, fragment_size: usize) {
        self.encoder.set_fragment_size(fragment_size);
    }

    /// Splits the websocket so each direction can be driven on its own, typically with
    /// the encoder and the decoder on separate threads over cloned stream handles.
    pub fn into_parts(self) -> (S, Encoder<R>, Decoder) {
        (self.stream, self.encoder, self.decoder)
    }

    #[inline]
    const fn ensure_not_closed(&self) -> Result<(), Error> {
        if self.closed {
            return Err(Closed);
        }
        Ok(())
    }
}

impl<S: Read + Write, R: RngCore> Websocket<S, R> {
    /// Same as [`Websocket::connect`] with an explicit source for the handshake key and
    /// the masking keys.
    pub fn connect_with_rng(mut stream: S, url: &str, config: Config, mut rng: R) -> Result<Self, Error> {
        handshake::connect(&mut stream, url, &mut rng)?;
        Ok(Self::with_rng(stream, Config { role: Role::Client, ..config }, rng))
    }
}

impl<S: Write, R: RngCore> Websocket<S, R> {
    /// Sends a text or binary message, fragmented according to the configured fragment
    /// size, or a single control frame. Returns the number of payload bytes written.
    #[inline]
    pub fn send(&mut self, op_code: OpCode, payload: &[u8]) -> Result<usize, Error> {
        self.ensure_not_closed()?;
        let result = if op_code.is_control() {
            self.encoder.send_control(&mut self.stream, op_code, payload)
        } else {
            self.encoder.send(&mut self.stream, op_code, payload)
        };
        if let Err(Error::IO(_)) = result {
            self.closed = true;
        }
        result
    }

    #[inline]
    pub fn send_text(&mut self, text: &str) -> Result<usize, Error> {
        self.send(OpCode::Text, text.as_bytes())
    }

    #[inline]
    pub fn send_binary(&mut self, payload: &[u8]) -> Result<usize, Error> {
        self.send(OpCode::Binary, payload)
    }

    #[inline]
    pub fn send_ping(&mut self, payload: &[u8]) -> Result<usize, Error> {
        self.send(OpCode::Ping, payload)
    }

    #[inline]
    pub fn send_pong(&mut self, payload: &[u8]) -> Result<usize, Error> {
        self.send(OpCode::Pong, payload)
    }
}

impl<S: Write + Close, R: RngCore> Websocket<S, R> {
    /// Initiates the close handshake: sends a close frame carrying `payload` (usually a
    /// 2-byte status code and a reason) and closes the stream.
    pub fn close(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.ensure_not_closed()?;
        let mut sender = Sender {
            stream: &mut self.stream,
            encoder: &mut self.encoder,
            closed: &mut self.closed,
        };
        sender.close(payload)
    }
}

impl<S: Read + Write + Close, R: RngCore> Websocket<S, R> {
    /// Reads the next text or binary message. Control frames met on the way are
    /// answered by [`respond_to_control`]; a close frame from the peer ends with
    /// [`Error::ReceivedCloseFrame`] once it has been acknowledged.
    #[inline]
    pub fn read_message(&mut self) -> Result<Message<'_>, Error> {
        self.read_message_with(respond_to_control)
    }

    /// Reads the next text or binary message, handing every control frame met on the way
    /// to `handler` in wire order. The payload of the returned message is valid until the
    /// next read.
    pub fn read_message_with<F>(&mut self, handler: F) -> Result<Message<'_>, Error>
    where
        F: FnMut(OpCode, &[u8], &mut Sender<'_, S, R>) -> Result<(), Error>,
    {
        self.ensure_not_closed()?;
        self.read_offset = None;
        match self.next_message(handler) {
            Ok(Some(op_code)) => Ok(Message {
                op_code,
                payload: self.decoder.payload(),
            }),
            Ok(None) => {
                self.closed = true;
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream closed").into())
            }
            Err(err) => {
                self.closed = true;
                Err(err)
            }
        }
    }

    /// Passes every control frame and every complete message to `handler` in wire order.
    /// Control frames are answered by [`respond_to_control`] after the handler has seen
    /// them. Returns `Ok` once the stream ends or the peer's close frame has been
    /// acknowledged, and stops on the first error otherwise.
    pub fn read_loop<F>(&mut self, handler: F) -> Result<(), Error>
    where
        F: FnMut(OpCode, &[u8]) -> Result<(), Error>,
    {
        self.ensure_not_closed()?;
        self.read_offset = None;
        let result = self.dispatch(handler);
        self.closed = true;
        match result {
            Err(Error::ReceivedCloseFrame(..)) => Ok(()),
            other => other,
        }
    }

    /// Returns the opcode of the next complete message, `None` on a clean end of stream.
    fn next_message<F>(&mut self, mut handler: F) -> Result<Option<OpCode>, Error>
    where
        F: FnMut(OpCode, &[u8], &mut Sender<'_, S, R>) -> Result<(), Error>,
    {
        loop {
            match self.decoder.decode_next(&mut self.stream)? {
                Some(Event::Control(op_code)) => {
                    let mut sender = Sender {
                        stream: &mut self.stream,
                        encoder: &mut self.encoder,
                        closed: &mut self.closed,
                    };
                    handler(op_code, self.decoder.payload(), &mut sender)?;
                    self.ensure_not_closed()?;
                }
                Some(Event::Message(op_code)) => return Ok(Some(op_code)),
                None => return Ok(None),
            }
        }
    }

    fn dispatch<F>(&mut self, mut handler: F) -> Result<(), Error>
    where
        F: FnMut(OpCode, &[u8]) -> Result<(), Error>,
    {
        while let Some(event) = self.decoder.decode_next(&mut self.stream)? {
            handler(event.op_code(), self.decoder.payload())?;
            if let Event::Control(op_code) = event {
                let mut sender = Sender {
                    stream: &mut self.stream,
                    encoder: &mut self.encoder,
                    closed: &mut self.closed,
                };
                respond_to_control(op_code, self.decoder.payload(), &mut sender)?;
            }
        }
        Ok(())
    }
}

/// Sends each `write` call as one message using the configured message opcode.
impl<S: Write, R: RngCore> Write for Websocket<S, R> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.message_op_code.is_message() {
            return Err(Error::UnexpectedOpCode(self.message_op_code).into());
        }
        Ok(self.send(self.message_op_code, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ensure_not_closed()?;
        self.stream.flush()
    }
}

/// Streams the payload bytes of successive messages, skipping empty ones. The end of
/// the stream and an acknowledged close frame both read as EOF.
impl<S: Read + Write + Close, R: RngCore> Read for Websocket<S, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if let Some(offset) = self.read_offset {
                let payload = self.decoder.payload();
                let n = buf.len().min(payload.len() - offset);
                buf[..n].copy_from_slice(&payload[offset..offset + n]);
                self.read_offset = (offset + n < payload.len()).then_some(offset + n);
                return Ok(n);
            }
            if buf.is_empty() || self.closed {
                return Ok(0);
            }
            match self.next_message(respond_to_control) {
                Ok(Some(_)) if self.decoder.payload().is_empty() => continue,
                Ok(Some(_)) => self.read_offset = Some(0),
                Ok(None) | Err(Error::ReceivedCloseFrame(..)) => {
                    self.closed = true;
                    return Ok(0);
                }
                Err(err) => {
                    self.closed = true;
                    return Err(err.into());
                }
            }
        }
    }
}

/// Send side handed to control frame handlers while a read is in progress.
pub struct Sender<'a, S, R> {
    stream: &'a mut S,
    encoder: &'a mut Encoder<R>,
    closed: &'a mut bool,
}

impl<S: Write, R: RngCore> Sender<'_, S, R> {
    pub fn send(&mut self, op_code: OpCode, payload: &[u8]) -> Result<usize, Error> {
        self.encoder.send(&mut *self.stream, op_code, payload)
    }

    pub fn send_pong(&mut self, payload: &[u8]) -> Result<usize, Error> {
        self.encoder.send_control(&mut *self.stream, OpCode::Pong, payload)
    }
}

impl<S: Write + Close, R: RngCore> Sender<'_, S, R> {
    /// Sends a close frame with `payload` and closes the stream, which marks the
    /// websocket closed. The stream is closed even if the frame could not be sent.
    pub fn close(&mut self, payload: &[u8]) -> Result<(), Error> {
        // nothing must reach the stream if the frame itself is invalid
        if payload.len() > protocol::MAX_CONTROL_PAYLOAD {
            return Err(Error::ControlPayloadTooLarge(payload.len()));
        }
        let sent = self.encoder.send_control(&mut *self.stream, OpCode::Close, payload);
        *self.closed = true;
        let closed = self.stream.close();
        debug!("websocket closed with {} bytes of close payload", payload.len());
        sent?;
        closed?;
        Ok(())
    }
}

/// Default control frame handling: pings are answered with a pong carrying the same
/// payload, pongs are ignored and a close frame is echoed before the stream is closed,
/// ending the read with [`Error::ReceivedCloseFrame`].
pub fn respond_to_control<S, R>(op_code: OpCode, payload: &[u8], sender: &mut Sender<'_, S, R>) -> Result<(), Error>
where
    S: Write + Close,
    R: RngCore,
{
    match op_code {
        OpCode::Ping => {
            sender.send_pong(payload)?;
        }
        OpCode::Close => {
            debug!("received close frame, acknowledging");
            if let Err(err) = sender.close(payload) {
                debug!("unable to acknowledge close frame: {err}");
            }
            return Err(Error::received_close(payload));
        }
        _ => {}
    }
    Ok(())
}

pub trait IntoWebsocket {
    fn into_websocket(self, config: Config) -> Websocket<Self>
    where
        Self: Sized;

    fn into_websocket_with_config<F>(self, role: Role, configure: F) -> Websocket<Self>
    where
        Self: Sized,
        F: FnOnce(Config) -> Config,
    {
        self.into_websocket(configure(Config::new(role)))
    }
}

impl<T> IntoWebsocket for T
where
    T: Read + Write,
{
    fn into_websocket(self, config: Config) -> Websocket<Self>
    where
        Self: Sized,
    {
        Websocket::new(self, config)
    }
}
