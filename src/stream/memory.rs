use std::collections::VecDeque;
use std::io;
use std::io::ErrorKind::BrokenPipe;
use std::io::{Read, Write};

use crate::stream::Close;

/// In-memory duplex stream. Reads drain the inbound queue (an empty queue reads as
/// EOF) and writes land in the outbound sink, or back in the inbound queue when the
/// stream was created with [`MemoryStream::loopback`].
///
/// ```
/// use std::io::{Read, Write};
/// use wirews::stream::MemoryStream;
///
/// let mut stream = MemoryStream::loopback();
/// stream.write_all(b"ping").unwrap();
/// let mut buf = [0u8; 4];
/// stream.read_exact(&mut buf).unwrap();
/// assert_eq!(b"ping", &buf);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStream {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    loopback: bool,
    closed: bool,
}

impl MemoryStream {
    /// Stream that will yield `inbound` to readers.
    pub fn new(inbound: impl AsRef<[u8]>) -> MemoryStream {
        Self {
            inbound: inbound.as_ref().iter().copied().collect(),
            ..Default::default()
        }
    }

    /// Stream whose writes can be read back.
    pub fn loopback() -> MemoryStream {
        Self {
            loopback: true,
            ..Default::default()
        }
    }

    pub fn push_inbound(&mut self, bytes: impl AsRef<[u8]>) {
        self.inbound.extend(bytes.as_ref());
    }

    /// Number of bytes not read yet.
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    pub fn outbound(&self) -> &[u8] {
        &self.outbound
    }

    pub fn take_outbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inbound.read(buf)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(BrokenPipe, "stream is closed"));
        }
        if self.loopback {
            self.inbound.extend(buf);
        } else {
            self.outbound.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Close for MemoryStream {
    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_read_inbound_then_eof() {
        let mut stream = MemoryStream::new(b"hello");
        let mut buf = [0u8; 8];
        assert_eq!(5, stream.read(&mut buf).expect("unable to read"));
        assert_eq!(b"hello", &buf[..5]);
        assert_eq!(0, stream.read(&mut buf).expect("unable to read"));
    }

    #[test]
    fn should_collect_outbound() {
        let mut stream = MemoryStream::default();
        stream.write_all(b"abc").expect("unable to write");
        assert_eq!(b"abc", stream.outbound());
        assert_eq!(b"abc".to_vec(), stream.take_outbound());
        assert!(stream.outbound().is_empty());
        assert_eq!(0, stream.pending());
    }

    #[test]
    fn should_refuse_writes_once_closed() {
        let mut stream = MemoryStream::loopback();
        stream.close().expect("unable to close");
        assert!(stream.is_closed());
        let err = stream.write_all(b"late").expect_err("expected broken pipe");
        assert_eq!(BrokenPipe, err.kind());
    }
}
