//! Byte streams the websocket protocol can be applied on top of.
//!
//! Any `Read + Write` type carries frames. Closing the connection additionally
//! requires [`Close`], implemented here for the std sockets and for [`MemoryStream`].

use std::io;
use std::io::ErrorKind::NotConnected;
use std::net::TcpStream;

pub use crate::stream::memory::MemoryStream;

pub mod memory;

/// Explicit close of the underlying transport.
pub trait Close {
    fn close(&mut self) -> io::Result<()>;
}

impl Close for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(std::net::Shutdown::Both) {
            // the peer was faster
            Err(err) if err.kind() == NotConnected => Ok(()),
            other => other,
        }
    }
}

#[cfg(unix)]
impl Close for std::os::unix::net::UnixStream {
    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(std::net::Shutdown::Both) {
            Err(err) if err.kind() == NotConnected => Ok(()),
            other => other,
        }
    }
}

impl<T: Close + ?Sized> Close for &mut T {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

impl<T: Close + ?Sized> Close for Box<T> {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn should_close_tcp_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("unable to bind");
        let mut client = TcpStream::connect(listener.local_addr().expect("no local addr")).expect("unable to connect");
        let (mut server, _) = listener.accept().expect("unable to accept");

        client.close().expect("unable to close");

        let mut buf = [0u8; 1];
        assert_eq!(0, server.read(&mut buf).expect("unable to read"));
        assert!(client.write_all(b"x").is_err());
    }
}
