use std::io;
use std::io::ErrorKind::{Interrupted, UnexpectedEof};
use std::io::Read;

/// Fills `buf` completely. Returns `Ok(false)` if the stream reached EOF before
/// yielding a single byte, and `UnexpectedEof` if it ended part way through.
pub fn read_exact_or_eof<S: Read + ?Sized>(stream: &mut S, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(io::Error::new(UnexpectedEof, "stream closed mid read")),
            Ok(n) => filled += n,
            Err(err) if err.kind() == Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(true)
}
