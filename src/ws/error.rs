use std::io;
use std::io::ErrorKind::Other;

use thiserror::Error;
use url::ParseError;

use crate::ws::protocol::OpCode;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid op code: {0:#x}")]
    InvalidOpCode(u8),
    #[error("unordered fragment")]
    UnorderedFragment,
    #[error("fragmented {0} control frame")]
    InvalidControlFragment(OpCode),
    #[error("control frame payload of {0} bytes exceeds 125 bytes")]
    ControlPayloadTooLarge(usize),
    #[error("received control frame of {0} bytes, at most 125 are allowed")]
    OversizedControlFrame(u64),
    #[error("websocket protocol error: {0}")]
    Protocol(&'static str),
    #[error("message of {0} bytes exceeds the configured limit")]
    MessageTooLarge(u64),
    #[error("{0} payload of {1} bytes can not be fragmented")]
    NotFragmentable(OpCode, usize),
    #[error("{0} is not a message op code")]
    UnexpectedOpCode(OpCode),
    #[error("handshake rejected: {0}")]
    HandshakeRejected(#[from] Rejection),
    #[error("the peer has sent the close frame: status code {0:?}, body: {1}")]
    ReceivedCloseFrame(Option<u16>, String),
    #[error("the websocket is closed and can be dropped")]
    Closed,
    #[error("IO error: {0}")]
    IO(#[from] io::Error),
    #[error("url parse error: {0}")]
    InvalidUrl(#[from] ParseError),
}

impl Error {
    /// Peer broke the framing rules. The connection can not be used any further.
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::InvalidOpCode(_)
                | Error::UnorderedFragment
                | Error::InvalidControlFragment(_)
                | Error::OversizedControlFrame(_)
                | Error::Protocol(_)
                | Error::MessageTooLarge(_)
        )
    }

    /// Builds `ReceivedCloseFrame` from a close payload: optional 2-byte status code
    /// followed by a reason.
    pub(crate) fn received_close(payload: &[u8]) -> Error {
        match payload {
            [hi, lo, reason @ ..] => {
                let status_code = u16::from_be_bytes([*hi, *lo]);
                Error::ReceivedCloseFrame(Some(status_code), String::from_utf8_lossy(reason).to_string())
            }
            _ => Error::ReceivedCloseFrame(None, String::new()),
        }
    }
}

/// Why an opening handshake was refused.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum Rejection {
    #[error("header '{0}' must be set")]
    MissingHeader(&'static str),
    #[error("header '{header}' must be '{expected}'")]
    InvalidHeader { header: &'static str, expected: &'static str },
    #[error("header 'Sec-WebSocket-Accept' does not match the key")]
    AcceptMismatch,
    #[error("invalid response status code '{0}'")]
    Status(u16),
    #[error("malformed http message: {0}")]
    Malformed(String),
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::IO(err) => err,
            other => io::Error::new(Other, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_close_payload() {
        match Error::received_close(&[0x03, 0xE8, b'b', b'y', b'e']) {
            Error::ReceivedCloseFrame(Some(1000), reason) => assert_eq!("bye", reason),
            other => panic!("unexpected {other:?}"),
        }
        match Error::received_close(&[]) {
            Error::ReceivedCloseFrame(None, reason) => assert!(reason.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn should_unwrap_io_error() {
        let err: io::Error = Error::IO(io::Error::new(io::ErrorKind::TimedOut, "deadline")).into();
        assert_eq!(io::ErrorKind::TimedOut, err.kind());

        let err: io::Error = Error::UnorderedFragment.into();
        assert_eq!(Other, err.kind());
    }

    #[test]
    fn should_classify_protocol_violations() {
        assert!(Error::UnorderedFragment.is_protocol_violation());
        assert!(Error::InvalidOpCode(3).is_protocol_violation());
        assert!(!Error::Closed.is_protocol_violation());
        assert!(Error::OversizedControlFrame(126).is_protocol_violation());
        assert!(!Error::NotFragmentable(OpCode::Ping, 200).is_protocol_violation());
        assert!(!Error::ControlPayloadTooLarge(126).is_protocol_violation());
    }
}
