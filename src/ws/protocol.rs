use std::fmt::{Display, Formatter};

use crate::ws::Error;

pub const FIN_MASK: u8 = 0b1000_0000;
pub const RSV1_MASK: u8 = 0b0100_0000;
pub const RSV2_MASK: u8 = 0b0010_0000;
pub const RSV3_MASK: u8 = 0b0001_0000;
pub const OP_CODE_MASK: u8 = 0b0000_1111;
pub const MASK_MASK: u8 = 0b1000_0000;
pub const PAYLOAD_LENGTH_MASK: u8 = 0b0111_1111;

/// Length indicator announcing a 16-bit extended payload length.
pub const EXTENDED_LENGTH_16: u8 = 126;
/// Length indicator announcing a 64-bit extended payload length.
pub const EXTENDED_LENGTH_64: u8 = 127;

/// Largest payload that fits the 7-bit length field.
pub const MAX_DIRECT_LENGTH: u64 = 125;
/// Control frames can never carry more than this many bytes.
pub const MAX_CONTROL_PAYLOAD: usize = 125;
/// 2 bytes fixed + 8 bytes extended length + 4 bytes masking key.
pub const MAX_HEADER_LENGTH: usize = 14;

pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
pub const WS_VERSION: &str = "13";

pub mod op {
    pub const CONTINUATION_FRAME: u8 = 0x0;
    pub const TEXT_FRAME: u8 = 0x1;
    pub const BINARY_FRAME: u8 = 0x2;
    pub const CONNECTION_CLOSE: u8 = 0x8;
    pub const PING: u8 = 0x9;
    pub const PONG: u8 = 0xA;
}

/// Frame opcode. Only the six values defined by RFC 6455 are representable,
/// anything else fails to convert with [`Error::InvalidOpCode`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Continuation = op::CONTINUATION_FRAME,
    Text = op::TEXT_FRAME,
    Binary = op::BINARY_FRAME,
    Close = op::CONNECTION_CLOSE,
    Ping = op::PING,
    Pong = op::PONG,
}

impl OpCode {
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Ping, pong and close.
    #[inline]
    pub const fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// Continuation, text and binary.
    #[inline]
    pub const fn is_data(self) -> bool {
        !self.is_control()
    }

    /// Text and binary, the only opcodes that can open a message.
    #[inline]
    pub const fn is_message(self) -> bool {
        matches!(self, OpCode::Text | OpCode::Binary)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = Error;

    #[inline]
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            op::CONTINUATION_FRAME => Ok(OpCode::Continuation),
            op::TEXT_FRAME => Ok(OpCode::Text),
            op::BINARY_FRAME => Ok(OpCode::Binary),
            op::CONNECTION_CLOSE => Ok(OpCode::Close),
            op::PING => Ok(OpCode::Ping),
            op::PONG => Ok(OpCode::Pong),
            other => Err(Error::InvalidOpCode(other)),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op_code: OpCode) -> Self {
        op_code.as_u8()
    }
}

impl Display for OpCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OpCode::Continuation => "continuation",
            OpCode::Text => "text",
            OpCode::Binary => "binary",
            OpCode::Close => "close",
            OpCode::Ping => "ping",
            OpCode::Pong => "pong",
        };
        f.write_str(name)
    }
}
