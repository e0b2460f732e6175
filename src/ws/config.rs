use crate::buffer::{DEFAULT_MAX_RETAINED_CAPACITY, DEFAULT_POOL_CAPACITY};
use crate::ws::protocol::OpCode;

pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Which end of the connection we are. Clients mask every frame they send and expect
/// unmasked frames back, servers do the opposite.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    #[inline]
    pub const fn masks_outgoing(self) -> bool {
        matches!(self, Role::Client)
    }

    #[inline]
    pub const fn expects_masked_incoming(self) -> bool {
        matches!(self, Role::Server)
    }
}

/// Websocket connection settings.
///
/// ```
/// use wirews::ws::{Config, Role};
///
/// let config = Config::new(Role::Client)
///     .with_fragment_size(16 * 1024)
///     .with_max_message_size(1024 * 1024);
/// assert_eq!(16 * 1024, config.fragment_size);
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Config {
    pub role: Role,
    /// Outgoing messages larger than this are split into fragments, `0` disables splitting.
    pub fragment_size: usize,
    /// Upper bound on an incoming message after reassembly.
    pub max_message_size: usize,
    /// Opcode used for messages sent through `std::io::Write`.
    pub message_op_code: OpCode,
    /// Idle buffers kept by the connection's pool.
    pub pool_capacity: usize,
    /// Buffers that grew beyond this are freed instead of pooled.
    pub max_retained_capacity: usize,
}

impl Config {
    pub const fn new(role: Role) -> Self {
        Self {
            role,
            fragment_size: 0,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            message_op_code: OpCode::Binary,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            max_retained_capacity: DEFAULT_MAX_RETAINED_CAPACITY,
        }
    }

    pub const fn client() -> Self {
        Self::new(Role::Client)
    }

    pub const fn server() -> Self {
        Self::new(Role::Server)
    }

    pub const fn with_fragment_size(mut self, fragment_size: usize) -> Self {
        self.fragment_size = fragment_size;
        self
    }

    pub const fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Only text and binary are meaningful here, anything else is rejected when sending.
    pub const fn with_message_op_code(mut self, op_code: OpCode) -> Self {
        self.message_op_code = op_code;
        self
    }

    pub const fn with_text_messages(self) -> Self {
        self.with_message_op_code(OpCode::Text)
    }

    pub const fn with_pool(mut self, pool_capacity: usize, max_retained_capacity: usize) -> Self {
        self.pool_capacity = pool_capacity;
        self.max_retained_capacity = max_retained_capacity;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::client()
    }
}
