//! Blocking implementation of the websocket protocol (RFC 6455) on top of any
//! `std::io::Read + Write` stream.
//!
//! The [`ws`] module holds the frame codec, message reassembly, the opening handshake
//! and the [`ws::Websocket`] connection type. [`stream`] defines what the transport has
//! to provide and [`buffer`] the pooled scratch memory both directions work with.

pub mod buffer;
pub mod stream;
mod util;
pub mod ws;

pub use ws::Error;
