//! wlwire
//!
//! Client-side plumbing for the Wayland display-server wire protocol:
//! a threaded Unix socket transport with file-descriptor passing, and a
//! compiler that turns protocol XML documents into an opcode-assigned
//! schema.

pub mod compiler;
pub mod config;
pub mod error;
pub mod ring;
pub mod schema;
pub mod session;
pub mod source;
pub mod transport;
pub mod xml;

pub use compiler::SchemaCompiler;
pub use config::Config;
pub use error::{SchemaError, TransportError};
pub use ring::RingBuffer;
pub use schema::{Arg, ArgType, Entry, Enum, Interface, Message, Schema};
pub use session::Session;
pub use source::DocumentSource;
pub use transport::{LinkState, RawMessage, SocketTransport, StopReason};
pub use wlwire_proto::{MessageHeader, PROTOCOL_HEADER_SIZE};
