//! Error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by [`crate::transport::SocketTransport`]
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {path:?}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("socket I/O failed")]
    Io(#[from] std::io::Error),

    #[error("socket call failed")]
    Nix(#[from] nix::Error),

    #[error("message too large to frame ({0} payload bytes)")]
    Oversized(usize),

    #[error("transport is stopped")]
    Stopped,

    #[error("no request {request:?} on interface {interface:?}")]
    UnknownRequest { interface: String, request: String },
}

/// Errors raised while compiling protocol documents.
///
/// Any of these aborts the whole compilation.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Event {name} collides with request of the same name on {interface}")]
    EventRequestCollision { interface: String, name: String },

    #[error("Event with dynamic new_id not supported ({interface}.{event})")]
    DynamicNewIdEvent { interface: String, event: String },

    #[error("{interface} has more {kind}s than fit in a 16-bit opcode")]
    TooManyMembers { interface: String, kind: &'static str },

    #[error("unknown argument type {0:?}")]
    UnknownArgType(String),

    #[error("invalid enum value {value:?} for {entry}")]
    InvalidEnumValue { entry: String, value: String },

    #[error("<{element}> is missing the {attribute:?} attribute")]
    MissingAttribute { element: String, attribute: String },

    #[error("document has no root element")]
    EmptyDocument,

    #[error("malformed protocol document")]
    Xml(#[from] quick_xml::Error),

    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("remote fetch failed")]
    Http(#[from] reqwest::Error),

    #[error("schema serialization failed")]
    Json(#[from] serde_json::Error),
}
