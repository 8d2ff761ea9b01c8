//! Session Context
//!
//! One live connection plus the compiled schema used to interpret it. The
//! caller creates a [`Session`], passes it to whatever needs the connection
//! and shuts it down explicitly; nothing here is process-global.

use std::os::fd::RawFd;
use std::sync::Arc;

use tracing::debug;
use wlwire_proto::MessageHeader;

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::schema::{Message, Schema};
use crate::transport::{LinkState, RawMessage, SocketTransport};

/// Caller-owned connection context
#[derive(Debug)]
pub struct Session {
    transport: SocketTransport,
    schema: Arc<Schema>,
}

impl Session {
    /// Connect to the configured display socket
    pub fn connect(config: &TransportConfig, schema: Arc<Schema>) -> Result<Self, TransportError> {
        let transport =
            SocketTransport::connect_with_capacity(config.socket_path(), config.buffer_size)?;
        Ok(Self::new(transport, schema))
    }

    pub fn new(transport: SocketTransport, schema: Arc<Schema>) -> Self {
        Self { transport, schema }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn transport(&self) -> &SocketTransport {
        &self.transport
    }

    pub fn state(&self) -> LinkState {
        self.transport.state()
    }

    /// Frame and send a request addressed to `object_id`.
    ///
    /// The opcode comes from the schema entry for `interface.request`.
    /// Returns the opcode used.
    pub fn send_request(
        &self,
        object_id: u32,
        interface: &str,
        request: &str,
        payload: &[u8],
        fds: &[RawFd],
    ) -> Result<u16, TransportError> {
        if !self.transport.is_running() {
            return Err(TransportError::Stopped);
        }

        let opcode = self
            .schema
            .interface(interface)
            .and_then(|iface| iface.request(request))
            .map(|message| message.opcode)
            .ok_or_else(|| TransportError::UnknownRequest {
                interface: interface.to_string(),
                request: request.to_string(),
            })?;

        let header = MessageHeader::new(object_id, opcode, payload.len())
            .ok_or(TransportError::Oversized(payload.len()))?;
        debug!("-> {}#{}.{} ({} bytes)", interface, object_id, request, header.size);

        self.transport
            .send_with_fds(&[&header.to_bytes()[..], payload], fds)?;
        Ok(opcode)
    }

    /// Next complete incoming message, see [`SocketTransport::next_message`]
    pub fn next_message(&self) -> Option<RawMessage> {
        self.transport.next_message()
    }

    /// Schema entry for an event received on an object of `interface`
    pub fn event_for(&self, interface: &str, message: &RawMessage) -> Option<&Message> {
        let header = message.header()?;
        self.schema.interface(interface)?.event_by_opcode(header.opcode)
    }

    /// Stop the transport and release the socket
    pub fn shutdown(self) {
        self.transport.shutdown();
    }
}
