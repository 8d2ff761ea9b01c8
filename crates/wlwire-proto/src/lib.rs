//! wlwire Wire Definitions
//!
//! Shared framing types for the display-server wire protocol: the fixed
//! message header, its size, and compositor socket resolution.
//!
//! # Framing
//!
//! Every message starts with a [`MessageHeader`]:
//! - object id (4 bytes)
//! - opcode (2 bytes)
//! - total message size, header included (2 bytes)
//!
//! All fields are in native byte order. The payload follows immediately and
//! is exactly `size - PROTOCOL_HEADER_SIZE` bytes long.

use bytemuck::{Pod, Zeroable};
use std::path::{Path, PathBuf};

/// Size of [`MessageHeader`] on the wire, in bytes
pub const PROTOCOL_HEADER_SIZE: usize = std::mem::size_of::<MessageHeader>();

/// Size of a file descriptor appended to a message in its legacy byte form
pub const ENCODED_FD_SIZE: usize = std::mem::size_of::<u32>();

/// Display name used when neither the caller nor the environment names one
pub const DEFAULT_DISPLAY: &str = "wayland-0";

/// Header for every wire message.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MessageHeader {
    /// Object the message is addressed to (or sent from)
    pub object_id: u32,
    /// Request or event index within the object's interface
    pub opcode: u16,
    /// Total message length including this header
    pub size: u16,
}

impl MessageHeader {
    /// Build a header for a payload of `payload_len` bytes.
    ///
    /// Returns `None` when the framed message would not fit the 16-bit size field.
    pub fn new(object_id: u32, opcode: u16, payload_len: usize) -> Option<Self> {
        let size = u16::try_from(PROTOCOL_HEADER_SIZE + payload_len).ok()?;
        Some(Self {
            object_id,
            opcode,
            size,
        })
    }

    /// Read a header from the front of `buf`, if enough bytes are present
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let head = buf.get(..PROTOCOL_HEADER_SIZE)?;
        Some(bytemuck::pod_read_unaligned(head))
    }

    /// Encode in native byte order
    pub fn to_bytes(&self) -> [u8; PROTOCOL_HEADER_SIZE] {
        let mut out = [0u8; PROTOCOL_HEADER_SIZE];
        out.copy_from_slice(bytemuck::bytes_of(self));
        out
    }

    /// Payload length declared by this header
    pub fn payload_len(&self) -> usize {
        usize::from(self.size).saturating_sub(PROTOCOL_HEADER_SIZE)
    }
}

/// Encode a descriptor number the way it is appended to a raw message
pub fn encode_fd(fd: i32) -> [u8; ENCODED_FD_SIZE] {
    (fd as u32).to_ne_bytes()
}

/// Socket path for the compositor connection.
///
/// An absolute `display` is used verbatim. Otherwise the display name
/// (falling back to `WAYLAND_DISPLAY`, then [`DEFAULT_DISPLAY`]) is resolved
/// inside `XDG_RUNTIME_DIR`.
pub fn socket_path(display: Option<&str>) -> PathBuf {
    let display = display
        .map(str::to_owned)
        .or_else(|| std::env::var("WAYLAND_DISPLAY").ok())
        .unwrap_or_else(|| DEFAULT_DISPLAY.to_string());

    if Path::new(&display).is_absolute() {
        return PathBuf::from(display);
    }

    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));
    PathBuf::from(runtime_dir).join(display)
}
