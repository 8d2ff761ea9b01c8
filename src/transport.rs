//! Socket Transport
//!
//! Owns one connected Unix stream socket. A dedicated background thread
//! performs blocking receives (with SCM_RIGHTS ancillary data) and appends
//! everything into a [`RingBuffer`]; callers pull complete framed messages
//! out with [`SocketTransport::next_message`] and write with the blocking
//! send methods.
//!
//! Locking: the ring buffer and the socket's write side are guarded by two
//! independent mutexes, so draining and writing never contend with each
//! other.

use std::io::{IoSlice, IoSliceMut, Write};
use std::net::Shutdown;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use nix::errno::Errno;
use nix::sys::socket::{
    recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags, UnixAddr,
};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use wlwire_proto::{encode_fd, MessageHeader, PROTOCOL_HEADER_SIZE};

use crate::error::TransportError;
use crate::ring::RingBuffer;

/// Default ring buffer capacity in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 18;

/// Bytes requested per receive call
const RECV_CHUNK: usize = 4096;

// ============================================================================
// Link state
// ============================================================================

/// Why the receive loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called
    Requested,
    /// The peer closed its end of the connection
    PeerClosed,
    /// A non-transient socket error
    Failed(String),
    /// A header declared a size smaller than the header itself
    Malformed(u16),
}

/// Externally visible transport state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Running,
    Stopped(StopReason),
}

// ============================================================================
// Messages
// ============================================================================

/// One complete wire message pulled from the receive buffer
#[derive(Debug)]
pub struct RawMessage {
    /// Header and payload, exactly `header.size` bytes
    pub data: Vec<u8>,
    /// Descriptor dequeued alongside this message, if any
    pub fd: Option<OwnedFd>,
}

impl RawMessage {
    pub fn header(&self) -> Option<MessageHeader> {
        MessageHeader::parse(&self.data)
    }

    pub fn payload(&self) -> &[u8] {
        self.data.get(PROTOCOL_HEADER_SIZE..).unwrap_or_default()
    }

    /// Message bytes with the descriptor number appended in native byte
    /// order.
    ///
    /// Ownership of the descriptor passes to the caller, who must close it.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut data = self.data;
        if let Some(fd) = self.fd {
            data.extend_from_slice(&encode_fd(fd.into_raw_fd()));
        }
        data
    }
}

/// Result of one extraction attempt against a ring buffer
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Extracted<A> {
    /// Not enough bytes buffered for the next message yet
    Pending,
    Message(Vec<u8>, Option<A>),
    /// Declared size is smaller than the header; framing cannot continue
    Malformed(u16),
}

/// Pull the next complete message off the front of `ring`.
///
/// The oldest queued ancillary item is attached to the message; nothing is
/// dequeued while the message is still incomplete.
pub(crate) fn extract_message<A>(ring: &mut RingBuffer<A>) -> Extracted<A> {
    let Some(header) = MessageHeader::parse(&ring.peek(PROTOCOL_HEADER_SIZE)) else {
        return Extracted::Pending;
    };

    let size = usize::from(header.size);
    if size < PROTOCOL_HEADER_SIZE {
        return Extracted::Malformed(header.size);
    }
    if ring.len() < size {
        return Extracted::Pending;
    }

    let data = ring.take(size);
    Extracted::Message(data, ring.pop_ancillary())
}

// ============================================================================
// Transport
// ============================================================================

/// State shared with the receive thread
#[derive(Debug)]
struct Shared {
    buffer: Mutex<RingBuffer>,
    running: AtomicBool,
    state: Mutex<LinkState>,
    readable: Notify,
}

impl Shared {
    fn buffer(&self) -> MutexGuard<'_, RingBuffer> {
        lock(&self.buffer)
    }

    fn stop(&self, reason: StopReason) {
        self.running.store(false, Ordering::Release);
        let mut state = lock(&self.state);
        if *state == LinkState::Running {
            *state = LinkState::Stopped(reason);
        }
        drop(state);
        self.readable.notify_one();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client side of a display-server connection
#[derive(Debug)]
pub struct SocketTransport {
    peer: Option<PathBuf>,
    socket: Arc<UnixStream>,
    shared: Arc<Shared>,
    write_lock: Mutex<()>,
    receiver: Option<JoinHandle<()>>,
}

impl SocketTransport {
    /// Connect to the socket at `path` with the default buffer size
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        Self::connect_with_capacity(path, DEFAULT_BUFFER_SIZE)
    }

    /// Connect to the socket at `path`.
    ///
    /// Connection failure is returned as-is; there is no retry.
    pub fn connect_with_capacity(
        path: impl AsRef<Path>,
        capacity: usize,
    ) -> Result<Self, TransportError> {
        let path = path.as_ref();
        info!("Connecting to {:?}", path);

        let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;

        let mut transport = Self::from_stream(stream, capacity)?;
        transport.peer = Some(path.to_path_buf());
        Ok(transport)
    }

    /// Wrap an already connected stream and start the receive thread
    pub fn from_stream(stream: UnixStream, capacity: usize) -> Result<Self, TransportError> {
        let socket = Arc::new(stream);
        let shared = Arc::new(Shared {
            buffer: Mutex::new(RingBuffer::new(capacity)),
            running: AtomicBool::new(true),
            state: Mutex::new(LinkState::Running),
            readable: Notify::new(),
        });

        let receiver = {
            let socket = socket.clone();
            let shared = shared.clone();
            std::thread::Builder::new()
                .name("wlwire-recv".into())
                .spawn(move || receive_loop(&socket, &shared))?
        };

        Ok(Self {
            peer: None,
            socket,
            shared,
            write_lock: Mutex::new(()),
            receiver: Some(receiver),
        })
    }

    /// Path this transport connected to, if it was opened by path
    pub fn peer(&self) -> Option<&Path> {
        self.peer.as_deref()
    }

    /// Pull the next complete message, if one is fully buffered.
    ///
    /// Never blocks. Returns `None` while a message is still partially
    /// received, and forever once the connection is gone; check
    /// [`Self::state`] to tell the two apart.
    pub fn next_message(&self) -> Option<RawMessage> {
        let extracted = extract_message(&mut self.shared.buffer());
        match extracted {
            Extracted::Pending => None,
            Extracted::Message(data, fd) => Some(RawMessage { data, fd }),
            Extracted::Malformed(size) => {
                // The bad header stays buffered; only the first sighting stops us.
                if self.state() == LinkState::Running {
                    warn!("Malformed message header (size {}), stopping transport", size);
                    self.shared.stop(StopReason::Malformed(size));
                }
                None
            }
        }
    }

    /// Like [`Self::next_message`], with any descriptor appended to the bytes
    pub fn get_next_message(&self) -> Option<Vec<u8>> {
        self.next_message().map(RawMessage::into_bytes)
    }

    /// Copy of every byte currently buffered
    pub fn buffered(&self) -> Vec<u8> {
        self.shared.buffer().snapshot()
    }

    /// Write the whole buffer, blocking until the socket accepts it
    pub fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let _guard = lock(&self.write_lock);
        (&*self.socket).write_all(data)?;
        Ok(())
    }

    /// Write `buffers` as one message with `fds` attached as SCM_RIGHTS.
    ///
    /// Blocks until every byte is written. The descriptors travel with the
    /// first chunk the kernel accepts.
    pub fn send_with_fds(&self, buffers: &[&[u8]], fds: &[RawFd]) -> Result<(), TransportError> {
        let _guard = lock(&self.write_lock);

        let iov: Vec<IoSlice<'_>> = buffers.iter().map(|buf| IoSlice::new(buf)).collect();
        let total: usize = buffers.iter().map(|buf| buf.len()).sum();
        let cmsgs = if fds.is_empty() {
            vec![]
        } else {
            vec![ControlMessage::ScmRights(fds)]
        };

        let sent = loop {
            match sendmsg::<UnixAddr>(
                self.socket.as_raw_fd(),
                &iov,
                &cmsgs,
                MsgFlags::empty(),
                None,
            ) {
                Err(Errno::EINTR) => continue,
                result => break result?,
            }
        };

        if sent < total {
            debug!("Partial sendmsg ({} of {} bytes), writing remainder", sent, total);
            let rest = buffers.concat();
            (&*self.socket).write_all(&rest[sent..])?;
        }
        Ok(())
    }

    /// Alias of [`Self::send`]
    pub fn sendall(&self, data: &[u8]) -> Result<(), TransportError> {
        self.send(data)
    }

    /// Alias of [`Self::send_with_fds`]
    pub fn sendmsg(&self, buffers: &[&[u8]], fds: &[RawFd]) -> Result<(), TransportError> {
        self.send_with_fds(buffers, fds)
    }

    /// Ask the receive loop to exit.
    ///
    /// Cooperative: the loop notices after its current receive returns. Use
    /// [`Self::shutdown`] to unblock it immediately.
    pub fn stop(&self) {
        self.shared.stop(StopReason::Requested);
    }

    pub fn state(&self) -> LinkState {
        lock(&self.shared.state).clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Wait until the receive loop has buffered new data or stopped
    pub async fn readable(&self) {
        self.shared.readable.notified().await;
    }

    /// Stop, shut the socket down and join the receive thread
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.stop();
        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            debug!("Socket shutdown: {}", e);
        }
        if let Some(handle) = self.receiver.take() {
            if handle.join().is_err() {
                warn!("Receive thread panicked");
            }
        }
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Receive loop
// ============================================================================

fn receive_loop(socket: &UnixStream, shared: &Shared) {
    let mut buf = vec![0u8; RECV_CHUNK];

    let reason = loop {
        if !shared.running.load(Ordering::Acquire) {
            break StopReason::Requested;
        }

        match recv_chunk(socket, &mut buf) {
            Ok((0, _)) => break StopReason::PeerClosed,
            Ok((n, fd)) => {
                shared.buffer().append(&buf[..n], fd);
                shared.readable.notify_one();
            }
            Err(e) if is_transient(e) => continue,
            Err(e) => break StopReason::Failed(e.desc().to_string()),
        }
    };

    info!("Receive loop ended: {:?}", reason);
    shared.stop(reason);
}

fn is_transient(errno: Errno) -> bool {
    errno == Errno::EAGAIN || errno == Errno::EWOULDBLOCK || errno == Errno::EINTR
}

/// One receive call. Only the first passed descriptor is kept; any others
/// are closed.
fn recv_chunk(socket: &UnixStream, buf: &mut [u8]) -> nix::Result<(usize, Option<OwnedFd>)> {
    let mut cmsg_space = nix::cmsg_space!(RawFd);
    let mut iov = [IoSliceMut::new(buf)];
    let msg = recvmsg::<UnixAddr>(
        socket.as_raw_fd(),
        &mut iov,
        Some(&mut cmsg_space),
        recv_flags(),
    )?;

    let mut received = None;
    for cmsg in msg.cmsgs()? {
        if let ControlMessageOwned::ScmRights(fds) = cmsg {
            for raw in fds {
                if raw == -1 {
                    continue;
                }
                // SAFETY: the kernel just installed this descriptor for us
                let fd = unsafe { OwnedFd::from_raw_fd(raw) };
                if received.is_none() {
                    received = Some(fd);
                } else {
                    debug!("Dropping extra descriptor {}", raw);
                }
            }
        }
    }

    Ok((msg.bytes, received))
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn recv_flags() -> MsgFlags {
    MsgFlags::MSG_CMSG_CLOEXEC
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn recv_flags() -> MsgFlags {
    MsgFlags::empty()
}
