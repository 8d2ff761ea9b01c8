//! Byte Ring Buffer
//!
//! Fixed-capacity byte accumulator fed by the transport's receive loop.
//! Received file descriptors are queued alongside the bytes.

use std::collections::VecDeque;
use std::os::fd::OwnedFd;

/// Ancillary slots per byte of capacity
const ANCILLARY_RATIO: usize = 16;

/// Fixed-capacity byte buffer with a parallel queue of ancillary items.
///
/// On overflow the oldest bytes are dropped, so the buffer always holds at
/// most `capacity` bytes. The ancillary queue holds at most
/// `capacity / 16` items and drops its oldest item the same way.
#[derive(Debug)]
pub struct RingBuffer<A = OwnedFd> {
    capacity: usize,
    bytes: VecDeque<u8>,
    ancillary: VecDeque<A>,
    ancillary_capacity: usize,
}

impl<A> RingBuffer<A> {
    /// Create an empty buffer holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        let ancillary_capacity = capacity / ANCILLARY_RATIO;
        Self {
            capacity,
            bytes: VecDeque::with_capacity(capacity),
            ancillary: VecDeque::with_capacity(ancillary_capacity),
            ancillary_capacity,
        }
    }

    /// Append received bytes and, optionally, one ancillary item.
    ///
    /// Input longer than the capacity is truncated to its trailing
    /// `capacity` bytes before it is added.
    pub fn append(&mut self, data: &[u8], ancillary: Option<A>) {
        let data = &data[data.len().saturating_sub(self.capacity)..];
        self.bytes.extend(data);

        let overflow = self.bytes.len().saturating_sub(self.capacity);
        if overflow > 0 {
            self.bytes.drain(..overflow);
        }

        if let Some(item) = ancillary {
            self.push_ancillary(item);
        }
    }

    fn push_ancillary(&mut self, item: A) {
        if self.ancillary_capacity == 0 {
            return;
        }
        if self.ancillary.len() == self.ancillary_capacity {
            self.ancillary.pop_front();
        }
        self.ancillary.push_back(item);
    }

    /// Snapshot of every buffered byte plus the oldest queued ancillary item.
    ///
    /// Bytes are not consumed; the returned ancillary item is removed from
    /// the queue.
    pub fn get(&mut self) -> (Vec<u8>, Option<A>) {
        (self.snapshot(), self.ancillary.pop_front())
    }

    /// Copy of the buffered bytes
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.iter().copied().collect()
    }

    /// Copy of the first `n` buffered bytes (fewer if less is buffered)
    pub fn peek(&self, n: usize) -> Vec<u8> {
        self.bytes.iter().take(n).copied().collect()
    }

    /// Remove the oldest queued ancillary item
    pub fn pop_ancillary(&mut self) -> Option<A> {
        self.ancillary.pop_front()
    }

    /// Drop the first `n` bytes.
    ///
    /// Callers check `n <= len()` first; larger values clear the buffer.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.bytes.len(), "consume past end of buffer");
        let n = n.min(self.bytes.len());
        self.bytes.drain(..n);
    }

    /// Remove and return the first `n` bytes
    pub fn take(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.bytes.len());
        self.bytes.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued ancillary items
    pub fn ancillary_len(&self) -> usize {
        self.ancillary.len()
    }
}
