//! Reference-counted slot queue
//!
//! A fixed-capacity circular buffer shared between writers and one or more
//! registered readers. Every reader observes every entry; a slot is
//! recycled only once each reader counted at write time has acknowledged
//! it, which is what lets several storage consumers share one queue
//! without copying.
//!
//! # Design
//!
//! - Slots carry `(entry, refs, seq)`. Monotonic `u64` sequence numbers
//!   stand in for wrapped offsets: `head..tail` is the occupied window and
//!   `tail - head` the occupancy.
//! - `write` stores with an explicit initial reference count (the shutdown
//!   marker is written with 1). `broadcast` computes the count from the
//!   readers registered *at enqueue time, under the queue lock*, so a
//!   racing attach or detach can never strand a slot's count.
//! - Readers acknowledge in order via [`SlotReader::release`]. When a
//!   slot's count hits zero its entry is dropped and the head advances
//!   over drained slots, waking writers.
//! - Dropping a reader surrenders all of its outstanding claims, read or
//!   unread. A consumer that is told to stop can therefore never wedge
//!   the queue.
//!
//! Mutual exclusion uses a `parking_lot` mutex held only for pointer-sized
//! bookkeeping; blocked sides park on `tokio::sync::Notify`, with the
//! waiter registered before the condition is re-checked so wakeups cannot
//! be lost. No lock is held across an await.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

/// Error returned when operating on a closed queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("slot queue closed")]
pub struct QueueClosed;

/// Occupancy of a slot queue at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDepth {
    /// Slots currently occupied (written, not yet fully released)
    pub used: usize,
    /// Fixed capacity
    pub capacity: usize,
}

/// Acknowledgement ticket for one read slot
///
/// Returned by [`SlotReader::read`]; hand it back to
/// [`SlotReader::release`] once the entry has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTicket {
    seq: u64,
}

struct Slot<T> {
    entry: Option<T>,
    refs: u32,
    seq: u64,
}

struct Inner<T> {
    slots: Box<[Slot<T>]>,
    /// Oldest occupied sequence (read offset)
    head: u64,
    /// Next sequence to write (write offset)
    tail: u64,
    /// Registered logical readers
    readers: u32,
    closed: bool,
}

impl<T> Inner<T> {
    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn used(&self) -> usize {
        (self.tail - self.head) as usize
    }

    #[inline]
    fn slot_index(&self, seq: u64) -> usize {
        (seq % self.capacity() as u64) as usize
    }

    fn push(&mut self, entry: T, refs: u32) {
        let index = self.slot_index(self.tail);
        let slot = &mut self.slots[index];
        debug_assert!(slot.entry.is_none(), "overwriting an occupied slot");
        slot.entry = Some(entry);
        slot.refs = refs;
        slot.seq = self.tail;
        self.tail += 1;
    }

    /// Drop one reference on `seq`. Returns true when a slot was fully
    /// drained and the head advanced, i.e. writers should be woken.
    fn release_seq(&mut self, seq: u64) -> bool {
        let index = self.slot_index(seq);
        let slot = &mut self.slots[index];
        if slot.seq != seq || slot.refs == 0 {
            // stale ticket (double release); ignore
            return false;
        }
        slot.refs -= 1;
        if slot.refs > 0 {
            return false;
        }
        slot.entry = None;

        // advance the head over consecutively drained slots
        let mut advanced = false;
        while self.head < self.tail {
            let index = self.slot_index(self.head);
            let slot = &self.slots[index];
            if slot.seq == self.head && slot.refs == 0 && slot.entry.is_none() {
                self.head += 1;
                advanced = true;
            } else {
                break;
            }
        }
        advanced
    }
}

/// Fixed-capacity reference-counted slot queue
///
/// See the module docs for the slot/reference-count model. Constructed
/// once with a fixed capacity and shared as `Arc<SlotQueue<T>>`; readers
/// are registered with [`SlotQueue::reader`].
pub struct SlotQueue<T> {
    inner: Mutex<Inner<T>>,
    /// Signalled after every write and on close
    readable: Notify,
    /// Signalled after a slot drains and on close
    writable: Notify,
}

impl<T> SlotQueue<T> {
    /// Create a queue with the given fixed capacity
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "slot queue capacity must be at least 1");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot {
            entry: None,
            refs: 0,
            seq: 0,
        });

        Self {
            inner: Mutex::new(Inner {
                slots: slots.into_boxed_slice(),
                head: 0,
                tail: 0,
                readers: 0,
                closed: false,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    /// Store an entry with an explicit initial reference count
    ///
    /// Waits while the queue is full. `refs` is the number of
    /// acknowledgements required before the slot may be reused and must be
    /// at least 1; control markers are written with 1.
    pub async fn write(&self, entry: T, refs: u32) -> Result<(), QueueClosed> {
        debug_assert!(refs > 0, "initial reference count must be at least 1");
        let mut entry = Some(entry);
        loop {
            let notified = self.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Err(QueueClosed);
                }
                if inner.used() < inner.capacity() {
                    let entry = entry.take().expect("entry is present until stored");
                    inner.push(entry, refs.max(1));
                    drop(inner);
                    self.readable.notify_waiters();
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Store an entry fanned out to every currently registered reader
    ///
    /// The reference count is taken from the number of registered readers
    /// inside the queue lock, so it always matches the set of readers that
    /// will observe the slot. With no readers the entry is dropped and
    /// `Ok(0)` is returned. Waits while the queue is full.
    pub async fn broadcast(&self, entry: T) -> Result<u32, QueueClosed> {
        let mut entry = Some(entry);
        loop {
            let notified = self.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Err(QueueClosed);
                }
                let refs = inner.readers;
                if refs == 0 {
                    return Ok(0);
                }
                if inner.used() < inner.capacity() {
                    let entry = entry.take().expect("entry is present until stored");
                    inner.push(entry, refs);
                    drop(inner);
                    self.readable.notify_waiters();
                    return Ok(refs);
                }
            }
            notified.await;
        }
    }

    /// Register a new logical reader
    ///
    /// The reader observes entries written from this point on; slots
    /// already in flight keep the reference count they were written with.
    pub fn reader(self: &Arc<Self>) -> SlotReader<T> {
        let mut inner = self.inner.lock();
        inner.readers += 1;
        let cursor = inner.tail;
        SlotReader {
            queue: Arc::clone(self),
            cursor,
            released: cursor,
        }
    }

    /// Register a reader starting at the oldest retained entry
    ///
    /// For queues written with explicit reference counts where the new
    /// reader takes over entries already in flight - the dispatcher uses
    /// this when adopting an input queue, so nothing written before the
    /// takeover is lost. Must not be mixed with `broadcast` fan-out: the
    /// in-flight counts do not include the new reader.
    pub fn reader_from_head(self: &Arc<Self>) -> SlotReader<T> {
        let mut inner = self.inner.lock();
        inner.readers += 1;
        let cursor = inner.head;
        SlotReader {
            queue: Arc::clone(self),
            cursor,
            released: cursor,
        }
    }

    /// Close the queue
    ///
    /// Wakes every blocked reader and writer; further writes fail with
    /// [`QueueClosed`]. Readers drain what remains, then see the error.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
        }
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    /// Whether the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Current occupancy
    pub fn depth(&self) -> QueueDepth {
        let inner = self.inner.lock();
        QueueDepth {
            used: inner.used(),
            capacity: inner.capacity(),
        }
    }

    /// Fixed capacity
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    /// Number of registered readers
    pub fn reader_count(&self) -> u32 {
        self.inner.lock().readers
    }
}

impl<T> fmt::Debug for SlotQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SlotQueue")
            .field("used", &inner.used())
            .field("capacity", &inner.capacity())
            .field("readers", &inner.readers)
            .field("closed", &inner.closed)
            .finish()
    }
}

/// One registered reader side of a [`SlotQueue`]
///
/// Tracks its own cursor; `read` never releases, `release` acknowledges
/// in order. Dropping the reader deregisters it and surrenders every
/// outstanding claim.
pub struct SlotReader<T> {
    queue: Arc<SlotQueue<T>>,
    /// Next sequence this reader will observe
    cursor: u64,
    /// All sequences below this have been acknowledged by this reader
    released: u64,
}

impl<T: Clone> SlotReader<T> {
    /// Read the oldest entry this reader has not yet observed
    ///
    /// Waits while nothing is unread at this reader's cursor. Returns a
    /// clone of the entry and the acknowledgement ticket; the slot stays
    /// claimed until [`release`](Self::release) is called with the ticket.
    pub async fn read(&mut self) -> Result<(T, SlotTicket), QueueClosed> {
        loop {
            let notified = self.queue.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let inner = self.queue.inner.lock();
                if self.cursor < inner.tail {
                    let index = inner.slot_index(self.cursor);
                    let slot = &inner.slots[index];
                    // The head cannot pass this reader's unreleased
                    // claims, so the slot still holds our sequence.
                    debug_assert_eq!(slot.seq, self.cursor);
                    let entry = slot.entry.clone().expect("claimed slot holds an entry");
                    let ticket = SlotTicket { seq: self.cursor };
                    self.cursor += 1;
                    return Ok((entry, ticket));
                }
                if inner.closed {
                    return Err(QueueClosed);
                }
            }
            notified.await;
        }
    }
}

impl<T> SlotReader<T> {
    /// Acknowledge one read slot
    ///
    /// Acknowledgements are in order; a stale or out-of-order ticket is
    /// ignored. When this was the slot's last outstanding reference the
    /// entry is dropped and blocked writers are woken.
    pub fn release(&mut self, ticket: SlotTicket) {
        if ticket.seq != self.released || ticket.seq >= self.cursor {
            debug_assert!(ticket.seq < self.released, "slots must be released in order");
            return;
        }
        self.released += 1;
        let freed = self.queue.inner.lock().release_seq(ticket.seq);
        if freed {
            self.queue.writable.notify_waiters();
        }
    }

    /// The queue this reader is registered with
    pub fn queue(&self) -> &Arc<SlotQueue<T>> {
        &self.queue
    }
}

impl<T> Drop for SlotReader<T> {
    fn drop(&mut self) {
        let mut freed = false;
        {
            let mut inner = self.queue.inner.lock();
            inner.readers = inner.readers.saturating_sub(1);
            // surrender every outstanding claim: read-but-unacknowledged
            // slots and everything not yet observed
            let tail = inner.tail;
            for seq in self.released..tail {
                freed |= inner.release_seq(seq);
            }
        }
        if freed {
            self.queue.writable.notify_waiters();
        }
    }
}

impl<T> fmt::Debug for SlotReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotReader")
            .field("cursor", &self.cursor)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
#[path = "slot_queue_test.rs"]
mod slot_queue_test;
