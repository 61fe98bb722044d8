// =============================================================================
// BoundedQueue — fixed-capacity blocking ring buffer with cooperative close
// =============================================================================
//
// Every pipeline stage hands work through one of these.  Producers block while
// the ring is full, consumers block while it is empty.  Closing is one-way:
//
//   - `enqueue` on a closing queue is rejected immediately, and a producer
//     parked on a full ring is released with `Rejected` once closing starts.
//   - `dequeue` keeps delivering buffered items after close and only reports
//     `Closed` once the ring is drained.  Each consumer that sees `Closed`
//     wakes the next waiter so every blocked consumer observes it.
//
// A second, coarser `producer` lock lets a caller publish several items as
// one uninterrupted burst.  It is never taken by the queue itself.
// =============================================================================

use parking_lot::{Condvar, Mutex, MutexGuard};

/// Reference capacity used by the pipeline queues.
pub const DEFAULT_CAPACITY: usize = 2000;

/// Result of [`BoundedQueue::enqueue`].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// The queue is closing; the item was dropped.
    Rejected,
}

/// Result of [`BoundedQueue::dequeue`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dequeued<T> {
    Item(T),
    /// The queue is closing and fully drained.
    Closed,
}

/// Point-in-time view of the ring indices, mostly for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub head: usize,
    pub tail: usize,
    pub len: usize,
    pub full: bool,
    pub empty: bool,
    pub closing: bool,
}

struct Ring<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    full: bool,
    empty: bool,
    closing: bool,
}

impl<T> Ring<T> {
    fn len(&self) -> usize {
        if self.full {
            self.slots.len()
        } else {
            (self.tail + self.slots.len() - self.head) % self.slots.len()
        }
    }
}

pub struct BoundedQueue<T> {
    ring: Mutex<Ring<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    producer: Mutex<()>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue holding at most `capacity` items.
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        let slots = std::iter::repeat_with(|| None)
            .take(capacity)
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            ring: Mutex::new(Ring {
                slots,
                head: 0,
                tail: 0,
                full: false,
                empty: true,
                closing: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            producer: Mutex::new(()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert `item` at the tail, blocking while the ring is full.
    pub fn enqueue(&self, item: T) -> Admission {
        let mut ring = self.ring.lock();
        if ring.closing {
            return Admission::Rejected;
        }
        while ring.full {
            self.not_full.wait(&mut ring);
            if ring.closing {
                return Admission::Rejected;
            }
        }

        let tail = ring.tail;
        ring.slots[tail] = Some(item);
        ring.tail = (tail + 1) % self.capacity;
        ring.full = ring.tail == ring.head;
        ring.empty = false;
        drop(ring);

        self.not_empty.notify_one();
        Admission::Accepted
    }

    /// Remove the item at the head, blocking while the ring is empty.
    ///
    /// Returns [`Dequeued::Closed`] only when the queue is closing and empty.
    pub fn dequeue(&self) -> Dequeued<T> {
        let mut ring = self.ring.lock();
        while ring.empty {
            if ring.closing {
                drop(ring);
                // Pass the news on to the next parked consumer.
                self.not_empty.notify_one();
                return Dequeued::Closed;
            }
            self.not_empty.wait(&mut ring);
        }

        let head = ring.head;
        let item = ring.slots[head].take();
        ring.head = (head + 1) % self.capacity;
        ring.empty = ring.head == ring.tail;
        ring.full = false;
        drop(ring);

        self.not_full.notify_one();
        match item {
            Some(item) => Dequeued::Item(item),
            // Unreachable while the ring invariants hold.
            None => Dequeued::Closed,
        }
    }

    /// Start closing.  Idempotent; the flag is never cleared.
    pub fn close(&self) {
        let mut ring = self.ring.lock();
        let already = ring.closing;
        ring.closing = true;
        drop(ring);

        if !already {
            self.not_empty.notify_all();
            self.not_full.notify_all();
        }
    }

    pub fn is_closing(&self) -> bool {
        self.ring.lock().closing
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().empty
    }

    pub fn is_full(&self) -> bool {
        self.ring.lock().full
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let ring = self.ring.lock();
        QueueSnapshot {
            head: ring.head,
            tail: ring.tail,
            len: ring.len(),
            full: ring.full,
            empty: ring.empty,
            closing: ring.closing,
        }
    }

    /// Take the producer-exclusivity lock.  Hold the guard across several
    /// `enqueue` calls to publish them without interleaving from other
    /// guarded producers.
    pub fn producer_guard(&self) -> MutexGuard<'_, ()> {
        self.producer.lock()
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.snapshot();
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &snap.len)
            .field("closing", &snap.closing)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
