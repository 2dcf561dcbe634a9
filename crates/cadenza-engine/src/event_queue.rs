//! Bounded MIDI event queue between input drivers and the dispatcher.
//!
//! Producers call [`EventQueue::put`] from any thread; it never blocks. The
//! consumer drains in FIFO order, either without blocking ([`drain`]) or by
//! sleeping until at least one event is available ([`wait_drain`]).
//!
//! A drain only yields the events that were available when it started.
//! Events pushed while a drain is in progress wait for the next call, so one
//! drain per block is a consistent snapshot of the input.
//!
//! [`drain`]: EventQueue::drain
//! [`wait_drain`]: EventQueue::wait_drain

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cadenza_synth::MidiEvent;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};

use crate::error::QueueFull;

/// Default capacity, in events.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Fixed-capacity multi-producer event queue.
///
/// # Example
///
/// ```rust
/// use cadenza_engine::EventQueue;
/// use cadenza_synth::MidiEvent;
///
/// let queue = EventQueue::new(2);
/// queue.put(MidiEvent::note(0, 60, 100)).unwrap();
/// queue.put(MidiEvent::note(0, 64, 100)).unwrap();
/// assert!(queue.put(MidiEvent::note(0, 67, 100)).is_err());
///
/// let notes: Vec<u16> = queue.drain().map(|ev| ev.number).collect();
/// assert_eq!(notes, vec![60, 64]);
/// assert_eq!(queue.dropped(), 1);
/// ```
#[derive(Debug)]
pub struct EventQueue {
    tx: Sender<MidiEvent>,
    rx: Receiver<MidiEvent>,
    capacity: usize,
    dropped: AtomicU64,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an event without blocking.
    ///
    /// On a full queue the drop counter is incremented and the event is
    /// handed back inside the error.
    pub fn put(&self, event: MidiEvent) -> Result<(), QueueFull> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(ev) | TrySendError::Disconnected(ev)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(event = %ev, dropped, "MIDI event queue full");
                Err(QueueFull(ev))
            }
        }
    }

    /// Drain the events available right now, without blocking.
    pub fn drain(&self) -> Drain<'_> {
        Drain {
            rx: &self.rx,
            first: None,
            remaining: self.rx.len(),
        }
    }

    /// Block until at least one event is queued, then drain like [`drain`](Self::drain).
    pub fn wait_drain(&self) -> Drain<'_> {
        let first = self.rx.recv().ok();
        Drain {
            rx: &self.rx,
            remaining: if first.is_some() { self.rx.len() } else { 0 },
            first,
        }
    }

    /// Like [`wait_drain`](Self::wait_drain) but gives up after `timeout`,
    /// returning `None`.
    pub fn wait_drain_timeout(&self, timeout: Duration) -> Option<Drain<'_>> {
        match self.rx.recv_timeout(timeout) {
            Ok(first) => Some(Drain {
                rx: &self.rx,
                first: Some(first),
                remaining: self.rx.len(),
            }),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Number of events rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Maximum number of queued events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when no event is queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Lazy FIFO sequence of the events that were queued when the drain began.
///
/// Events not pulled before the drain is dropped stay queued.
#[derive(Debug)]
pub struct Drain<'a> {
    rx: &'a Receiver<MidiEvent>,
    first: Option<MidiEvent>,
    remaining: usize,
}

impl Iterator for Drain<'_> {
    type Item = MidiEvent;

    fn next(&mut self) -> Option<MidiEvent> {
        if let Some(ev) = self.first.take() {
            return Some(ev);
        }
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.rx.try_recv().ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining + usize::from(self.first.is_some());
        (0, Some(n))
    }
}
