//! Bounded single-producer/single-consumer queues between the producer and
//! the render thread.
//!
//! A thin layer over `crossbeam-channel`'s array channel. Neither end is
//! `Clone`, so each queue has exactly one pusher and one popper. Pushing never
//! blocks: a full queue hands the item back.

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use thiserror::Error;

/// Creates a queue holding at most `capacity` items.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn bounded<T>(capacity: usize) -> (HandoffTx<T>, HandoffRx<T>) {
    assert!(capacity > 0, "handoff queue capacity must be non-zero");
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (HandoffTx { tx, capacity }, HandoffRx { rx, capacity })
}

/// Rejected push; the item is returned to the caller.
pub enum PushError<T> {
    /// The queue already holds `capacity` items.
    Full(T),
    /// The receiving end is gone.
    Closed(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("handoff queue is full"),
            Self::Closed(_) => f.write_str("handoff queue is closed"),
        }
    }
}

impl<T> std::error::Error for PushError<T> {}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    #[error("handoff queue is empty")]
    Empty,
    #[error("handoff queue is closed")]
    Closed,
}

/// Pushing end of a handoff queue.
pub struct HandoffTx<T> {
    tx: Sender<T>,
    capacity: usize,
}

impl<T> HandoffTx<T> {
    /// Enqueues `item` without blocking.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(item) => PushError::Full(item),
            TrySendError::Disconnected(item) => PushError::Closed(item),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Popping end of a handoff queue.
pub struct HandoffRx<T> {
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> HandoffRx<T> {
    /// Dequeues the oldest item without blocking.
    ///
    /// Items pushed before the sender went away are still returned; `Closed`
    /// is reported only once the queue is empty.
    pub fn try_pop(&self) -> Result<T, PopError> {
        self.rx.try_recv().map_err(|e| match e {
            TryRecvError::Empty => PopError::Empty,
            TryRecvError::Disconnected => PopError::Closed,
        })
    }

    /// Dequeues the oldest item, sleeping until one is pushed or `timeout`
    /// elapses.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, PopError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => PopError::Empty,
            RecvTimeoutError::Disconnected => PopError::Closed,
        })
    }

    /// Pops everything currently queued.
    pub fn drain(&self) -> impl Iterator<Item = T> + '_ {
        self.rx.try_iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_capacity_is_enforced() {
        let (tx, rx) = bounded(4);

        for i in 0..4 {
            assert!(tx.try_push(i).is_ok());
        }
        assert_eq!(tx.len(), 4);

        let rejected = tx.try_push(99).unwrap_err();
        assert!(rejected.is_full());
        assert_eq!(rejected.into_inner(), 99);

        // Rejection leaves the queue untouched
        assert_eq!(rx.len(), 4);
        let popped: Vec<_> = rx.drain().collect();
        assert_eq!(popped, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_empty_pop() {
        let (_tx, rx) = bounded::<u32>(2);
        assert_eq!(rx.try_pop(), Err(PopError::Empty));
        assert_eq!(rx.capacity(), 2);
    }

    #[test]
    fn test_closed_ends() {
        let (tx, rx) = bounded(2);
        tx.try_push(1).unwrap();
        drop(tx);

        // Queued items survive the sender
        assert_eq!(rx.try_pop(), Ok(1));
        assert_eq!(rx.try_pop(), Err(PopError::Closed));

        let (tx, rx) = bounded(2);
        drop(rx);
        assert!(matches!(tx.try_push(5), Err(PushError::Closed(5))));
    }

    #[test]
    fn test_pop_timeout_wakes_on_push() {
        let (tx, rx) = bounded(1);
        let pusher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            tx.try_push(7u32).unwrap();
        });

        let start = Instant::now();
        assert_eq!(rx.pop_timeout(Duration::from_secs(5)), Ok(7));
        assert!(start.elapsed() < Duration::from_secs(5));
        pusher.join().unwrap();
    }

    #[test]
    fn test_pop_timeout_expires() {
        let (_tx, rx) = bounded::<u32>(1);
        assert_eq!(
            rx.pop_timeout(Duration::from_millis(5)),
            Err(PopError::Empty)
        );
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn test_zero_capacity_panics() {
        let _ = bounded::<u32>(0);
    }

    #[test]
    fn test_handoff_ends_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<HandoffTx<Vec<u8>>>();
        assert_send::<HandoffRx<Vec<u8>>>();
    }
}
