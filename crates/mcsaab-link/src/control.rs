//! Outbound control word ring.

use tracing::warn;

use crate::error::{LinkError, Result};

/// Ring capacity, including the word in flight.
pub const CONTROL_QUEUE_CAPACITY: usize = 4;

/// Bounded FIFO of control words waiting for the control sub-channel.
///
/// Only the head is ever in flight. [`push`](Self::push) and
/// [`complete`](Self::complete) return the word the caller must hand to the
/// channel next, if any.
#[derive(Debug, Default)]
pub struct ControlQueue {
    ring: [u32; CONTROL_QUEUE_CAPACITY],
    head: usize,
    len: usize,
    in_flight: bool,
}

impl ControlQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `word`.
    ///
    /// Returns `Ok(Some(word))` when nothing was in flight and the word must
    /// be sent now. A full ring drops the word.
    pub fn push(&mut self, word: u32) -> Result<Option<u32>> {
        if self.len == CONTROL_QUEUE_CAPACITY {
            warn!(
                word = format_args!("{word:#010x}"),
                capacity = CONTROL_QUEUE_CAPACITY,
                "control queue full, dropping word"
            );
            return Err(LinkError::QueueFull {
                queue: "control",
                capacity: CONTROL_QUEUE_CAPACITY,
            });
        }

        let slot = (self.head + self.len) % CONTROL_QUEUE_CAPACITY;
        self.ring[slot] = word;
        self.len += 1;

        if self.in_flight {
            Ok(None)
        } else {
            self.in_flight = true;
            Ok(Some(word))
        }
    }

    /// The head finished sending.
    ///
    /// Returns the completed word and the next word to send, if any.
    pub fn complete(&mut self) -> (Option<u32>, Option<u32>) {
        if !self.in_flight || self.len == 0 {
            return (None, None);
        }

        let done = self.ring[self.head];
        self.head = (self.head + 1) % CONTROL_QUEUE_CAPACITY;
        self.len -= 1;

        if self.len == 0 {
            self.in_flight = false;
            (Some(done), None)
        } else {
            (Some(done), Some(self.ring[self.head]))
        }
    }

    /// Word currently in flight.
    pub fn in_flight(&self) -> Option<u32> {
        self.in_flight.then(|| self.ring[self.head])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_word_goes_out_immediately() {
        let mut queue = ControlQueue::new();
        assert_eq!(queue.push(0x4000_0000).unwrap(), Some(0x4000_0000));
        assert_eq!(queue.in_flight(), Some(0x4000_0000));
        assert_eq!(queue.push(0x3000_0100).unwrap(), None);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn completion_advances_in_order() {
        let mut queue = ControlQueue::new();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.push(3).unwrap();

        assert_eq!(queue.complete(), (Some(1), Some(2)));
        assert_eq!(queue.complete(), (Some(2), Some(3)));
        assert_eq!(queue.complete(), (Some(3), None));
        assert!(queue.is_empty());
        assert_eq!(queue.in_flight(), None);

        // Idle again: the next push is sent at once.
        assert_eq!(queue.push(4).unwrap(), Some(4));
    }

    #[test]
    fn fifth_word_is_dropped() {
        let mut queue = ControlQueue::new();
        for word in 0..4 {
            queue.push(word).unwrap();
        }
        let err = queue.push(99).unwrap_err();
        assert!(matches!(
            err,
            LinkError::QueueFull {
                queue: "control",
                capacity: 4
            }
        ));
        assert_eq!(queue.len(), 4);

        // The dropped word never shows up.
        let mut sent = Vec::new();
        while let (Some(done), _) = queue.complete() {
            sent.push(done);
        }
        assert_eq!(sent, vec![0, 1, 2, 3]);
    }

    #[test]
    fn ring_wraps() {
        let mut queue = ControlQueue::new();
        for round in 0..10u32 {
            queue.push(round).unwrap();
            queue.push(round + 100).unwrap();
            assert_eq!(queue.complete(), (Some(round), Some(round + 100)));
            assert_eq!(queue.complete(), (Some(round + 100), None));
        }
    }

    #[test]
    fn spurious_completion_is_ignored() {
        let mut queue = ControlQueue::new();
        assert_eq!(queue.complete(), (None, None));
        queue.push(7).unwrap();
        queue.clear();
        assert_eq!(queue.complete(), (None, None));
    }
}
