//! The per-type message queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::BrokerError;

/// An unbounded FIFO of fixed-size byte payloads.
///
/// The element size is fixed at creation (the size of the type the queue
/// was made for) and every push is checked against it. `push`, `pop`, and
/// `peek` take the queue's mutex; [`MessageQueue::is_empty`] reads an atomic
/// length counter and never locks.
#[derive(Debug)]
pub struct MessageQueue {
    elem_size: u64,
    data: Mutex<VecDeque<Vec<u8>>>,
    len: AtomicUsize,
}

impl MessageQueue {
    /// Creates an empty queue for elements of exactly `elem_size` bytes.
    pub fn new(elem_size: u64) -> Self {
        Self {
            elem_size,
            data: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// The fixed element size in bytes.
    pub fn elem_size(&self) -> u64 {
        self.elem_size
    }

    /// Appends a payload.
    ///
    /// Fails with [`BrokerError::SizeMismatch`] unless the payload is
    /// exactly the element size.
    pub fn push(&self, payload: Vec<u8>) -> Result<(), BrokerError> {
        if payload.len() as u64 != self.elem_size {
            return Err(BrokerError::SizeMismatch {
                expected: self.elem_size,
                actual: payload.len() as u64,
            });
        }

        let mut data = self.data.lock().unwrap();
        data.push_back(payload);
        self.len.store(data.len(), Ordering::Release);
        Ok(())
    }

    /// Removes and returns the head element.
    pub fn pop(&self) -> Result<Vec<u8>, BrokerError> {
        let mut data = self.data.lock().unwrap();
        let head = data.pop_front().ok_or(BrokerError::QueueEmpty)?;
        self.len.store(data.len(), Ordering::Release);
        Ok(head)
    }

    /// Returns a copy of the head element without removing it.
    pub fn peek(&self) -> Result<Vec<u8>, BrokerError> {
        let data = self.data.lock().unwrap();
        data.front().cloned().ok_or(BrokerError::QueueEmpty)
    }

    /// Whether the queue is currently empty. Does not lock.
    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::Acquire) == 0
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn fifo_order() {
        let queue = MessageQueue::new(2);
        for i in 0u8..5 {
            queue.push(vec![i, i]).unwrap();
        }
        for i in 0u8..5 {
            assert_eq!(queue.pop().unwrap(), vec![i, i]);
        }
        assert_matches!(queue.pop(), Err(BrokerError::QueueEmpty));
    }

    #[test]
    fn rejects_wrong_size() {
        let queue = MessageQueue::new(4);
        assert_matches!(
            queue.push(vec![1, 2, 3]),
            Err(BrokerError::SizeMismatch {
                expected: 4,
                actual: 3
            })
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn peek_does_not_remove() {
        let queue = MessageQueue::new(1);
        queue.push(vec![7]).unwrap();
        assert_eq!(queue.peek().unwrap(), vec![7]);
        assert_eq!(queue.peek().unwrap(), vec![7]);
        assert_eq!(queue.pop().unwrap(), vec![7]);
        assert_matches!(queue.peek(), Err(BrokerError::QueueEmpty));
    }

    #[test]
    fn emptiness_tracks_pushes_and_pops() {
        let queue = MessageQueue::new(0);
        assert!(queue.is_empty());
        queue.push(vec![]).unwrap();
        assert!(!queue.is_empty());
        queue.pop().unwrap();
        assert!(queue.is_empty());
    }
}
