//! Deduplicating FIFO of pending writes

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// The queue is closed; nothing more may be enqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Closed;

#[derive(Debug)]
struct Inner<T> {
    order: VecDeque<T>,
    /// Mirrors `order`, for duplicate detection
    pending: HashSet<T>,
    closed: bool,
}

/// Multi-producer queue where an item is pending at most once
///
/// Created closed.
#[derive(Debug)]
pub(crate) struct WriteQueue<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone + Eq + Hash> WriteQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                order: VecDeque::new(),
                pending: HashSet::new(),
                closed: true,
            }),
        }
    }

    /// Enqueue an item; returns false if it was already pending
    pub fn push(&self, item: T) -> Result<bool, Closed> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Closed);
        }
        if !inner.pending.insert(item.clone()) {
            return Ok(false);
        }
        inner.order.push_back(item);
        Ok(true)
    }

    /// Put an item back at the head, even when closed
    pub fn push_front(&self, item: T) {
        let mut inner = self.inner.lock();
        if inner.pending.insert(item.clone()) {
            inner.order.push_front(item);
        }
    }

    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        let item = inner.order.pop_front()?;
        inner.pending.remove(&item);
        Some(item)
    }

    /// Withdraw a pending item; returns whether it was pending
    ///
    /// Linear in the queue length.
    pub fn remove(&self, item: &T) -> bool {
        let mut inner = self.inner.lock();
        if !inner.pending.remove(item) {
            return false;
        }
        if let Some(pos) = inner.order.iter().position(|queued| queued == item) {
            inner.order.remove(pos);
        }
        true
    }

    /// Withdraw every pending item matching `pred`, in queue order
    pub fn remove_where(&self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut inner = self.inner.lock();
        let Inner { order, pending, .. } = &mut *inner;
        let mut doomed = Vec::new();
        order.retain(|queued| {
            if pred(queued) {
                pending.remove(queued);
                doomed.push(queued.clone());
                false
            } else {
                true
            }
        });
        doomed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().order.is_empty()
    }

    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    pub fn reopen(&self) {
        self.inner.lock().closed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_queue() -> WriteQueue<u32> {
        let q = WriteQueue::new();
        q.reopen();
        q
    }

    #[test]
    fn test_fifo_with_dedupe() {
        let q = open_queue();
        assert_eq!(q.push(1), Ok(true));
        assert_eq!(q.push(2), Ok(true));
        assert_eq!(q.push(1), Ok(false));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_created_closed() {
        let q: WriteQueue<u32> = WriteQueue::new();
        assert_eq!(q.push(1), Err(Closed));

        q.reopen();
        q.push(1).unwrap();
        q.close();
        assert_eq!(q.push(2), Err(Closed));
        // Closing keeps what is already pending
        assert_eq!(q.pop(), Some(1));
    }

    fn drain(q: &WriteQueue<u32>) -> Vec<u32> {
        std::iter::from_fn(|| q.pop()).collect()
    }

    #[test]
    fn test_remove_keeps_order() {
        let q = open_queue();
        for i in 0..5 {
            q.push(i).unwrap();
        }
        assert!(q.remove(&2));
        assert!(!q.remove(&2));
        assert_eq!(q.len(), 4);
        assert_eq!(drain(&q), vec![0, 1, 3, 4]);
    }

    #[test]
    fn test_remove_then_push_again() {
        let q = open_queue();
        q.push(7).unwrap();
        q.push(8).unwrap();
        q.remove(&7);
        q.push(7).unwrap();
        assert_eq!(drain(&q), vec![8, 7]);
    }

    #[test]
    fn test_remove_where_and_push_front() {
        let q = open_queue();
        for i in 0..10 {
            q.push(i).unwrap();
        }
        let evens = q.remove_where(|i| i % 2 == 0);
        assert_eq!(evens, vec![0, 2, 4, 6, 8]);

        q.push_front(4);
        assert_eq!(q.pop(), Some(4));
        assert_eq!(drain(&q), vec![1, 3, 5, 7, 9]);
        assert!(q.is_empty());
    }
}
