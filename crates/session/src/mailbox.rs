//! Bounded FIFO for messages that arrive before their consumer is ready.

use std::collections::VecDeque;

/// Bounded FIFO. Pushing into a full mailbox is refused.
#[derive(Debug)]
pub struct Mailbox<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Mailbox<T> {
    /// Create a mailbox holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    /// Append an item. Returns false and drops it when the mailbox is full.
    pub fn push(&mut self, item: T) -> bool {
        if self.items.len() >= self.capacity {
            return false;
        }
        self.items.push_back(item);
        true
    }

    /// Remove and return every item matching `pred`, in arrival order.
    pub fn take_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(self.items.len());
        for item in self.items.drain(..) {
            if pred(&item) {
                taken.push(item);
            } else {
                kept.push_back(item);
            }
        }
        self.items = kept;
        taken
    }

    /// Remove and return everything.
    pub fn take_all(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded() {
        let mut mb = Mailbox::new(2);
        assert!(mb.push(1));
        assert!(mb.push(2));
        assert!(!mb.push(3));
        assert_eq!(mb.len(), 2);
    }

    #[test]
    fn test_take_where_keeps_order() {
        let mut mb = Mailbox::new(10);
        for i in 0..6 {
            mb.push(i);
        }
        assert_eq!(mb.take_where(|i| i % 2 == 0), vec![0, 2, 4]);
        assert_eq!(mb.take_all(), vec![1, 3, 5]);
        assert!(mb.is_empty());
    }
}
