// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded FIFO history.

use std::collections::VecDeque;

/// Fixed-capacity buffer that evicts its oldest entry when full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item`, returning the evicted entry if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Newest entry.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copies the entries, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first() {
        let mut buffer = RingBuffer::new(20);
        let mut evicted = Vec::new();
        for i in 0..25 {
            if let Some(old) = buffer.push(i) {
                evicted.push(old);
            }
        }

        assert_eq!(buffer.len(), 20);
        assert_eq!(evicted, vec![0, 1, 2, 3, 4]);
        assert_eq!(buffer.to_vec(), (5..25).collect::<Vec<_>>());
        assert_eq!(buffer.latest(), Some(&24));
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut buffer = RingBuffer::new(3);
        for i in 0..100 {
            buffer.push(i);
            assert!(buffer.len() <= buffer.capacity());
        }
    }

    #[test]
    fn zero_capacity_keeps_one() {
        let mut buffer = RingBuffer::new(0);
        buffer.push('a');
        assert_eq!(buffer.push('b'), Some('a'));
        assert_eq!(buffer.capacity(), 1);
    }

    #[test]
    fn starts_empty() {
        let buffer: RingBuffer<u8> = RingBuffer::new(5);
        assert!(buffer.is_empty());
        assert!(buffer.latest().is_none());
    }
}
