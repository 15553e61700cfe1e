use alloc::collections::VecDeque;

/// Bounded history of the most recent values, newest first.
///
/// Pushing into a full buffer drops the oldest entry. Shrinking keeps the newest
/// entries that still fit.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentBuffer<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> RecentBuffer<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: T) {
        if self.capacity == 0 {
            return;
        }
        self.items.push_front(value);
        self.items.truncate(self.capacity);
    }

    /// Entries from newest to oldest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn get(&self, age: usize) -> Option<&T> {
        self.items.get(age)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.items.truncate(capacity);
        self.capacity = capacity;
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
