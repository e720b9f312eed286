//! Fixed-capacity history buffers.
//!
//! Ghost trails, rolling averages and per-bubble position trails all need the
//! "last N values" and nothing older. [`RingBuffer`] keeps exactly that: a
//! fixed set of slots addressed by a monotonically increasing write cursor
//! taken modulo the capacity.

use std::fmt;

#[derive(Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    capacity: usize,
    cursor: u64,
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer. A zero capacity is bumped to one so that
    /// `push` always has somewhere to write.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    /// Total number of values ever pushed since the last clear.
    #[inline]
    pub fn total_written(&self) -> u64 {
        self.cursor
    }

    /// Appends a value, returning the evicted oldest value once full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let index = (self.cursor % self.capacity as u64) as usize;
        self.cursor += 1;
        if self.slots.len() < self.capacity {
            self.slots.push(value);
            None
        } else {
            Some(std::mem::replace(&mut self.slots[index], value))
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.cursor = 0;
    }

    /// Returns the value written `age` pushes ago; `age == 0` is the newest.
    pub fn get_back(&self, age: usize) -> Option<&T> {
        if age >= self.slots.len() {
            return None;
        }
        let newest = self.cursor - 1;
        let index = ((newest - age as u64) % self.capacity as u64) as usize;
        self.slots.get(index)
    }

    #[inline]
    pub fn latest(&self) -> Option<&T> {
        self.get_back(0)
    }

    /// Iterates from the newest value to the oldest.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.slots.len()).filter_map(move |age| self.get_back(age))
    }

    /// Iterates from the oldest value to the newest.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.slots.len())
            .rev()
            .filter_map(move |age| self.get_back(age))
    }
}

impl<T: fmt::Debug> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.slots.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// Rolling mean over the most recent `capacity` values.
#[derive(Debug, Clone)]
pub struct RollingAverage {
    window: RingBuffer<f32>,
    sum: f32,
}

impl RollingAverage {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: RingBuffer::with_capacity(capacity),
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        self.sum += value;
        if let Some(evicted) = self.window.push(value) {
            self.sum -= evicted;
        }
        // Guards against drift from repeated add/subtract.
        if self.window.total_written() % 1024 == 0 {
            self.sum = self.window.iter_newest_first().sum();
        }
    }

    /// Mean of the stored values, or zero when empty.
    pub fn mean(&self) -> f32 {
        if self.window.is_empty() {
            0.0
        } else {
            (self.sum / self.window.len() as f32).max(0.0)
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.window.capacity()
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrites_oldest_once_full() {
        let mut buffer = RingBuffer::with_capacity(3);
        assert_eq!(buffer.push(1), None);
        assert_eq!(buffer.push(2), None);
        assert_eq!(buffer.push(3), None);
        assert_eq!(buffer.push(4), Some(1));

        assert_eq!(buffer.len(), 3);
        let newest: Vec<_> = buffer.iter_newest_first().copied().collect();
        assert_eq!(newest, vec![4, 3, 2]);
        let oldest: Vec<_> = buffer.iter_oldest_first().copied().collect();
        assert_eq!(oldest, vec![2, 3, 4]);
    }

    #[test]
    fn get_back_indexes_by_age() {
        let mut buffer = RingBuffer::with_capacity(4);
        for value in 0..10 {
            buffer.push(value);
        }
        assert_eq!(buffer.get_back(0), Some(&9));
        assert_eq!(buffer.get_back(3), Some(&6));
        assert_eq!(buffer.get_back(4), None);
        assert_eq!(buffer.total_written(), 10);
    }

    #[test]
    fn never_grows_past_capacity() {
        let mut buffer = RingBuffer::with_capacity(8);
        for value in 0..1_000 {
            buffer.push(value);
        }
        assert_eq!(buffer.len(), 8);
        assert!(buffer.is_full());
    }

    #[test]
    fn clear_resets_cursor() {
        let mut buffer = RingBuffer::with_capacity(2);
        buffer.push(1.0);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.latest(), None);
        assert_eq!(buffer.total_written(), 0);
    }

    #[test]
    fn rolling_average_tracks_window() {
        let mut average = RollingAverage::new(4);
        assert_eq!(average.mean(), 0.0);
        for value in [1.0, 1.0, 1.0, 1.0, 0.0, 0.0] {
            average.push(value);
        }
        assert!((average.mean() - 0.5).abs() < 1e-6);
    }
}
