use std::collections::VecDeque;

/// Ordered window of samples, oldest first
///
/// The queue itself is unbounded; the owning averager decides when to
/// evict through [`SampleQueue::pop_oldest`] or [`SampleQueue::clear`].
#[derive(Debug, Clone)]
pub struct SampleQueue<T> {
    samples: VecDeque<T>,
}

impl<T> SampleQueue<T> {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Append the newest sample
    pub fn push(&mut self, sample: T) {
        self.samples.push_back(sample);
    }

    /// Remove and return the oldest sample
    pub fn pop_oldest(&mut self) -> Option<T> {
        self.samples.pop_front()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn oldest(&self) -> Option<&T> {
        self.samples.front()
    }

    pub fn newest(&self) -> Option<&T> {
        self.samples.back()
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl<T> Default for SampleQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
