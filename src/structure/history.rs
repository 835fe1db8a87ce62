use std::collections::VecDeque;

/// An append-only log of values by simulation time.
#[derive(Clone, Debug)]
pub struct History<T> {
    /// Entries ordered by time.
    entries: VecDeque<(f64, T)>,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<T> History<T> {
    /// Creates an empty history.
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends a value. Times must not decrease.
    pub(crate) fn push(&mut self, time: f64, value: T) {
        debug_assert!(self.last_time().map_or(true, |last| time >= last));
        self.entries.push_back((time, value));
    }

    /// Gets the time of the most recent value.
    pub fn last_time(&self) -> Option<f64> {
        self.entries.back().map(|(time, _)| *time)
    }

    /// Gets the most recent value.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back().map(|(_, value)| value)
    }

    /// Gets the value that was current at the given time.
    pub fn at(&self, time: f64) -> Option<&T> {
        let idx = self.entries.partition_point(|(t, _)| *t <= time);
        idx.checked_sub(1).map(|idx| &self.entries[idx].1)
    }

    /// Drops values that stopped being current before the given time.
    /// The value current at `time` is always kept.
    pub fn prune_before(&mut self, time: f64) {
        let idx = self.entries.partition_point(|(t, _)| *t <= time);
        let drop = idx.saturating_sub(1);
        self.entries.drain(..drop);
    }

    /// Gets the number of values in the log.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over the times and values, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &T)> {
        self.entries.iter().map(|(time, value)| (*time, value))
    }
}
