use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use super::Entry;
use crate::RelativeLane;

struct Head<T> {
    distance: OrderedFloat<f64>,
    lane: RelativeLane,
    /// Index of the lane's iterator.
    source: usize,
    object: T,
}

impl<T> PartialEq for Head<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Head<T> {}

impl<T> PartialOrd for Head<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Head<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.distance, self.lane, self.source).cmp(&(other.distance, other.lane, other.source))
    }
}

/// Merges the distance-ordered searches of several lanes into one, tagging each
/// object with the lane it was found on.
pub struct MultiLaneIter<T, I> {
    sources: Vec<(RelativeLane, I)>,
    heap: BinaryHeap<Reverse<Head<T>>>,
    started: bool,
}

impl<T, I: Iterator<Item = Entry<T>>> MultiLaneIter<T, I> {
    pub fn new(lanes: impl IntoIterator<Item = (RelativeLane, I)>) -> Self {
        Self {
            sources: lanes.into_iter().collect(),
            heap: BinaryHeap::new(),
            started: false,
        }
    }

    fn advance(&mut self, source: usize) {
        let (lane, iter) = &mut self.sources[source];
        if let Some(entry) = iter.next() {
            self.heap.push(Reverse(Head {
                distance: OrderedFloat(entry.distance),
                lane: *lane,
                source,
                object: entry.object,
            }));
        }
    }
}

impl<T, I: Iterator<Item = Entry<T>>> Iterator for MultiLaneIter<T, I> {
    type Item = Entry<(RelativeLane, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            for source in 0..self.sources.len() {
                self.advance(source);
            }
        }
        let Reverse(head) = self.heap.pop()?;
        self.advance(head.source);
        Some(Entry {
            distance: head.distance.0,
            object: (head.lane, head.object),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use itertools::Itertools;

    fn lane(distances: &[f64]) -> std::vec::IntoIter<Entry<f64>> {
        distances
            .iter()
            .map(|d| Entry {
                distance: *d,
                object: *d,
            })
            .collect_vec()
            .into_iter()
    }

    #[test]
    fn merges_in_order_of_distance() {
        let iter = MultiLaneIter::new([
            (RelativeLane::LEFT, lane(&[5.0, 30.0])),
            (RelativeLane::CURRENT, lane(&[10.0, 20.0, 40.0])),
            (RelativeLane::RIGHT, lane(&[])),
        ]);
        let merged = iter.map(|e| (e.object.0, e.distance)).collect_vec();
        assert_eq!(
            merged,
            vec![
                (RelativeLane::LEFT, 5.0),
                (RelativeLane::CURRENT, 10.0),
                (RelativeLane::CURRENT, 20.0),
                (RelativeLane::LEFT, 30.0),
                (RelativeLane::CURRENT, 40.0),
            ]
        );
        assert!(merged
            .iter()
            .tuple_windows()
            .all(|(a, b)| a.1 <= b.1));
    }
}
