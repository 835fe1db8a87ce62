//! Lazy searches over a lane structure that yield objects in order of distance.
//!
//! A [PerceptionIter] walks the records of a [LaneStructure] downstream or
//! upstream from a starting point, asking a [LaneSearch] for the objects on each
//! record. Objects come out sorted by distance, each exactly once, and the walk
//! stops at the search's maximum distance. Nothing is computed until the
//! iterator is advanced.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use ordered_float::OrderedFloat;
use smallvec::SmallVec;

pub use collector::{FirstN, FnCollector, Nearest, PerceptionCollector, Within};
pub use multi_lane::MultiLaneIter;
pub use neighbors::{DownstreamNeighbors, UpstreamNeighbors};
pub use objects::{LaneObjects, PerceivedObject};

use crate::{LaneRecord, LaneStructure, PerceptionError, RecordId, Route};

mod collector;
mod multi_lane;
mod neighbors;
mod objects;

/// An object found by a perception search, with its distance from the point of perception.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Entry<T> {
    /// The distance in m. Measured to the nearest point of the object.
    pub distance: f64,
    pub object: T,
}

/// The objects a search found on a lane record.
#[derive(Clone, Debug)]
pub struct Found<T, C> {
    /// The objects found, all at the same position.
    pub objects: SmallVec<[T; 1]>,
    /// Their position along the record, measured from its start in its direction.
    pub position: f64,
    /// Where to continue the search on the record.
    pub counter: C,
}

/// A search for objects on a single lane record.
pub trait LaneSearch {
    type Object: Clone;
    /// Search progress on one record.
    type Counter: Clone;

    /// Finds the nearest objects on `record` beyond `position` (in the direction of the
    /// search), or beyond those last found if `counter` is given.
    ///
    /// Positions are measured from the start of the record in its direction of travel.
    /// A new record is entered with a position of negative infinity when searching
    /// downstream and positive infinity when searching upstream.
    fn probe(
        &self,
        record: &LaneRecord,
        position: f64,
        counter: Option<&Self::Counter>,
        downstream: bool,
    ) -> Option<Found<Self::Object, Self::Counter>>;
}

struct Pending<T> {
    distance: OrderedFloat<f64>,
    /// Insertion order, breaking ties between equally distant objects.
    seq: u64,
    record: RecordId,
    object: T,
}

impl<T> PartialEq for Pending<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Pending<T> {}

impl<T> PartialOrd for Pending<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Pending<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.distance, self.seq).cmp(&(other.distance, other.seq))
    }
}

/// A lazy, distance-ordered search through a lane structure.
pub struct PerceptionIter<'a, S: LaneSearch> {
    search: S,
    structure: &'a LaneStructure,
    route: Option<&'a Route>,
    start: RecordId,
    initial_position: f64,
    /// The start distance of the point of perception.
    reference: f64,
    max_distance: f64,
    downstream: bool,
    started: bool,
    queue: BinaryHeap<Reverse<Pending<S::Object>>>,
    /// Objects found at the same position as the one queued for their record.
    ties: HashMap<RecordId, VecDeque<S::Object>>,
    counters: HashMap<RecordId, (f64, S::Counter)>,
    visited: HashSet<RecordId>,
    seq: u64,
}

impl<'a, S: LaneSearch> PerceptionIter<'a, S> {
    /// Searches downstream from `position` on `record`, up to `max_distance`.
    pub fn downstream(
        structure: &'a LaneStructure,
        record: RecordId,
        position: f64,
        max_distance: f64,
        search: S,
    ) -> Result<Self, PerceptionError> {
        Self::new(structure, record, position, max_distance, true, search)
    }

    /// Searches upstream from `position` on `record`, up to `max_distance`.
    pub fn upstream(
        structure: &'a LaneStructure,
        record: RecordId,
        position: f64,
        max_distance: f64,
        search: S,
    ) -> Result<Self, PerceptionError> {
        Self::new(structure, record, position, max_distance, false, search)
    }

    fn new(
        structure: &'a LaneStructure,
        record: RecordId,
        position: f64,
        max_distance: f64,
        downstream: bool,
        search: S,
    ) -> Result<Self, PerceptionError> {
        if max_distance.is_nan() || max_distance < 0.0 {
            return Err(PerceptionError::InvalidParameter(format!(
                "maximum distance must not be negative, got {}",
                max_distance
            )));
        }
        let reference = structure.start_distance(record)? + position;
        Ok(Self {
            search,
            structure,
            route: None,
            start: record,
            initial_position: position,
            reference,
            max_distance,
            downstream,
            started: false,
            queue: BinaryHeap::new(),
            ties: HashMap::new(),
            counters: HashMap::new(),
            visited: HashSet::new(),
            seq: 0,
        })
    }

    /// Only branches onto records that follow the route.
    pub fn with_route(mut self, route: &'a Route) -> Self {
        self.route = Some(route);
        self
    }

    /// Gets the distance from the point of perception to a position on a record.
    fn distance(&self, record: RecordId, position: f64) -> Option<f64> {
        let start = self.structure.start_distance(record).ok()?;
        Some(match self.downstream {
            true => start + position - self.reference,
            false => self.reference - (start + position),
        })
    }

    fn probe(&mut self, record: RecordId, position: f64, counter: Option<S::Counter>) {
        let Some(rec) = self.structure.record(record) else {
            return;
        };
        let found = self
            .search
            .probe(rec, position, counter.as_ref(), self.downstream);
        match found {
            Some(found) if !found.objects.is_empty() => {
                let Some(distance) = self.distance(record, found.position) else {
                    return;
                };
                if distance > self.max_distance {
                    return;
                }
                let mut objects = found.objects.into_iter();
                if let Some(first) = objects.next() {
                    self.ties.insert(record, objects.collect());
                    self.counters
                        .insert(record, (found.position, found.counter));
                    self.push(distance, record, first);
                }
            }
            _ => self.branch(record),
        }
    }

    /// Continues the search onto the records beyond an exhausted record.
    fn branch(&mut self, record: RecordId) {
        let Some(rec) = self.structure.record(record) else {
            return;
        };
        let neighbours: SmallVec<[RecordId; 2]> = match self.downstream {
            true => rec.next().into(),
            false => rec.prev().into(),
        };
        for id in neighbours {
            if !self.visited.insert(id) {
                continue;
            }
            let Some(neighbour) = self.structure.record(id) else {
                continue;
            };
            if let Some(route) = self.route {
                if !route.follows(neighbour.from_node(), neighbour.to_node()) {
                    continue;
                }
            }
            let Ok(start) = self.structure.start_distance(id) else {
                continue;
            };
            let (in_range, position) = match self.downstream {
                true => (start - self.reference <= self.max_distance, f64::NEG_INFINITY),
                false => (
                    self.reference - (start + neighbour.length()) <= self.max_distance,
                    f64::INFINITY,
                ),
            };
            if in_range {
                self.probe(id, position, None);
            }
        }
    }

    fn push(&mut self, distance: f64, record: RecordId, object: S::Object) {
        self.seq += 1;
        self.queue.push(Reverse(Pending {
            distance: OrderedFloat(distance),
            seq: self.seq,
            record,
            object,
        }));
    }
}

impl<'a, S: LaneSearch> Iterator for PerceptionIter<'a, S> {
    type Item = Entry<S::Object>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            self.visited.insert(self.start);
            self.probe(self.start, self.initial_position, None);
        }
        let Reverse(pending) = self.queue.pop()?;
        let record = pending.record;
        let tie = self.ties.get_mut(&record).and_then(VecDeque::pop_front);
        match tie {
            Some(object) => self.push(pending.distance.0, record, object),
            None => {
                if let Some((position, counter)) = self.counters.get(&record).cloned() {
                    self.probe(record, position, Some(counter));
                }
            }
        }
        Some(Entry {
            distance: pending.distance.0,
            object: pending.object,
        })
    }
}

/// Folds distance-ordered perception results with a collector.
pub trait PerceptionFold<T>: Iterator<Item = Entry<T>> + Sized {
    /// Feeds entries to the collector until it stops early or the entries run out.
    fn collect_with<C: PerceptionCollector<T>>(self, mut collector: C) -> C::Output {
        let mut acc = collector.identity();
        for (idx, entry) in self.enumerate() {
            match collector.accumulate(acc, &entry.object, entry.distance, idx + 1) {
                std::ops::ControlFlow::Continue(next) => acc = next,
                std::ops::ControlFlow::Break(done) => return collector.finalize(done),
            }
        }
        collector.finalize(acc)
    }
}

impl<T, I: Iterator<Item = Entry<T>>> PerceptionFold<T> for I {}

#[cfg(test)]
mod test {
    use super::*;

    /// Finds fixed positions on every record.
    struct Marks(Vec<f64>);

    impl LaneSearch for Marks {
        type Object = (RecordId, f64);
        type Counter = usize;

        fn probe(
            &self,
            record: &LaneRecord,
            position: f64,
            counter: Option<&usize>,
            downstream: bool,
        ) -> Option<Found<Self::Object, usize>> {
            let order: Vec<f64> = match downstream {
                true => self.0.clone(),
                false => self.0.iter().rev().copied().collect(),
            };
            let idx = match counter {
                Some(idx) => idx + 1,
                None => order
                    .iter()
                    .position(|pos| if downstream { *pos > position } else { *pos < position })?,
            };
            let pos = *order.get(idx)?;
            Some(Found {
                objects: smallvec::smallvec![(record.id(), pos)],
                position: pos,
                counter: idx,
            })
        }
    }

    fn structure() -> (LaneStructure, Vec<crate::LaneId>) {
        use crate::structure::test::{agent, road};
        let road = road(5, 1, 100.0);
        let lanes: Vec<_> = road.lanes.iter().map(|l| l[0]).collect();
        let mut structure = LaneStructure::new(crate::StructureConfig::default()).unwrap();
        structure
            .update(&road.net, &agent(lanes[2], 50.0), None, 0.0)
            .unwrap();
        (structure, lanes)
    }

    #[test]
    fn downstream_is_sorted_and_bounded() {
        let (structure, _) = structure();
        let root = structure.root_record().unwrap().id();
        let iter =
            PerceptionIter::downstream(&structure, root, 50.0, 140.0, Marks(vec![20.0, 80.0]))
                .unwrap();
        let distances: Vec<f64> = iter.map(|entry| entry.distance).collect();
        assert_eq!(distances, vec![30.0, 70.0, 130.0]);
    }

    #[test]
    fn upstream_is_sorted_and_bounded() {
        let (structure, _) = structure();
        let root = structure.root_record().unwrap().id();
        let iter =
            PerceptionIter::upstream(&structure, root, 50.0, 100.0, Marks(vec![20.0, 80.0]))
                .unwrap();
        let distances: Vec<f64> = iter.map(|entry| entry.distance).collect();
        assert_eq!(distances, vec![30.0, 70.0]);
    }

    #[test]
    fn nothing_is_found_past_a_zero_distance() {
        let (structure, _) = structure();
        let root = structure.root_record().unwrap().id();
        let mut iter =
            PerceptionIter::downstream(&structure, root, 50.0, 0.0, Marks(vec![20.0, 80.0]))
                .unwrap();
        assert!(iter.next().is_none());
        assert!(
            PerceptionIter::downstream(&structure, root, 50.0, -1.0, Marks(vec![])).is_err()
        );
    }

    #[test]
    fn collectors_stop_early() {
        let (structure, _) = structure();
        let root = structure.root_record().unwrap().id();
        let iter = || {
            PerceptionIter::downstream(&structure, root, 50.0, 295.0, Marks(vec![20.0, 80.0]))
                .unwrap()
        };
        let nearest = iter().collect_with(Nearest::new()).unwrap();
        assert_eq!(nearest.distance, 30.0);
        let first = iter().collect_with(FirstN::new(3));
        assert_eq!(first.len(), 3);
        let within = iter().collect_with(Within::new(150.0));
        assert_eq!(within.len(), 3);
        let count = iter().collect_with(FnCollector::new(
            || 0usize,
            |count: usize, _: &(RecordId, f64), _: f64, _: usize| {
                std::ops::ControlFlow::Continue(count + 1)
            },
            |count: usize| count,
        ));
        assert_eq!(count, 5);
    }
}
