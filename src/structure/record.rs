use std::cell::Cell;

use smallvec::SmallVec;

use crate::{Direction, LaneId, LinkId, NodeId, PerceptionError, RecordId};

/// How a record's start distance follows from the record it is derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordLink {
    /// The record ends where its source starts.
    Up,
    /// The record starts where its source ends.
    Down,
    /// The record ends alongside the end of its source.
    LateralEnd,
    /// The record lies in the root's cross-section, at the agent's fractional position.
    Cross,
}

impl RecordLink {
    /// Computes a start distance from the source's start distance and length.
    pub(crate) fn start_distance(
        self,
        source_start: f64,
        source_length: f64,
        length: f64,
        frac_pos: f64,
    ) -> f64 {
        match self {
            Self::Up => source_start - length,
            Self::Down => source_start + source_length,
            Self::LateralEnd => source_start + source_length - length,
            Self::Cross => -length * frac_pos,
        }
    }
}

/// One directed traversal of a lane in an agent's lane structure.
///
/// Records are owned by their [LaneStructure](crate::LaneStructure) and refer
/// to each other by [RecordId]. The start distance of a record is resolved
/// through the structure.
#[derive(Clone, Debug)]
pub struct LaneRecord {
    id: RecordId,
    lane: LaneId,
    direction: Direction,
    link: LinkId,
    /// The node the lane is entered from in the direction of travel.
    from_node: NodeId,
    /// The node the lane leads to in the direction of travel.
    to_node: NodeId,
    length: f64,
    /// The record the start distance is derived from.
    pub(super) source: Option<RecordId>,
    /// How the start distance is derived; `None` for a detached record.
    pub(super) source_link: Option<RecordLink>,
    /// The records whose start distance is derived from this one.
    pub(super) dependents: SmallVec<[RecordId; 2]>,
    /// The start distance, memoised with the structure generation it was computed in.
    pub(super) start_distance: Cell<Option<(u64, f64)>>,
    pub(super) next: SmallVec<[RecordId; 2]>,
    pub(super) prev: SmallVec<[RecordId; 2]>,
    pub(super) left: Option<RecordId>,
    pub(super) right: Option<RecordId>,
    pub(super) legal_left: bool,
    pub(super) legal_right: bool,
    /// Distance from the start of the lane to the upstream horizon.
    pub(super) cut_off_start: Option<f64>,
    /// Distance from the start of the lane to the downstream horizon.
    pub(super) cut_off_end: Option<f64>,
}

impl LaneRecord {
    pub(super) fn new(
        id: RecordId,
        lane: LaneId,
        direction: Direction,
        link: LinkId,
        nodes: (NodeId, NodeId),
        length: f64,
    ) -> Self {
        Self {
            id,
            lane,
            direction,
            link,
            from_node: nodes.0,
            to_node: nodes.1,
            length,
            source: None,
            source_link: None,
            dependents: SmallVec::new(),
            start_distance: Cell::new(None),
            next: SmallVec::new(),
            prev: SmallVec::new(),
            left: None,
            right: None,
            legal_left: false,
            legal_right: false,
            cut_off_start: None,
            cut_off_end: None,
        }
    }

    /// Gets the record ID.
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Gets the lane this record traverses.
    pub fn lane_id(&self) -> LaneId {
        self.lane
    }

    /// Gets the direction the lane is traversed in.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Gets the link of the lane.
    pub fn link_id(&self) -> LinkId {
        self.link
    }

    /// Gets the node the lane is entered from.
    pub fn from_node(&self) -> NodeId {
        self.from_node
    }

    /// Gets the node the lane leads to.
    pub fn to_node(&self) -> NodeId {
        self.to_node
    }

    /// Gets the length of the lane in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Gets the record the start distance is derived from, and how.
    pub fn start_distance_source(&self) -> Option<(Option<RecordId>, RecordLink)> {
        self.source_link.map(|link| (self.source, link))
    }

    /// Gets the records downstream; more than one at a split.
    pub fn next(&self) -> &[RecordId] {
        &self.next
    }

    /// Gets the records upstream; more than one at a merge.
    pub fn prev(&self) -> &[RecordId] {
        &self.prev
    }

    /// Gets the record alongside on the left.
    pub fn left(&self) -> Option<RecordId> {
        self.left
    }

    /// Gets the record alongside on the right.
    pub fn right(&self) -> Option<RecordId> {
        self.right
    }

    /// Returns true if a move to the left record is permitted by the rules of the road.
    pub fn legal_left(&self) -> bool {
        self.legal_left
    }

    /// Returns true if a move to the right record is permitted by the rules of the road.
    pub fn legal_right(&self) -> bool {
        self.legal_right
    }

    /// Returns true if a move to the left record is physically possible.
    pub fn physical_left(&self) -> bool {
        self.left.is_some()
    }

    /// Returns true if a move to the right record is physically possible.
    pub fn physical_right(&self) -> bool {
        self.right.is_some()
    }

    /// Gets the distance from the start of the lane to the upstream horizon, if the
    /// record was truncated there.
    pub fn cut_off_start(&self) -> Option<f64> {
        self.cut_off_start
    }

    /// Gets the distance from the start of the lane to the downstream horizon, if the
    /// record was truncated there.
    pub fn cut_off_end(&self) -> Option<f64> {
        self.cut_off_end
    }

    /// Returns true if the lane ends here without any way to continue.
    pub fn is_dead_end(&self) -> bool {
        self.cut_off_end.is_none() && self.next.is_empty()
    }

    /// Returns true if the record was found by a cross-section or downstream search.
    pub fn is_downstream_branch(&self) -> bool {
        !matches!(
            self.source_link,
            Some(RecordLink::Up) | Some(RecordLink::LateralEnd)
        )
    }

    pub(super) fn add_next(&mut self, next: RecordId) -> Result<(), PerceptionError> {
        if self.cut_off_end.is_some() {
            return Err(PerceptionError::Inconsistent(
                "cannot continue a record that is cut off at its end",
            ));
        }
        if !self.next.contains(&next) {
            self.next.push(next);
        }
        Ok(())
    }

    pub(super) fn add_prev(&mut self, prev: RecordId) -> Result<(), PerceptionError> {
        if self.cut_off_start.is_some() {
            return Err(PerceptionError::Inconsistent(
                "cannot precede a record that is cut off at its start",
            ));
        }
        if !self.prev.contains(&prev) {
            self.prev.push(prev);
        }
        Ok(())
    }

    pub(super) fn set_cut_off_start(&mut self, cut_off: f64) -> Result<(), PerceptionError> {
        if !self.prev.is_empty() {
            return Err(PerceptionError::Inconsistent(
                "a record with upstream records cannot be cut off at its start",
            ));
        }
        self.cut_off_start = Some(cut_off.clamp(0.0, self.length));
        Ok(())
    }

    pub(super) fn set_cut_off_end(&mut self, cut_off: f64) -> Result<(), PerceptionError> {
        if !self.next.is_empty() {
            return Err(PerceptionError::Inconsistent(
                "a record with downstream records cannot be cut off at its end",
            ));
        }
        self.cut_off_end = Some(cut_off.clamp(0.0, self.length));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn record() -> LaneRecord {
        LaneRecord::new(
            RecordId::default(),
            LaneId::default(),
            Direction::Plus,
            LinkId::default(),
            (NodeId::default(), NodeId::default()),
            80.0,
        )
    }

    #[test]
    fn links_compute_start_distances() {
        assert_approx_eq!(RecordLink::Up.start_distance(-20.0, 50.0, 80.0, 0.0), -100.0);
        assert_approx_eq!(RecordLink::Down.start_distance(-20.0, 50.0, 80.0, 0.0), 30.0);
        assert_approx_eq!(RecordLink::LateralEnd.start_distance(-20.0, 50.0, 80.0, 0.0), -50.0);
        assert_approx_eq!(RecordLink::Cross.start_distance(0.0, 0.0, 80.0, 0.25), -20.0);
    }

    #[test]
    fn cut_off_end_blocks_continuation() {
        let mut rec = record();
        rec.set_cut_off_end(120.0).unwrap();
        assert_eq!(rec.cut_off_end(), Some(80.0));
        assert!(!rec.is_dead_end());
        assert!(rec.add_next(RecordId::default()).is_err());
        rec.cut_off_end = None;
        assert!(rec.is_dead_end());
        rec.add_next(RecordId::default()).unwrap();
        assert!(rec.set_cut_off_end(10.0).is_err());
    }

    #[test]
    fn cut_off_start_blocks_predecessors() {
        let mut rec = record();
        rec.set_cut_off_start(-5.0).unwrap();
        assert_eq!(rec.cut_off_start(), Some(0.0));
        assert!(rec.add_prev(RecordId::default()).is_err());
    }
}
