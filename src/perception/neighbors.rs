use smallvec::smallvec;

use super::{Found, LaneSearch, PerceptionIter};
use crate::{
    LaneRecord, LaneStructure, LateralDirection, Network, PerceptionError, RecordId,
    RelativeLane, VehicleId,
};

/// Shifts the start of a search on an adjacent lane by this much, in m, so that
/// a vehicle level with the perceiver counts as behind on the left and ahead on
/// the right, and never as both.
const TIE_EPSILON: f64 = 1e-9;

fn tie_offset(lane: RelativeLane) -> f64 {
    match lane.lateral() {
        LateralDirection::Left => TIE_EPSILON,
        LateralDirection::Right => -TIE_EPSILON,
        LateralDirection::None => 0.0,
    }
}

/// Finds the nearest vehicle beyond `position` on a record, skipping the perceiver.
///
/// Leaders are vehicles whose front is at or beyond `position`, and followers are
/// vehicles whose rear is before it, so a vehicle alongside is found with a negative
/// distance.
fn find_vehicle(
    network: &Network,
    perceiver: Option<VehicleId>,
    record: &LaneRecord,
    position: f64,
    counter: Option<&usize>,
    ahead: bool,
) -> Option<Found<VehicleId, usize>> {
    let (lane, dir) = (record.lane_id(), record.direction());
    let mut idx = match counter {
        Some(idx) => network.next_vehicle(lane, *idx, dir, ahead)?,
        None if ahead => network.vehicle_ahead(lane, position, dir)?,
        None => network.vehicle_behind(lane, position, dir)?,
    };
    loop {
        let vehicle = network.vehicle_at(lane, idx)?;
        if Some(vehicle.id()) != perceiver {
            let extent = vehicle.extent_along(dir, record.length());
            return Some(Found {
                objects: smallvec![vehicle.id()],
                // distances are measured to the rear of leaders and the front of followers
                position: if ahead { extent.min } else { extent.max },
                counter: idx,
            });
        }
        idx = network.next_vehicle(lane, idx, dir, ahead)?;
    }
}

/// Searches for the vehicles ahead: leaders, measured to their rear.
#[derive(Clone, Copy)]
pub struct DownstreamNeighbors<'n> {
    network: &'n Network,
    perceiver: Option<VehicleId>,
    epsilon: f64,
}

impl<'n> DownstreamNeighbors<'n> {
    pub fn new(network: &'n Network, perceiver: Option<VehicleId>) -> Self {
        Self {
            network,
            perceiver,
            epsilon: 0.0,
        }
    }

    /// Breaks ties with the perceiver as seen from the given lane relative to it.
    pub fn on_lane(mut self, lane: RelativeLane) -> Self {
        self.epsilon = tie_offset(lane);
        self
    }

    /// Searches downstream from `position` on `record`.
    pub fn iter<'a>(
        self,
        structure: &'a LaneStructure,
        record: RecordId,
        position: f64,
        max_distance: f64,
    ) -> Result<PerceptionIter<'a, Self>, PerceptionError> {
        PerceptionIter::downstream(structure, record, position, max_distance, self)
    }
}

impl LaneSearch for DownstreamNeighbors<'_> {
    type Object = VehicleId;
    type Counter = usize;

    fn probe(
        &self,
        record: &LaneRecord,
        position: f64,
        counter: Option<&usize>,
        _downstream: bool,
    ) -> Option<Found<VehicleId, usize>> {
        let position = match counter {
            None => position + self.epsilon,
            Some(_) => position,
        };
        find_vehicle(self.network, self.perceiver, record, position, counter, true)
    }
}

/// Searches for the vehicles behind: followers, measured to their front.
#[derive(Clone, Copy)]
pub struct UpstreamNeighbors<'n> {
    network: &'n Network,
    perceiver: Option<VehicleId>,
    epsilon: f64,
}

impl<'n> UpstreamNeighbors<'n> {
    /// Creates the search for the given lane relative to the perceiver.
    pub fn new(network: &'n Network, perceiver: Option<VehicleId>, lane: RelativeLane) -> Self {
        Self {
            network,
            perceiver,
            epsilon: tie_offset(lane),
        }
    }

    /// Searches upstream from `position` on `record`.
    pub fn iter<'a>(
        self,
        structure: &'a LaneStructure,
        record: RecordId,
        position: f64,
        max_distance: f64,
    ) -> Result<PerceptionIter<'a, Self>, PerceptionError> {
        PerceptionIter::upstream(structure, record, position, max_distance, self)
    }
}

impl LaneSearch for UpstreamNeighbors<'_> {
    type Object = VehicleId;
    type Counter = usize;

    fn probe(
        &self,
        record: &LaneRecord,
        position: f64,
        counter: Option<&usize>,
        _downstream: bool,
    ) -> Option<Found<VehicleId, usize>> {
        let position = match counter {
            None => position + self.epsilon,
            Some(_) => position,
        };
        find_vehicle(self.network, self.perceiver, record, position, counter, false)
    }
}
