use crate::{
    AgentType, Direction, LaneId, LateralDirection, LinkId, ObjectId, ObjectSet, VehicleId,
    VehicleSet,
};

/// The attributes of a lane.
#[derive(Clone, Copy, Debug, Default)]
pub struct LaneAttributes<'a> {
    /// The length of the lane's design line in m.
    pub length: f64,
    /// The agent types permitted on the lane; empty permits every type.
    pub permitted: &'a [AgentType],
    /// Whether the lane may also be driven against its design line.
    pub bidirectional: bool,
}

/// A single lane of a link.
#[derive(Clone, Debug)]
pub struct Lane {
    /// The lane ID.
    id: LaneId,
    /// The link the lane belongs to.
    link: LinkId,
    /// The length of the design line in m.
    length: f64,
    /// The agent types permitted on the lane.
    permitted: Vec<AgentType>,
    /// Whether the lane may be driven against its design line.
    bidirectional: bool,
    /// The lanes whose design line ends where this one starts.
    lanes_in: Vec<LaneId>,
    /// The lanes whose design line starts where this one ends.
    lanes_out: Vec<LaneId>,
    /// The lanes alongside this one.
    lanes_adj: Vec<AdjacentLane>,
    /// The vehicles on the lane, ordered by position along the design line.
    vehicles: Vec<VehicleId>,
    /// The static objects on the lane, ordered by position along the design line.
    objects: Vec<ObjectId>,
}

/// A lateral adjacency, as claimed by the lane it is stored on.
#[derive(Clone, Copy, Debug)]
struct AdjacentLane {
    lane: LaneId,
    /// The side of the design line the other lane is on.
    side: LateralDirection,
    /// Whether moving onto the other lane is permitted by the rules of the road.
    legal: bool,
}

impl Lane {
    /// Creates a new lane.
    pub(crate) fn new(id: LaneId, link: LinkId, attribs: &LaneAttributes) -> Self {
        Self {
            id,
            link,
            length: attribs.length,
            permitted: attribs.permitted.to_vec(),
            bidirectional: attribs.bidirectional,
            lanes_in: vec![],
            lanes_out: vec![],
            lanes_adj: vec![],
            vehicles: vec![],
            objects: vec![],
        }
    }

    /// Gets the lane ID.
    pub fn id(&self) -> LaneId {
        self.id
    }

    /// Gets the link the lane belongs to.
    pub fn link_id(&self) -> LinkId {
        self.link
    }

    /// Gets the length of the lane in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Gets the lanes that precede this one along the design line.
    pub fn lanes_in(&self) -> &[LaneId] {
        &self.lanes_in
    }

    /// Gets the lanes that succeed this one along the design line.
    pub fn lanes_out(&self) -> &[LaneId] {
        &self.lanes_out
    }

    /// Gets the vehicles on the lane, ordered along the design line.
    pub fn vehicles(&self) -> &[VehicleId] {
        &self.vehicles
    }

    /// Gets the static objects on the lane, ordered along the design line.
    pub fn objects(&self) -> &[ObjectId] {
        &self.objects
    }

    /// Returns true if the given agent type may use the lane in direction `dir`.
    pub fn allows(&self, agent_type: AgentType, dir: Direction) -> bool {
        let permitted = self.permitted.is_empty() || self.permitted.contains(&agent_type);
        permitted && (dir.is_plus() || self.bidirectional)
    }

    /// Gets the lanes this lane claims are alongside it on the given side of its design line.
    pub(crate) fn adjacent_lanes(
        &self,
        side: LateralDirection,
        legal_only: bool,
    ) -> impl Iterator<Item = LaneId> + '_ {
        self.lanes_adj
            .iter()
            .filter(move |adj| adj.side == side && (adj.legal || !legal_only))
            .map(|adj| adj.lane)
    }

    pub(crate) fn add_lane_in(&mut self, id: LaneId) {
        self.lanes_in.push(id);
    }

    pub(crate) fn add_lane_out(&mut self, id: LaneId) {
        self.lanes_out.push(id);
    }

    pub(crate) fn add_adjacent_lane(&mut self, lane: LaneId, side: LateralDirection, legal: bool) {
        self.lanes_adj.push(AdjacentLane { lane, side, legal });
    }

    /// Inserts the vehicle with the given ID into the lane.
    pub(crate) fn insert_vehicle(&mut self, vehicles: &VehicleSet, id: VehicleId) {
        let veh_pos = vehicles[id].pos_mid();
        let idx = self
            .vehicles
            .partition_point(|id| vehicles[*id].pos_mid() <= veh_pos);
        self.vehicles.insert(idx, id);
    }

    /// Removes the vehicle with the given ID from the lane.
    pub(crate) fn remove_vehicle(&mut self, id: VehicleId) {
        if let Some(idx) = self.vehicles.iter().rposition(|v| *v == id) {
            self.vehicles.remove(idx);
        }
    }

    /// Inserts the object with the given ID into the lane.
    pub(crate) fn insert_object(&mut self, objects: &ObjectSet, id: ObjectId) {
        let obj_pos = objects[id].pos();
        let idx = self
            .objects
            .partition_point(|id| objects[*id].pos() <= obj_pos);
        self.objects.insert(idx, id);
    }
}
