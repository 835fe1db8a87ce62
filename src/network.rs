//! An in-memory road network: nodes, links, lanes, and what occupies them.
//!
//! The network is the shared, read-only snapshot that lane structures are
//! built from. All lateral adjacency is directional: a lane only knows the
//! lanes it claims to be alongside, which need not claim it back.

use smallvec::SmallVec;

pub use lane::{Lane, LaneAttributes};
pub use object::{
    Conflict, ConflictType, LaneObject, LightState, ObjectKind, Perceivable, SpeedSign,
    TrafficLight,
};
pub use route::Route;

use crate::{
    AgentType, Direction, LaneId, LaneSet, LateralDirection, LinkId, LinkSet, NodeId, NodeSet,
    ObjectId, ObjectSet, Vehicle, VehicleAttributes, VehicleId, VehicleSet,
};

mod lane;
mod object;
mod route;

/// A point where links start and end.
#[derive(Clone, Debug)]
pub struct Node {
    id: NodeId,
    name: String,
}

impl Node {
    /// Gets the node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Gets the name of the node.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A road between two nodes, carrying one or more lanes.
#[derive(Clone, Debug)]
pub struct Link {
    id: LinkId,
    start: NodeId,
    end: NodeId,
    /// The lanes of the link, ordered left-to-right along the design line.
    lanes: Vec<LaneId>,
}

impl Link {
    /// Gets the link ID.
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Gets the node the link starts at.
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// Gets the node the link ends at.
    pub fn end(&self) -> NodeId {
        self.end
    }

    /// Gets the lanes of the link, ordered left-to-right.
    pub fn lanes(&self) -> &[LaneId] {
        &self.lanes
    }
}

/// A road network with its vehicles and static objects.
#[derive(Clone, Default)]
pub struct Network {
    nodes: NodeSet,
    links: LinkSet,
    lanes: LaneSet,
    objects: ObjectSet,
    vehicles: VehicleSet,
    /// Whether some lane claims more than one lane alongside it on one side.
    ambiguous_adjacency: bool,
}

impl Network {
    /// Creates an empty network.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a node to the network.
    pub fn add_node(&mut self, name: &str) -> NodeId {
        self.nodes.insert_with_key(|id| Node {
            id,
            name: name.to_string(),
        })
    }

    /// Adds a link between two nodes.
    pub fn add_link(&mut self, start: NodeId, end: NodeId) -> LinkId {
        assert!(
            self.nodes.contains_key(start) && self.nodes.contains_key(end),
            "Links must connect nodes of the network"
        );
        self.links.insert_with_key(|id| Link {
            id,
            start,
            end,
            lanes: vec![],
        })
    }

    /// Adds a lane to a link, to the right of the link's existing lanes.
    ///
    /// # Panics
    /// Panics if the link does not exist or the length is not positive.
    pub fn add_lane(&mut self, link: LinkId, attributes: &LaneAttributes) -> LaneId {
        assert!(
            attributes.length.is_finite() && attributes.length > 0.0,
            "Lanes must have a positive length"
        );
        let id = self
            .lanes
            .insert_with_key(|id| Lane::new(id, link, attributes));
        self.links[link].lanes.push(id);
        id
    }

    /// Specifies that the end of the `from` lane connects to the start of the `to` lane.
    pub fn add_lane_connection(&mut self, from: LaneId, to: LaneId) {
        self.lanes[from].add_lane_out(to);
        self.lanes[to].add_lane_in(from);
    }

    /// Specifies that `to` is alongside `from`, on the given side of `from`'s design line.
    /// Only `from` learns about the adjacency.
    pub fn add_adjacency(&mut self, from: LaneId, side: LateralDirection, to: LaneId, legal: bool) {
        assert!(!side.is_none(), "An adjacent lane must be on the left or right");
        assert!(self.lanes.contains_key(to), "Adjacent lane must exist");
        self.lanes[from].add_adjacent_lane(to, side, legal);
        if self.lanes[from].adjacent_lanes(side, false).nth(1).is_some() {
            self.ambiguous_adjacency = true;
        }
    }

    /// Returns true if some lane has more than one lane alongside it on one side,
    /// which makes lane structures built over it ill-formed.
    pub fn has_ambiguous_adjacency(&self) -> bool {
        self.ambiguous_adjacency
    }

    /// Specifies that two lanes are alongside each other in both directions.
    pub fn add_lane_pair(&mut self, left: LaneId, right: LaneId, legal: bool) {
        self.add_adjacency(left, LateralDirection::Right, right, legal);
        self.add_adjacency(right, LateralDirection::Left, left, legal);
    }

    /// Adds a static object to a lane.
    pub fn add_object(&mut self, lane: LaneId, pos: f64, kind: ObjectKind) -> ObjectId {
        let id = self
            .objects
            .insert_with_key(|id| LaneObject::new(id, lane, pos, kind));
        self.lanes[lane].insert_object(&self.objects, id);
        id
    }

    /// Adds a vehicle to a lane, with its mid-point at `pos` along the design line.
    pub fn add_vehicle(
        &mut self,
        attributes: &VehicleAttributes,
        lane: LaneId,
        pos: f64,
        direction: Direction,
    ) -> VehicleId {
        let vehicle_id = self
            .vehicles
            .insert_with_key(|id| Vehicle::new(id, attributes, lane, pos, direction));
        self.lanes[lane].insert_vehicle(&self.vehicles, vehicle_id);
        vehicle_id
    }

    /// Moves a vehicle, keeping each lane's vehicles ordered.
    pub fn move_vehicle(&mut self, id: VehicleId, lane: LaneId, pos: f64, direction: Direction) {
        if let Some(vehicle) = self.vehicles.get_mut(id) {
            let old_lane = vehicle.lane_id();
            vehicle.set_location(lane, pos, direction);
            self.lanes[old_lane].remove_vehicle(id);
            self.lanes[lane].insert_vehicle(&self.vehicles, id);
        }
    }

    /// Removes a vehicle from the network.
    pub fn remove_vehicle(&mut self, id: VehicleId) {
        if let Some(vehicle) = self.vehicles.remove(id) {
            self.lanes[vehicle.lane_id()].remove_vehicle(id);
        }
    }

    /// Gets a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Gets a link.
    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    /// Gets a lane.
    pub fn lane(&self, id: LaneId) -> Option<&Lane> {
        self.lanes.get(id)
    }

    /// Gets a vehicle.
    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    /// Gets a static object.
    pub fn object(&self, id: ObjectId) -> Option<&LaneObject> {
        self.objects.get(id)
    }

    /// Returns an iterator over all the links in the network.
    pub fn iter_links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Gets the length of a link, as the length of its longest lane.
    pub fn link_length(&self, id: LinkId) -> f64 {
        self.links.get(id).map_or(0.0, |link| {
            link.lanes
                .iter()
                .map(|lane| self.lanes[*lane].length())
                .fold(0.0, f64::max)
        })
    }

    /// Gets the nodes a lane leads from and to when driven in direction `dir`.
    pub fn link_nodes(&self, lane: LaneId, dir: Direction) -> Option<(NodeId, NodeId)> {
        let link = self.links.get(self.lanes.get(lane)?.link_id())?;
        Some(match dir {
            Direction::Plus => (link.start, link.end),
            Direction::Minus => (link.end, link.start),
        })
    }

    /// Gets the lanes an agent can continue onto from the end of a lane.
    pub fn downstream_lanes(
        &self,
        lane: LaneId,
        dir: Direction,
        agent_type: AgentType,
    ) -> SmallVec<[(LaneId, Direction); 2]> {
        self.lanes
            .get(lane)
            .map(|lane| match dir {
                Direction::Plus => lane.lanes_out(),
                Direction::Minus => lane.lanes_in(),
            })
            .unwrap_or_default()
            .iter()
            .filter(|id| self.lanes[**id].allows(agent_type, dir))
            .map(|id| (*id, dir))
            .collect()
    }

    /// Gets the lanes an agent can arrive from at the start of a lane.
    pub fn upstream_lanes(
        &self,
        lane: LaneId,
        dir: Direction,
        agent_type: AgentType,
    ) -> SmallVec<[(LaneId, Direction); 2]> {
        self.lanes
            .get(lane)
            .map(|lane| match dir {
                Direction::Plus => lane.lanes_in(),
                Direction::Minus => lane.lanes_out(),
            })
            .unwrap_or_default()
            .iter()
            .filter(|id| self.lanes[**id].allows(agent_type, dir))
            .map(|id| (*id, dir))
            .collect()
    }

    /// Gets the lanes an agent driving in direction `dir` could physically move onto
    /// on the given side. A well-formed network yields at most one.
    pub fn adjacent_lanes_physical(
        &self,
        lane: LaneId,
        lat: LateralDirection,
        agent_type: AgentType,
        dir: Direction,
    ) -> SmallVec<[LaneId; 1]> {
        self.adjacent_lanes(lane, lat, agent_type, dir, false)
    }

    /// Gets the lanes an agent driving in direction `dir` may legally move onto on the given side.
    pub fn adjacent_lanes_legal(
        &self,
        lane: LaneId,
        lat: LateralDirection,
        agent_type: AgentType,
        dir: Direction,
    ) -> SmallVec<[LaneId; 1]> {
        self.adjacent_lanes(lane, lat, agent_type, dir, true)
    }

    fn adjacent_lanes(
        &self,
        lane: LaneId,
        lat: LateralDirection,
        agent_type: AgentType,
        dir: Direction,
        legal_only: bool,
    ) -> SmallVec<[LaneId; 1]> {
        let Some(lane) = self.lanes.get(lane) else {
            return SmallVec::new();
        };
        lane.adjacent_lanes(lat.on_design_line(dir), legal_only)
            .filter(|id| {
                self.lanes
                    .get(*id)
                    .map_or(false, |adj| adj.allows(agent_type, dir))
            })
            .collect()
    }

    /// Picks the lane to continue onto from the end of a lane: the first downstream lane
    /// whose link follows the route, or the first downstream lane if there is no route.
    pub fn next_lane_for_route(
        &self,
        lane: LaneId,
        dir: Direction,
        agent_type: AgentType,
        route: Option<&Route>,
    ) -> Option<(LaneId, Direction)> {
        let nexts = self.downstream_lanes(lane, dir, agent_type);
        match route {
            None => nexts.first().copied(),
            Some(route) => nexts.into_iter().find(|(id, dir)| {
                self.link_nodes(*id, *dir)
                    .map_or(false, |(from, to)| route.follows(from, to))
            }),
        }
    }

    /// Gets the number of vehicles on a lane.
    pub fn number_of_vehicles(&self, lane: LaneId) -> usize {
        self.lanes.get(lane).map_or(0, |lane| lane.vehicles().len())
    }

    /// Gets the vehicle at an index of a lane's ordered vehicles.
    pub fn vehicle_at(&self, lane: LaneId, idx: usize) -> Option<&Vehicle> {
        let id = *self.lanes.get(lane)?.vehicles().get(idx)?;
        self.vehicles.get(id)
    }

    /// Gets the index of a vehicle among a lane's ordered vehicles.
    pub fn index_of_vehicle(&self, lane: LaneId, id: VehicleId) -> Option<usize> {
        self.lanes.get(lane)?.vehicles().iter().position(|v| *v == id)
    }

    /// Gets the index of the most upstream vehicle on a lane when driving in direction `dir`.
    pub fn first_vehicle(&self, lane: LaneId, dir: Direction) -> Option<usize> {
        let count = self.number_of_vehicles(lane);
        match dir {
            Direction::Plus => (count > 0).then_some(0),
            Direction::Minus => count.checked_sub(1),
        }
    }

    /// Gets the index of the most downstream vehicle on a lane when driving in direction `dir`.
    pub fn last_vehicle(&self, lane: LaneId, dir: Direction) -> Option<usize> {
        self.first_vehicle(lane, dir.flip())
    }

    /// Gets the index of the nearest vehicle whose front is at or beyond `along`,
    /// measured from the start of the lane when driving in direction `dir`.
    /// A vehicle that overlaps `along` counts as ahead.
    pub fn vehicle_ahead(&self, lane: LaneId, along: f64, dir: Direction) -> Option<usize> {
        let lane = self.lanes.get(lane)?;
        let vehs = lane.vehicles();
        match dir {
            Direction::Plus => {
                let idx = vehs.partition_point(|id| self.vehicles[*id].extent().max < along);
                (idx < vehs.len()).then_some(idx)
            }
            Direction::Minus => {
                let pos = lane.length() - along;
                let idx = vehs.partition_point(|id| self.vehicles[*id].extent().min <= pos);
                idx.checked_sub(1)
            }
        }
    }

    /// Gets the index of the nearest vehicle whose rear lies before `along`,
    /// measured from the start of the lane when driving in direction `dir`.
    pub fn vehicle_behind(&self, lane: LaneId, along: f64, dir: Direction) -> Option<usize> {
        let lane = self.lanes.get(lane)?;
        let vehs = lane.vehicles();
        match dir {
            Direction::Plus => {
                let idx = vehs.partition_point(|id| self.vehicles[*id].extent().min < along);
                idx.checked_sub(1)
            }
            Direction::Minus => {
                let pos = lane.length() - along;
                let idx = vehs.partition_point(|id| self.vehicles[*id].extent().max <= pos);
                (idx < vehs.len()).then_some(idx)
            }
        }
    }

    /// Steps from one vehicle index to the next one downstream (or upstream) in direction `dir`.
    pub fn next_vehicle(
        &self,
        lane: LaneId,
        idx: usize,
        dir: Direction,
        downstream: bool,
    ) -> Option<usize> {
        if dir.is_plus() == downstream {
            let next = idx + 1;
            (next < self.number_of_vehicles(lane)).then_some(next)
        } else {
            idx.checked_sub(1)
        }
    }
}
