//! The rolling lane structure of a single agent.
//!
//! A structure holds one [LaneRecord] per traversal of a lane near the agent.
//! Every record has a start distance relative to the agent: negative upstream,
//! positive downstream, and the agent itself sits at distance zero on the root
//! record. As the agent moves, [LaneStructure::update] either shifts the
//! existing records or rebuilds them, then grows the structure up to the
//! configured horizons.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use log::{trace, warn};
use slotmap::{SecondaryMap, SlotMap};
use smallvec::SmallVec;

pub use history::History;
pub use record::{LaneRecord, RecordLink};

use crate::debug::debug_structure;
use crate::{
    AgentType, Direction, LaneId, LateralDirection, Network, PerceptionError, RecordId,
    RelativeLane, Route, StructureConfig, Vehicle,
};

mod build;
mod history;
mod query;
mod record;
mod shift;

/// The state of an agent that its lane structure is updated from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentState {
    /// The lane the agent is registered on.
    pub lane: LaneId,
    /// The position of the agent's reference point along the lane's design line, in m.
    pub position: f64,
    /// The direction the agent travels the lane in.
    pub direction: Direction,
    pub agent_type: AgentType,
    /// Whether the agent is part-way through a lane change.
    pub deviative: bool,
}

impl AgentState {
    /// Gets the state of a vehicle in the network.
    pub fn of(vehicle: &Vehicle) -> Self {
        Self {
            lane: vehicle.lane_id(),
            position: vehicle.pos_mid(),
            direction: vehicle.direction(),
            agent_type: vehicle.agent_type(),
            deviative: false,
        }
    }

    /// Marks the agent as being part-way through a lane change.
    pub fn deviative(mut self, deviative: bool) -> Self {
        self.deviative = deviative;
        self
    }
}

/// The root of a lane structure as it was after an update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RootState {
    /// The root record, which resolves only while it is still part of the structure.
    pub record: RecordId,
    pub lane: LaneId,
    pub direction: Direction,
    /// The start distance of the root record at the time, in m.
    pub start_distance: f64,
}

/// The lanes around an agent, measured relative to the agent.
#[derive(Clone, Debug)]
pub struct LaneStructure {
    config: StructureConfig,
    graph: Graph,
    history: History<RootState>,
}

impl LaneStructure {
    /// Creates an empty lane structure. It must be updated before it can be queried.
    pub fn new(config: StructureConfig) -> Result<Self, PerceptionError> {
        config.validate()?;
        Ok(Self {
            config,
            graph: Graph::default(),
            history: History::new(),
        })
    }

    /// Gets the horizons of the structure.
    pub fn config(&self) -> &StructureConfig {
        &self.config
    }

    /// Replaces the horizons of the structure. The structure is rebuilt at the next update.
    pub fn set_config(&mut self, config: StructureConfig) -> Result<(), PerceptionError> {
        config.validate()?;
        self.config = config;
        self.graph.force_rebuild = true;
        Ok(())
    }

    /// Signals that the agent changed lanes outside of the normal flow of updates,
    /// so that the structure is rebuilt at the next update.
    pub fn notify_lane_change(&mut self) {
        self.graph.force_rebuild = true;
    }

    /// Brings the structure up to date with the agent's position at time `time`.
    ///
    /// The update either completes or leaves the structure as it was.
    pub fn update(
        &mut self,
        network: &Network,
        agent: &AgentState,
        route: Option<&Route>,
        time: f64,
    ) -> Result<(), PerceptionError> {
        let lane = network
            .lane(agent.lane)
            .ok_or(PerceptionError::UnknownLane(agent.lane))?;
        if !(0.0..=lane.length()).contains(&agent.position) {
            return Err(PerceptionError::InvalidParameter(format!(
                "position {} lies outside a lane of length {}",
                agent.position,
                lane.length()
            )));
        }
        if !time.is_finite() || self.history.last_time().map_or(false, |last| time < last) {
            return Err(PerceptionError::InvalidParameter(format!(
                "time {} precedes the last update",
                time
            )));
        }
        let frac_pos = agent.direction.along(agent.position, lane.length()) / lane.length();

        let ctx = Context {
            network,
            agent_type: agent.agent_type,
            route,
            config: &self.config,
        };
        // only an ambiguous adjacency can fail an update part-way on a valid network
        let snapshot = network.has_ambiguous_adjacency().then(|| self.graph.clone());
        if let Err(err) = self.graph.update(&ctx, agent, frac_pos) {
            match snapshot {
                Some(snapshot) => {
                    warn!("Lane structure update failed, restoring previous state: {}", err);
                    self.graph = snapshot;
                }
                None => {
                    warn!("Lane structure update failed, discarding the structure: {}", err);
                    self.graph.clear();
                }
            }
            return Err(err);
        }

        let root = self.graph.root.ok_or(PerceptionError::NotInitialized)?;
        let start_distance = self.graph.start_distance(root)?;
        self.history.push(
            time,
            RootState {
                record: root,
                lane: agent.lane,
                direction: agent.direction,
                start_distance,
            },
        );
        if let Some(horizon) = self.config.history_horizon {
            self.history.prune_before(time - horizon);
        }
        debug_structure(self);
        Ok(())
    }

    /// Drops roots that stopped being current before the given time.
    pub fn prune_history(&mut self, before: f64) {
        self.history.prune_before(before);
    }
}

impl fmt::Display for LaneStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.graph.root {
            None => write!(f, "LaneStructure(uninitialized)"),
            Some(root) => write!(
                f,
                "LaneStructure(root: {:?}, records: {}, lanes: {}, upstream edge: {}, downstream edge: {})",
                root,
                self.graph.records.len(),
                self.graph.relative_lane_map.len(),
                self.graph.upstream_edge.len(),
                self.graph.downstream_edge.len(),
            ),
        }
    }
}

/// What an update is performed against.
struct Context<'a> {
    network: &'a Network,
    agent_type: AgentType,
    route: Option<&'a Route>,
    config: &'a StructureConfig,
}

impl Context<'_> {
    /// Returns true if traversing the lane in direction `dir` follows the route.
    /// Without a route every lane does.
    fn lane_on_route(&self, lane: LaneId, dir: Direction) -> bool {
        match self.route {
            None => true,
            Some(route) => self
                .network
                .link_nodes(lane, dir)
                .map_or(false, |(from, to)| route.follows(from, to)),
        }
    }
}

/// The records of a lane structure and their bookkeeping.
#[derive(Clone, Debug, Default)]
struct Graph {
    records: SlotMap<RecordId, LaneRecord>,
    root: Option<RecordId>,
    /// The agent's position along the root record, as a fraction of its length.
    frac_pos: f64,
    /// Advances whenever memoised start distances may be stale.
    generation: u64,
    cross_section: BTreeMap<RelativeLane, RecordId>,
    first_records: BTreeMap<RelativeLane, RecordId>,
    relative_lanes: SecondaryMap<RecordId, RelativeLane>,
    relative_lane_map: BTreeMap<RelativeLane, BTreeSet<RecordId>>,
    upstream_edge: BTreeSet<RecordId>,
    downstream_edge: BTreeSet<RecordId>,
    /// Lanes not to add again during the current expansion.
    ignore: HashSet<LaneId>,
    previous_route: Option<Route>,
    previously_deviative: bool,
    force_rebuild: bool,
}

/// Which edge of the structure an expansion grows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Edge {
    Upstream,
    Downstream,
}

impl Graph {
    fn update(
        &mut self,
        ctx: &Context,
        agent: &AgentState,
        frac_pos: f64,
    ) -> Result<(), PerceptionError> {
        let reason = if self.root.is_none() {
            Some("no root")
        } else if self.force_rebuild {
            Some("rebuild requested")
        } else if self.previous_route.as_ref() != ctx.route {
            Some("route changed")
        } else if agent.deviative != self.previously_deviative {
            Some("deviative state changed")
        } else {
            None
        };
        match reason {
            Some(reason) => self.rebuild(ctx, agent.lane, agent.direction, frac_pos, reason)?,
            None => {
                if !self.shift(ctx, agent.lane, agent.direction, frac_pos)? {
                    self.rebuild(
                        ctx,
                        agent.lane,
                        agent.direction,
                        frac_pos,
                        "new lane not found in structure",
                    )?;
                }
            }
        }
        self.force_rebuild = false;
        if self.previous_route.as_ref() != ctx.route {
            self.previous_route = ctx.route.cloned();
        }
        self.previously_deviative = agent.deviative;
        self.expand_downstream_edge(ctx)?;
        self.derive_first_records(ctx)
    }

    fn record(&self, id: RecordId) -> Result<&LaneRecord, PerceptionError> {
        self.records
            .get(id)
            .ok_or(PerceptionError::UnknownRecord(id))
    }

    fn relative_lane(&self, id: RecordId) -> RelativeLane {
        self.relative_lanes.get(id).copied().unwrap_or_default()
    }

    /// Resolves the start distance of a record through its chain of sources,
    /// memoising every distance computed on the way.
    fn start_distance(&self, id: RecordId) -> Result<f64, PerceptionError> {
        if self.root.is_none() {
            return Err(PerceptionError::NotInitialized);
        }
        let mut chain: SmallVec<[RecordId; 16]> = SmallVec::new();
        let mut current = id;
        let base = loop {
            let rec = self.record(current)?;
            if let Some((generation, start)) = rec.start_distance.get() {
                if generation == self.generation {
                    break start;
                }
            }
            match (rec.source_link, rec.source) {
                (Some(RecordLink::Cross), _) => {
                    let start =
                        RecordLink::Cross.start_distance(0.0, 0.0, rec.length(), self.frac_pos);
                    rec.start_distance.set(Some((self.generation, start)));
                    break start;
                }
                (Some(_), Some(source)) => {
                    if chain.len() > self.records.len() {
                        return Err(PerceptionError::Inconsistent(
                            "start distance sources form a cycle",
                        ));
                    }
                    chain.push(current);
                    current = source;
                }
                _ => {
                    return Err(PerceptionError::Inconsistent(
                        "record has no start distance source",
                    ))
                }
            }
        };

        let mut start = base;
        let mut source = current;
        for &id in chain.iter().rev() {
            let rec = &self.records[id];
            let link = rec.source_link.ok_or(PerceptionError::Inconsistent(
                "record has no start distance source",
            ))?;
            start = link.start_distance(
                start,
                self.records[source].length(),
                rec.length(),
                self.frac_pos,
            );
            rec.start_distance.set(Some((self.generation, start)));
            source = id;
        }
        Ok(start)
    }

    /// Removes every record, keeping what is remembered between updates.
    fn clear(&mut self) {
        self.records.clear();
        self.root = None;
        self.cross_section.clear();
        self.first_records.clear();
        self.relative_lanes.clear();
        self.relative_lane_map.clear();
        self.upstream_edge.clear();
        self.downstream_edge.clear();
        self.ignore.clear();
        self.generation += 1;
    }

    fn construct_record(
        &mut self,
        ctx: &Context,
        lane: LaneId,
        dir: Direction,
        source: Option<RecordId>,
        link: RecordLink,
        relative_lane: RelativeLane,
    ) -> Result<RecordId, PerceptionError> {
        let network_lane = ctx
            .network
            .lane(lane)
            .ok_or(PerceptionError::UnknownLane(lane))?;
        let nodes = ctx
            .network
            .link_nodes(lane, dir)
            .ok_or(PerceptionError::UnknownLane(lane))?;
        let (link_id, length) = (network_lane.link_id(), network_lane.length());
        let id = self
            .records
            .insert_with_key(|id| LaneRecord::new(id, lane, dir, link_id, nodes, length));
        self.set_source(id, source, link);
        self.relative_lanes.insert(id, relative_lane);
        self.relative_lane_map
            .entry(relative_lane)
            .or_default()
            .insert(id);
        Ok(id)
    }

    /// Changes the record a start distance is derived from.
    /// Cross-section records are derived from the root position alone.
    fn set_source(&mut self, id: RecordId, source: Option<RecordId>, link: RecordLink) {
        let source = if link == RecordLink::Cross { None } else { source };
        let rec = &mut self.records[id];
        let old = rec.source;
        let resourced = rec.source_link.is_some();
        rec.source = source;
        rec.source_link = Some(link);
        rec.start_distance.set(None);
        if let Some(old) = old.and_then(|old| self.records.get_mut(old)) {
            old.dependents.retain(|dep| *dep != id);
        }
        if let Some(src) = source.and_then(|src| self.records.get_mut(src)) {
            src.dependents.push(id);
        }
        if resourced {
            // dependents may hold distances derived from the old source
            self.generation += 1;
        }
    }

    /// Links `from` to `to` longitudinally, unless either is cut off where they would meet.
    fn link_longitudinal(&mut self, from: RecordId, to: RecordId) -> Result<(), PerceptionError> {
        if self.records[from].cut_off_end.is_some() || self.records[to].cut_off_start.is_some() {
            trace!("Not linking {:?} to {:?}, which is cut off", from, to);
            return Ok(());
        }
        self.records[from].add_next(to)?;
        self.records[to].add_prev(from)
    }

    /// Unlinks a record from all records upstream of it.
    fn clear_prev(&mut self, id: RecordId) {
        let prev = std::mem::take(&mut self.records[id].prev);
        for p in prev {
            if let Some(rec) = self.records.get_mut(p) {
                rec.next.retain(|n| *n != id);
            }
        }
    }

    fn lateral(&self, id: RecordId, lat: LateralDirection) -> Option<RecordId> {
        let rec = self.records.get(id)?;
        match lat {
            LateralDirection::Left => rec.left,
            LateralDirection::Right => rec.right,
            LateralDirection::None => None,
        }
    }

    fn set_lateral(&mut self, ctx: &Context, id: RecordId, lat: LateralDirection, other: RecordId) {
        let (lane, dir) = (self.records[id].lane_id(), self.records[id].direction());
        let other_lane = self.records[other].lane_id();
        let legal = ctx
            .network
            .adjacent_lanes_legal(lane, lat, ctx.agent_type, dir)
            .contains(&other_lane);
        let rec = &mut self.records[id];
        match lat {
            LateralDirection::Left => {
                rec.left = Some(other);
                rec.legal_left = legal;
            }
            LateralDirection::Right => {
                rec.right = Some(other);
                rec.legal_right = legal;
            }
            LateralDirection::None => {}
        }
    }

    /// Places `b` alongside `a` on side `lat`, and `a` alongside `b` when the
    /// adjacency is confirmed from `b`'s lane.
    fn connect_pair(&mut self, ctx: &Context, a: RecordId, lat: LateralDirection, b: RecordId) {
        let opposite = lat.flip();
        let taken = |id, side, other| self.lateral(id, side).map_or(false, |x| x != other);
        if taken(a, lat, b) || taken(b, opposite, a) {
            return;
        }
        self.set_lateral(ctx, a, lat, b);
        let (b_lane, b_dir) = (self.records[b].lane_id(), self.records[b].direction());
        let a_lane = self.records[a].lane_id();
        if ctx
            .network
            .adjacent_lanes_physical(b_lane, opposite, ctx.agent_type, b_dir)
            .contains(&a_lane)
        {
            self.set_lateral(ctx, b, opposite, a);
        }
    }

    /// Connects a record laterally to the records of a set that claim to be alongside it.
    fn connect_laterally(&mut self, ctx: &Context, id: RecordId, set: &[RecordId]) {
        let lane = self.records[id].lane_id();
        for &other in set {
            if other == id || !self.records.contains_key(other) {
                continue;
            }
            let (other_lane, other_dir) =
                (self.records[other].lane_id(), self.records[other].direction());
            for lat in LateralDirection::SIDES {
                if self.lateral(other, lat).is_none()
                    && ctx
                        .network
                        .adjacent_lanes_physical(other_lane, lat, ctx.agent_type, other_dir)
                        .contains(&lane)
                {
                    self.connect_pair(ctx, other, lat, id);
                }
            }
        }
    }

    fn cut_start(&mut self, id: RecordId, cut_off: f64) -> Result<(), PerceptionError> {
        let rec = &mut self.records[id];
        if !rec.prev.is_empty() {
            trace!("Not cutting off {:?}, which has upstream records", id);
            return Ok(());
        }
        rec.set_cut_off_start(cut_off)
    }

    fn cut_end(&mut self, id: RecordId, cut_off: f64) -> Result<(), PerceptionError> {
        let rec = &mut self.records[id];
        if !rec.next.is_empty() {
            trace!("Not cutting off {:?}, which has downstream records", id);
            return Ok(());
        }
        rec.set_cut_off_end(cut_off)
    }

    /// Removes a record, unlinking it from its neighbours and re-anchoring the
    /// records whose start distance was derived from it.
    fn remove_record(&mut self, id: RecordId) {
        let Some(rec) = self.records.remove(id) else {
            return;
        };
        for n in &rec.next {
            if let Some(next) = self.records.get_mut(*n) {
                next.prev.retain(|p| *p != id);
            }
        }
        for p in &rec.prev {
            if let Some(prev) = self.records.get_mut(*p) {
                prev.next.retain(|n| *n != id);
            }
        }
        for other in self.records.values_mut() {
            if other.left == Some(id) {
                other.left = None;
                other.legal_left = false;
            }
            if other.right == Some(id) {
                other.right = None;
                other.legal_right = false;
            }
        }
        if let Some(src) = rec.source.and_then(|src| self.records.get_mut(src)) {
            src.dependents.retain(|dep| *dep != id);
        }
        if let Some(lane) = self.relative_lanes.remove(id) {
            if let Some(set) = self.relative_lane_map.get_mut(&lane) {
                set.remove(&id);
                if set.is_empty() {
                    self.relative_lane_map.remove(&lane);
                }
            }
        }
        self.upstream_edge.remove(&id);
        self.downstream_edge.remove(&id);
        self.cross_section.retain(|_, r| *r != id);
        self.first_records.retain(|_, r| *r != id);
        if self.root == Some(id) {
            self.root = None;
        }
        self.generation += 1;

        for dep in rec.dependents {
            if self.records.contains_key(dep) {
                self.reanchor(dep);
            }
        }
    }

    /// Derives a record's start distance from a remaining neighbour, or removes it
    /// when nothing is left to place it by.
    fn reanchor(&mut self, id: RecordId) {
        let rec = &self.records[id];
        let candidates = rec
            .next
            .iter()
            .map(|n| (*n, RecordLink::Up))
            .chain(rec.prev.iter().map(|p| (*p, RecordLink::Down)))
            .chain(rec.left.map(|l| (l, RecordLink::LateralEnd)))
            .chain(rec.right.map(|r| (r, RecordLink::LateralEnd)))
            .collect::<SmallVec<[_; 6]>>();
        for (candidate, link) in candidates {
            if !self.depends_on(candidate, id) {
                self.set_source(id, Some(candidate), link);
                return;
            }
        }
        self.remove_record(id);
    }

    /// Returns true if the start distance of `id` is derived from `source`.
    fn depends_on(&self, id: RecordId, source: RecordId) -> bool {
        let mut current = Some(id);
        let mut steps = 0;
        while let Some(cur) = current {
            if cur == source {
                return true;
            }
            let Some(rec) = self.records.get(cur) else {
                return false;
            };
            if rec.source_link == Some(RecordLink::Cross) {
                return false;
            }
            steps += 1;
            if steps > self.records.len() {
                return true;
            }
            current = rec.source;
        }
        false
    }

    /// Removes a record along with the downstream records only reachable through it.
    fn remove_subtree(&mut self, id: RecordId, protected: &HashSet<RecordId>) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if !self.records.contains_key(id) || self.root == Some(id) || protected.contains(&id)
            {
                continue;
            }
            let next = self.records[id].next.clone();
            self.remove_record(id);
            stack.extend(next.into_iter().filter(|n| {
                self.records
                    .get(*n)
                    .map_or(false, |rec| rec.prev.is_empty())
            }));
        }
    }
}

#[cfg(test)]
pub(super) mod test {
    use super::*;
    use crate::{LaneAttributes, NodeId};
    use assert_approx_eq::assert_approx_eq;

    /// A road of consecutive links with the same number of lanes, numbered left to right.
    pub(crate) struct Road {
        pub net: Network,
        pub nodes: Vec<NodeId>,
        /// Lanes by link, then left to right.
        pub lanes: Vec<Vec<LaneId>>,
    }

    pub(crate) fn road(num_links: usize, num_lanes: usize, length: f64) -> Road {
        let mut net = Network::new();
        let nodes: Vec<_> = (0..=num_links)
            .map(|i| net.add_node(&format!("n{}", i)))
            .collect();
        let attribs = LaneAttributes {
            length,
            ..Default::default()
        };
        let mut lanes: Vec<Vec<LaneId>> = vec![];
        for i in 0..num_links {
            let link = net.add_link(nodes[i], nodes[i + 1]);
            let link_lanes: Vec<_> = (0..num_lanes).map(|_| net.add_lane(link, &attribs)).collect();
            for pair in link_lanes.windows(2) {
                net.add_lane_pair(pair[0], pair[1], true);
            }
            if let Some(prev) = lanes.last() {
                for (a, b) in prev.iter().zip(&link_lanes) {
                    net.add_lane_connection(*a, *b);
                }
            }
            lanes.push(link_lanes);
        }
        Road { net, nodes, lanes }
    }

    pub(crate) fn agent(lane: LaneId, position: f64) -> AgentState {
        AgentState {
            lane,
            position,
            direction: Direction::Plus,
            agent_type: AgentType::CAR,
            deviative: false,
        }
    }

    #[test]
    fn queries_need_an_update() {
        let structure = LaneStructure::new(StructureConfig::default()).unwrap();
        assert_eq!(
            structure.root_record().err(),
            Some(PerceptionError::NotInitialized)
        );
        assert_eq!(structure.to_string(), "LaneStructure(uninitialized)");
    }

    #[test]
    fn invalid_positions_are_rejected() {
        let road = road(1, 1, 100.0);
        let mut structure = LaneStructure::new(StructureConfig::default()).unwrap();
        let lane = road.lanes[0][0];
        let result = structure.update(&road.net, &agent(lane, 120.0), None, 0.0);
        assert!(matches!(result, Err(PerceptionError::InvalidParameter(_))));
        structure
            .update(&road.net, &agent(lane, 10.0), None, 1.0)
            .unwrap();
        let result = structure.update(&road.net, &agent(lane, 20.0), None, 0.5);
        assert!(matches!(result, Err(PerceptionError::InvalidParameter(_))));
    }

    #[test]
    fn history_is_pruned() {
        let road = road(2, 1, 100.0);
        let lane = road.lanes[0][0];
        let mut structure = LaneStructure::new(StructureConfig {
            history_horizon: Some(1.0),
            ..Default::default()
        })
        .unwrap();
        for step in 0..4 {
            let pos = 10.0 + 10.0 * step as f64;
            structure
                .update(&road.net, &agent(lane, pos), None, step as f64)
                .unwrap();
        }
        assert_eq!(structure.root_history().len(), 2);
        assert_approx_eq!(structure.root_history().at(2.5).unwrap().start_distance, -30.0);
        structure.prune_history(3.0);
        assert_eq!(structure.root_history().len(), 1);
        assert!(structure.root_record_at(1.0).unwrap().is_none());
    }

    #[test]
    fn new_horizons_apply_at_the_next_update() {
        let road = road(4, 1, 100.0);
        let lane = road.lanes[0][0];
        let mut structure = LaneStructure::new(StructureConfig::default()).unwrap();
        structure
            .update(&road.net, &agent(lane, 50.0), None, 0.0)
            .unwrap();
        let before = structure.records().count();
        assert_eq!(before, 4);

        let bad = StructureConfig {
            down: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            structure.set_config(bad),
            Err(PerceptionError::InvalidParameter(_))
        ));
        assert_approx_eq!(structure.config().down, 295.0);

        structure
            .set_config(StructureConfig {
                down: 100.0,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(structure.records().count(), before);
        structure
            .update(&road.net, &agent(lane, 50.0), None, 0.1)
            .unwrap();
        assert!(structure.records().count() < before);
    }

    #[test]
    fn records_know_how_they_were_found() {
        let road = road(3, 1, 100.0);
        let lanes: Vec<_> = road.lanes.iter().map(|l| l[0]).collect();
        let mut structure = LaneStructure::new(StructureConfig::default()).unwrap();
        structure
            .update(&road.net, &agent(lanes[1], 50.0), None, 0.0)
            .unwrap();
        let find = |lane| structure.records().find(|r| r.lane_id() == lane).unwrap();
        assert!(structure.root_record().unwrap().is_downstream_branch());
        assert!(!find(lanes[0]).is_downstream_branch());
        assert!(find(lanes[2]).is_downstream_branch());
    }

    #[test]
    fn failed_updates_keep_the_last_structure() {
        let mut road = road(1, 2, 100.0);
        let lane = road.lanes[0][1];
        let mut structure = LaneStructure::new(StructureConfig::default()).unwrap();
        structure
            .update(&road.net, &agent(lane, 10.0), None, 0.0)
            .unwrap();
        assert!(!road.net.has_ambiguous_adjacency());
        let root = structure.root_record().unwrap().id();
        let records = structure.records().map(|r| r.id()).collect::<Vec<_>>();

        let extra = road.net.add_link(road.nodes[0], road.nodes[1]);
        let other = road.net.add_lane(
            extra,
            &LaneAttributes {
                length: 100.0,
                ..Default::default()
            },
        );
        road.net
            .add_adjacency(lane, LateralDirection::Left, other, true);
        assert!(road.net.has_ambiguous_adjacency());
        structure.notify_lane_change();
        let result = structure.update(&road.net, &agent(lane, 20.0), None, 1.0);
        assert!(matches!(result, Err(PerceptionError::IllFormedNetwork { .. })));
        assert_eq!(structure.root_record().unwrap().id(), root);
        assert_eq!(structure.records().map(|r| r.id()).collect::<Vec<_>>(), records);
        assert_approx_eq!(structure.start_distance(root).unwrap(), -10.0);
        assert_eq!(structure.root_history().len(), 1);
    }

    #[test]
    fn start_distances_follow_the_root() {
        let road = road(4, 1, 100.0);
        let mut structure = LaneStructure::new(StructureConfig::default()).unwrap();
        let lanes: Vec<_> = road.lanes.iter().map(|l| l[0]).collect();
        structure
            .update(&road.net, &agent(lanes[1], 25.0), None, 0.0)
            .unwrap();
        let start_of = |structure: &LaneStructure, lane| {
            let rec = structure.records().find(|r| r.lane_id() == lane).unwrap();
            structure.start_distance(rec.id()).unwrap()
        };
        assert_approx_eq!(start_of(&structure, lanes[0]), -125.0);
        assert_approx_eq!(start_of(&structure, lanes[1]), -25.0);
        assert_approx_eq!(start_of(&structure, lanes[3]), 175.0);

        structure
            .update(&road.net, &agent(lanes[1], 75.0), None, 0.1)
            .unwrap();
        assert_approx_eq!(start_of(&structure, lanes[0]), -175.0);
        assert_approx_eq!(start_of(&structure, lanes[3]), 125.0);
    }

    #[test]
    fn removal_reanchors_dependents() {
        let road = road(3, 1, 100.0);
        let mut structure = LaneStructure::new(StructureConfig::default()).unwrap();
        let lanes: Vec<_> = road.lanes.iter().map(|l| l[0]).collect();
        structure
            .update(&road.net, &agent(lanes[0], 50.0), None, 0.0)
            .unwrap();
        let graph = &mut structure.graph;
        let find = |graph: &Graph, lane| {
            graph
                .records
                .values()
                .find(|r| r.lane_id() == lane)
                .unwrap()
                .id()
        };
        let (middle, last) = (find(graph, lanes[1]), find(graph, lanes[2]));
        assert_approx_eq!(graph.start_distance(last).unwrap(), 150.0);

        // the last record is derived from the middle one; pretend it is also alongside
        // a record that survives
        let root = graph.root.unwrap();
        graph.records[last].left = Some(root);
        graph.remove_record(middle);
        assert!(graph.records.contains_key(last));
        assert_eq!(
            graph.records[last].start_distance_source(),
            Some((Some(root), RecordLink::LateralEnd))
        );
        assert!(graph.records[root].next.is_empty());
        assert_approx_eq!(graph.start_distance(last).unwrap(), -50.0);
    }

    #[test]
    fn removal_cascades_without_anchor() {
        let road = road(3, 1, 100.0);
        let mut structure = LaneStructure::new(StructureConfig::default()).unwrap();
        let lanes: Vec<_> = road.lanes.iter().map(|l| l[0]).collect();
        structure
            .update(&road.net, &agent(lanes[0], 50.0), None, 0.0)
            .unwrap();
        let graph = &mut structure.graph;
        let middle = graph
            .records
            .values()
            .find(|r| r.lane_id() == lanes[1])
            .unwrap()
            .id();
        graph.remove_record(middle);
        assert_eq!(graph.records.len(), 1);
        assert!(graph.downstream_edge.is_empty());
    }
}
