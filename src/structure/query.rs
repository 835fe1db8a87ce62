use std::collections::{BTreeMap, BTreeSet, HashSet};

use itertools::Itertools;

use super::{History, LaneRecord, LaneStructure, RootState};
use crate::perception::{
    DownstreamNeighbors, LaneObjects, MultiLaneIter, PerceivedObject, PerceptionIter,
    UpstreamNeighbors,
};
use crate::{
    LateralDirection, Network, PerceptionError, Perceivable, RecordId, RelativeLane,
    RelativePosition, Route, Vehicle,
};

impl LaneStructure {
    /// Gets the record the agent is on.
    pub fn root_record(&self) -> Result<&LaneRecord, PerceptionError> {
        let root = self.graph.root.ok_or(PerceptionError::NotInitialized)?;
        self.graph.record(root)
    }

    /// Gets the record the agent was on at the given time, if it is still part of the structure.
    pub fn root_record_at(&self, time: f64) -> Result<Option<&LaneRecord>, PerceptionError> {
        if self.history.is_empty() {
            return Err(PerceptionError::NotInitialized);
        }
        Ok(self
            .history
            .at(time)
            .and_then(|root| self.graph.records.get(root.record)))
    }

    /// Gets the roots of past updates.
    pub fn root_history(&self) -> &History<RootState> {
        &self.history
    }

    pub fn record(&self, id: RecordId) -> Option<&LaneRecord> {
        self.graph.records.get(id)
    }

    /// Returns an iterator over all the records in the structure.
    pub fn records(&self) -> impl Iterator<Item = &LaneRecord> {
        self.graph.records.values()
    }

    /// Gets the distance from the agent to the start of a record, in m.
    /// Negative for records that start upstream of the agent.
    pub fn start_distance(&self, id: RecordId) -> Result<f64, PerceptionError> {
        self.graph.start_distance(id)
    }

    /// Gets the distance from the agent to a position along a record, in m.
    pub fn distance_to_position(&self, id: RecordId, position: f64) -> Result<f64, PerceptionError> {
        Ok(self.graph.start_distance(id)? + position)
    }

    /// Gets the lane a record is on, relative to the agent.
    pub fn relative_lane(&self, id: RecordId) -> Option<RelativeLane> {
        self.graph.relative_lanes.get(id).copied()
    }

    /// Returns an iterator over the records at the agent's position, by relative lane.
    pub fn cross_section(&self) -> impl Iterator<Item = (RelativeLane, &LaneRecord)> {
        self.graph
            .cross_section
            .iter()
            .filter_map(|(lane, id)| Some((*lane, self.graph.records.get(*id)?)))
    }

    /// Gets every relative lane that can be queried, including lanes that only begin
    /// downstream of the agent.
    pub fn extended_cross_section(&self) -> Result<BTreeSet<RelativeLane>, PerceptionError> {
        if self.graph.root.is_none() {
            return Err(PerceptionError::NotInitialized);
        }
        Ok(self.graph.first_records.keys().copied().collect())
    }

    /// Gets the first record of a relative lane that queries start from, if the lane
    /// is visible at all.
    pub fn first_record(&self, lane: RelativeLane) -> Result<Option<&LaneRecord>, PerceptionError> {
        if self.graph.root.is_none() {
            return Err(PerceptionError::NotInitialized);
        }
        Ok(self
            .graph
            .first_records
            .get(&lane)
            .and_then(|id| self.graph.records.get(*id)))
    }

    /// Returns an iterator over the records the structure has not expanded upstream of.
    pub fn upstream_edge(&self) -> impl Iterator<Item = &LaneRecord> {
        self.graph
            .upstream_edge
            .iter()
            .filter_map(|id| self.graph.records.get(*id))
    }

    /// Returns an iterator over the records the structure has not expanded downstream of.
    pub fn downstream_edge(&self) -> impl Iterator<Item = &LaneRecord> {
        self.graph
            .downstream_edge
            .iter()
            .filter_map(|id| self.graph.records.get(*id))
    }

    /// Returns true if the lanes alongside a record, the record included, lead to more
    /// than one node.
    pub fn is_link_split(&self, id: RecordId) -> Result<bool, PerceptionError> {
        if self.graph.record(id)?.cut_off_end().is_some() {
            // the split, if any, is out of range
            return Ok(false);
        }
        let count = self
            .alongside(id)
            .flat_map(|rec| rec.next().iter())
            .filter_map(|n| self.graph.records.get(*n))
            .map(|next| next.to_node())
            .unique()
            .count();
        Ok(count > 1)
    }

    /// Returns true if the lanes alongside a record, the record included, come from more
    /// than one node.
    pub fn is_link_merge(&self, id: RecordId) -> Result<bool, PerceptionError> {
        if self.graph.record(id)?.cut_off_start().is_some() {
            return Ok(false);
        }
        let count = self
            .alongside(id)
            .flat_map(|rec| rec.prev().iter())
            .filter_map(|p| self.graph.records.get(*p))
            .map(|prev| prev.from_node())
            .unique()
            .count();
        Ok(count > 1)
    }

    /// Walks the records alongside a record, on both sides, starting with the record itself.
    fn alongside(&self, id: RecordId) -> impl Iterator<Item = &LaneRecord> {
        let walk = move |lat: LateralDirection| {
            std::iter::successors(self.graph.records.get(id), move |rec| {
                let next = match lat {
                    LateralDirection::Left => rec.left(),
                    _ => rec.right(),
                };
                next.and_then(|n| self.graph.records.get(n))
            })
        };
        walk(LateralDirection::Left).chain(walk(LateralDirection::Right).skip(1))
    }

    /// Returns true if the route can still be followed from a record, either by continuing
    /// along it or by legal lane changes from it. With `at_end`, only the end of the record
    /// counts, so lane changes on the record itself are ruled out.
    ///
    /// The search moves along the route until it reaches the destination, a link on
    /// which every lane is reachable, or the end of the structure.
    pub fn allows_route(
        &self,
        network: &Network,
        id: RecordId,
        route: &Route,
        at_end: bool,
    ) -> Result<bool, PerceptionError> {
        let rec = self.graph.record(id)?;
        let destination = route
            .destination()
            .ok_or_else(|| PerceptionError::InvalidParameter("the route is empty".into()))?;
        if !route.follows(rec.from_node(), rec.to_node()) {
            return self.leads_to_route(network, id, route);
        }

        let mut current: Vec<RecordId> = vec![id];
        let mut first = true;
        while !current.is_empty() {
            let mut all_cut_off = false;
            if !first || at_end {
                all_cut_off = true;
                let mut next_set = vec![];
                for &record in &current {
                    let rec = self.graph.record(record)?;
                    all_cut_off &= rec.cut_off_end().is_some();
                    for &n in rec.next() {
                        let next = self.graph.record(n)?;
                        if next.to_node() == destination {
                            return Ok(true);
                        }
                        if route.follows(next.from_node(), next.to_node()) && !next_set.contains(&n) {
                            next_set.push(n);
                        }
                    }
                }
                current = next_set;
            }
            first = false;

            // every lane reachable by legal lane changes
            let mut next_set = current.clone();
            for lat in LateralDirection::SIDES {
                for &record in &current {
                    let mut rec = self.graph.record(record)?;
                    loop {
                        let (legal, other) = match lat {
                            LateralDirection::Left => (rec.legal_left(), rec.left()),
                            _ => (rec.legal_right(), rec.right()),
                        };
                        match other {
                            Some(other) if legal && !next_set.contains(&other) => {
                                next_set.push(other);
                                rec = self.graph.record(other)?;
                            }
                            _ => break,
                        }
                    }
                }
            }

            let Some(&sample) = next_set.first() else {
                // the end of the structure counts as reachable
                return Ok(all_cut_off);
            };
            let link = self.graph.record(sample)?.link_id();
            let lanes_on_link = network.link(link).map_or(0, |link| link.lanes().len());
            if next_set.len() == lanes_on_link {
                return Ok(true);
            }
            current = next_set;
        }
        Ok(false)
    }

    /// Returns true if some record downstream of an off-route record allows the route.
    fn leads_to_route(
        &self,
        network: &Network,
        id: RecordId,
        route: &Route,
    ) -> Result<bool, PerceptionError> {
        let mut visited = HashSet::from([id]);
        let mut stack: Vec<RecordId> = self.graph.record(id)?.next().to_vec();
        while let Some(record) = stack.pop() {
            if !visited.insert(record) {
                continue;
            }
            let rec = self.graph.record(record)?;
            if route.follows(rec.from_node(), rec.to_node()) {
                if self.allows_route(network, record, route, false)? {
                    return Ok(true);
                }
                continue;
            }
            stack.extend(rec.next().iter().copied());
        }
        Ok(false)
    }

    /// Gets the downstream objects of kind `K` on every visible lane, up to the look-ahead,
    /// measured from a point on the agent.
    pub fn downstream_objects<'n, K: Perceivable + ?Sized + 'n>(
        &self,
        network: &'n Network,
        agent: &Vehicle,
        point: RelativePosition,
    ) -> Result<BTreeMap<RelativeLane, Vec<PerceivedObject<'n, K>>>, PerceptionError> {
        self.extended_cross_section()?
            .into_iter()
            .map(|lane| Ok((lane, self.downstream_objects_on_lane(network, lane, agent, point)?)))
            .collect()
    }

    /// Gets the downstream objects of kind `K` on one relative lane.
    pub fn downstream_objects_on_lane<'n, K: Perceivable + ?Sized + 'n>(
        &self,
        network: &'n Network,
        lane: RelativeLane,
        agent: &Vehicle,
        point: RelativePosition,
    ) -> Result<Vec<PerceivedObject<'n, K>>, PerceptionError> {
        let Some(record) = self.first_record(lane)? else {
            return Ok(vec![]);
        };
        let position = agent.offset_of(point) - self.start_distance(record.id())?;
        Ok(PerceptionIter::downstream(
            self,
            record.id(),
            position,
            self.config.look_ahead,
            LaneObjects::<K>::new(network),
        )?
        .collect())
    }

    /// Gets the downstream objects of kind `K` on every visible lane, keeping only the
    /// objects on links that lie on the route.
    pub fn downstream_objects_on_route<'n, K: Perceivable + ?Sized + 'n>(
        &self,
        network: &'n Network,
        agent: &Vehicle,
        point: RelativePosition,
        route: &Route,
    ) -> Result<BTreeMap<RelativeLane, Vec<PerceivedObject<'n, K>>>, PerceptionError> {
        self.extended_cross_section()?
            .into_iter()
            .map(|lane| {
                let objects =
                    self.downstream_objects_on_route_on_lane(network, lane, agent, point, route)?;
                Ok((lane, objects))
            })
            .collect()
    }

    /// Gets the downstream objects of kind `K` on one relative lane, keeping only the
    /// objects on links that lie on the route.
    pub fn downstream_objects_on_route_on_lane<'n, K: Perceivable + ?Sized + 'n>(
        &self,
        network: &'n Network,
        lane: RelativeLane,
        agent: &Vehicle,
        point: RelativePosition,
        route: &Route,
    ) -> Result<Vec<PerceivedObject<'n, K>>, PerceptionError> {
        let Some(record) = self.first_record(lane)? else {
            return Ok(vec![]);
        };
        let position = agent.offset_of(point) - self.start_distance(record.id())?;
        let on_route = |entry: &PerceivedObject<'n, K>| {
            network
                .object(entry.object.0)
                .and_then(|object| network.lane(object.lane_id()))
                .and_then(|lane| network.link(lane.link_id()))
                .map_or(false, |link| {
                    route.follows(link.start(), link.end()) || route.follows(link.end(), link.start())
                })
        };
        Ok(PerceptionIter::downstream(
            self,
            record.id(),
            position,
            self.config.look_ahead,
            LaneObjects::<K>::new(network),
        )?
        .with_route(route)
        .filter(on_route)
        .collect())
    }

    /// Gets the upstream objects of kind `K` on every visible lane, as far as the structure
    /// goes, measured from a point on the agent.
    pub fn upstream_objects<'n, K: Perceivable + ?Sized + 'n>(
        &self,
        network: &'n Network,
        agent: &Vehicle,
        point: RelativePosition,
    ) -> Result<BTreeMap<RelativeLane, Vec<PerceivedObject<'n, K>>>, PerceptionError> {
        self.extended_cross_section()?
            .into_iter()
            .map(|lane| Ok((lane, self.upstream_objects_on_lane(network, lane, agent, point)?)))
            .collect()
    }

    /// Gets the upstream objects of kind `K` on one relative lane. A lane that only begins
    /// downstream of the agent has none.
    pub fn upstream_objects_on_lane<'n, K: Perceivable + ?Sized + 'n>(
        &self,
        network: &'n Network,
        lane: RelativeLane,
        agent: &Vehicle,
        point: RelativePosition,
    ) -> Result<Vec<PerceivedObject<'n, K>>, PerceptionError> {
        let Some(record) = self.first_record(lane)? else {
            return Ok(vec![]);
        };
        let start = self.start_distance(record.id())?;
        if start > 0.0 {
            return Ok(vec![]);
        }
        Ok(PerceptionIter::upstream(
            self,
            record.id(),
            agent.offset_of(point) - start,
            f64::INFINITY,
            LaneObjects::<K>::new(network),
        )?
        .collect())
    }

    /// Searches for the vehicles ahead of the agent's front on a relative lane, up to the
    /// look-ahead. `None` if the lane is not visible.
    pub fn leaders<'s, 'n>(
        &'s self,
        network: &'n Network,
        lane: RelativeLane,
        agent: &Vehicle,
    ) -> Result<Option<PerceptionIter<'s, DownstreamNeighbors<'n>>>, PerceptionError> {
        let Some(record) = self.first_record(lane)? else {
            return Ok(None);
        };
        let position = agent.offset_of(RelativePosition::Front) - self.start_distance(record.id())?;
        DownstreamNeighbors::new(network, Some(agent.id()))
            .on_lane(lane)
            .iter(self, record.id(), position, self.config.look_ahead)
            .map(Some)
    }

    /// Searches for the vehicles behind the agent's rear on a relative lane, up to the
    /// upstream horizon. `None` if the lane is not visible.
    pub fn followers<'s, 'n>(
        &'s self,
        network: &'n Network,
        lane: RelativeLane,
        agent: &Vehicle,
    ) -> Result<Option<PerceptionIter<'s, UpstreamNeighbors<'n>>>, PerceptionError> {
        let Some(record) = self.first_record(lane)? else {
            return Ok(None);
        };
        let position = agent.offset_of(RelativePosition::Rear) - self.start_distance(record.id())?;
        UpstreamNeighbors::new(network, Some(agent.id()), lane)
            .iter(self, record.id(), position, self.config.up)
            .map(Some)
    }

    /// Searches for the vehicles ahead on several relative lanes at once, nearest first.
    /// Lanes that are not visible are skipped.
    pub fn all_leaders<'s, 'n>(
        &'s self,
        network: &'n Network,
        lanes: impl IntoIterator<Item = RelativeLane>,
        agent: &Vehicle,
    ) -> Result<
        MultiLaneIter<crate::VehicleId, PerceptionIter<'s, DownstreamNeighbors<'n>>>,
        PerceptionError,
    > {
        let mut iters = vec![];
        for lane in lanes {
            if let Some(iter) = self.leaders(network, lane, agent)? {
                iters.push((lane, iter));
            }
        }
        Ok(MultiLaneIter::new(iters))
    }
}

#[cfg(test)]
mod test {
    use super::super::test::{agent, road};
    use crate::*;
    use assert_approx_eq::assert_approx_eq;
    use itertools::Itertools;

    const CAR: VehicleAttributes = VehicleAttributes {
        agent_type: AgentType::CAR,
        length: 4.0,
    };

    /// Two lanes from `a` to `b`; the right one continues to `c`, the left one to `d`.
    struct Fork {
        net: Network,
        nodes: [NodeId; 4],
        left: LaneId,
        right: LaneId,
        to_c: LaneId,
        to_d: LaneId,
    }

    fn fork() -> Fork {
        let mut net = Network::new();
        let nodes = ["a", "b", "c", "d"].map(|name| net.add_node(name));
        let [a, b, c, d] = nodes;
        let attribs = LaneAttributes {
            length: 100.0,
            ..Default::default()
        };
        let ab = net.add_link(a, b);
        let (left, right) = (net.add_lane(ab, &attribs), net.add_lane(ab, &attribs));
        net.add_lane_pair(left, right, true);
        let bc = net.add_link(b, c);
        let to_c = net.add_lane(bc, &attribs);
        let bd = net.add_link(b, d);
        let to_d = net.add_lane(bd, &attribs);
        net.add_lane_connection(right, to_c);
        net.add_lane_connection(left, to_d);
        Fork {
            net,
            nodes,
            left,
            right,
            to_c,
            to_d,
        }
    }

    fn structure_on(fork: &Fork, route: &Route) -> LaneStructure {
        let mut structure = LaneStructure::new(StructureConfig::default()).unwrap();
        structure
            .update(&fork.net, &agent(fork.right, 50.0), Some(route), 0.0)
            .unwrap();
        structure
    }

    fn record_of(structure: &LaneStructure, lane: LaneId) -> RecordId {
        structure.records().find(|r| r.lane_id() == lane).unwrap().id()
    }

    #[test]
    fn history_of_roots() {
        let road = road(3, 1, 100.0);
        let mut structure = LaneStructure::new(StructureConfig::default()).unwrap();
        assert_eq!(structure.root_record_at(0.0).err(), Some(PerceptionError::NotInitialized));
        structure
            .update(&road.net, &agent(road.lanes[0][0], 50.0), None, 1.0)
            .unwrap();
        structure
            .update(&road.net, &agent(road.lanes[1][0], 10.0), None, 2.0)
            .unwrap();
        assert!(structure.root_record_at(0.5).unwrap().is_none());
        assert_eq!(
            structure.root_record_at(1.5).unwrap().unwrap().lane_id(),
            road.lanes[0][0]
        );
        assert_eq!(structure.root_history().len(), 2);
        let latest = structure.root_history().latest().unwrap();
        assert_eq!(latest.lane, road.lanes[1][0]);
        assert_approx_eq!(latest.start_distance, -10.0);
        assert_approx_eq!(
            structure
                .distance_to_position(structure.root_record().unwrap().id(), 60.0)
                .unwrap(),
            50.0
        );
    }

    #[test]
    fn route_allowance_at_a_fork() {
        let fork = fork();
        let [a, b, c, _] = fork.nodes;
        let route = Route::new(vec![a, b, c]);
        let structure = structure_on(&fork, &route);
        let (left, right) = (record_of(&structure, fork.left), record_of(&structure, fork.right));

        // the left lane still allows a change to the right, but not at its end
        assert!(structure.allows_route(&fork.net, left, &route, false).unwrap());
        assert!(!structure.allows_route(&fork.net, left, &route, true).unwrap());
        assert!(structure.allows_route(&fork.net, right, &route, true).unwrap());
        let to_d = record_of(&structure, fork.to_d);
        assert!(!structure.allows_route(&fork.net, to_d, &route, false).unwrap());

        assert!(structure.is_link_split(left).unwrap());
        assert!(structure.is_link_split(right).unwrap());
        assert!(!structure.is_link_merge(right).unwrap());
        assert!(structure
            .record(to_d)
            .map_or(false, |rec| rec.cut_off_end().is_some()));
    }

    #[test]
    fn objects_ahead_and_behind() {
        let mut fork = fork();
        let [a, b, c, _] = fork.nodes;
        let light = || {
            ObjectKind::TrafficLight(TrafficLight {
                state: LightState::Green,
            })
        };
        let on_c = fork.net.add_object(fork.to_c, 30.0, light());
        let on_d = fork.net.add_object(fork.to_d, 20.0, light());
        let sign = fork.net.add_object(
            fork.right,
            10.0,
            ObjectKind::SpeedSign(SpeedSign { speed_limit: 25.0 }),
        );
        let me = fork.net.add_vehicle(&CAR, fork.right, 50.0, Direction::Plus);
        let me = fork.net.vehicle(me).unwrap().clone();

        let route = Route::new(vec![a, b, c]);
        let structure = structure_on(&fork, &route);
        let lights = structure
            .downstream_objects::<TrafficLight>(&fork.net, &me, RelativePosition::Front)
            .unwrap();
        assert_eq!(lights.keys().copied().collect_vec(), vec![RelativeLane::CURRENT, RelativeLane::LEFT]);
        let current = &lights[&RelativeLane::CURRENT];
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].object.0, on_c);
        assert_approx_eq!(current[0].distance, 78.0);
        let left = &lights[&RelativeLane::LEFT];
        assert_eq!(left[0].object.0, on_d);
        assert_approx_eq!(left[0].distance, 68.0);

        let on_route = structure
            .downstream_objects_on_route::<TrafficLight>(&fork.net, &me, RelativePosition::Front, &route)
            .unwrap();
        assert_eq!(on_route[&RelativeLane::CURRENT].len(), 1);
        assert!(on_route[&RelativeLane::LEFT].is_empty());

        let signs = structure
            .upstream_objects_on_lane::<SpeedSign>(
                &fork.net,
                RelativeLane::CURRENT,
                &me,
                RelativePosition::Rear,
            )
            .unwrap();
        assert_eq!(signs.len(), 1);
        assert_eq!(signs[0].object.0, sign);
        assert_approx_eq!(signs[0].distance, 38.0);
        let none = structure
            .upstream_objects::<TrafficLight>(&fork.net, &me, RelativePosition::Rear)
            .unwrap();
        assert!(none.values().all(|objects| objects.is_empty()));
    }

    #[test]
    fn neighbours_on_several_lanes() {
        let mut fork = fork();
        let [a, b, c, _] = fork.nodes;
        let me = fork.net.add_vehicle(&CAR, fork.right, 50.0, Direction::Plus);
        let ahead = fork.net.add_vehicle(&CAR, fork.to_c, 30.0, Direction::Plus);
        let behind = fork.net.add_vehicle(&CAR, fork.right, 20.0, Direction::Plus);
        let beside = fork.net.add_vehicle(&CAR, fork.left, 70.0, Direction::Plus);
        let me = fork.net.vehicle(me).unwrap().clone();

        let route = Route::new(vec![a, b, c]);
        let structure = structure_on(&fork, &route);
        let leader = structure
            .leaders(&fork.net, RelativeLane::CURRENT, &me)
            .unwrap()
            .unwrap()
            .next()
            .unwrap();
        assert_eq!(leader.object, ahead);
        assert_approx_eq!(leader.distance, 76.0);
        let follower = structure
            .followers(&fork.net, RelativeLane::CURRENT, &me)
            .unwrap()
            .unwrap()
            .next()
            .unwrap();
        assert_eq!(follower.object, behind);
        assert_approx_eq!(follower.distance, 26.0);
        assert!(structure
            .leaders(&fork.net, RelativeLane::RIGHT, &me)
            .unwrap()
            .is_none());

        let all = structure
            .all_leaders(
                &fork.net,
                [RelativeLane::LEFT, RelativeLane::CURRENT, RelativeLane::RIGHT],
                &me,
            )
            .unwrap()
            .map(|e| (e.object.0, e.object.1))
            .collect_vec();
        assert_eq!(
            all,
            vec![(RelativeLane::LEFT, beside), (RelativeLane::CURRENT, ahead)]
        );
    }
}
