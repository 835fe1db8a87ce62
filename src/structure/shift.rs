use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::trace;

use super::{Context, Graph};
use crate::{
    Direction, LaneId, LateralDirection, PerceptionError, RecordId, RecordLink, RelativeLane,
};

/// Shifts within this distance of each other are considered equally good, in m.
const SHIFT_TOLERANCE: f64 = 1e-6;

impl Graph {
    /// Moves the root to the agent's new position, reusing the existing records.
    /// Returns false if the agent's lane is not part of the structure.
    pub(super) fn shift(
        &mut self,
        ctx: &Context,
        lane: LaneId,
        dir: Direction,
        frac_pos: f64,
    ) -> Result<bool, PerceptionError> {
        let root = self.root.ok_or(PerceptionError::NotInitialized)?;
        let (root_lane, root_dir) = (self.records[root].lane_id(), self.records[root].direction());
        if lane != root_lane || dir != root_dir {
            let Some(new_root) = self.find_new_root(lane, dir, frac_pos)? else {
                return Ok(false);
            };
            let lateral_move = self.relative_lane(new_root);
            self.root = Some(new_root);
            self.update_start_distance_sources()?;

            if !lateral_move.is_current() {
                // the new root's relative lane becomes the current lane
                let delta = lateral_move.mirrored();
                let map = std::mem::take(&mut self.relative_lane_map);
                self.relative_lane_map = map
                    .into_iter()
                    .map(|(lane, records)| (lane.add(delta), records))
                    .collect::<BTreeMap<RelativeLane, BTreeSet<RecordId>>>();
                for (_, lane) in self.relative_lanes.iter_mut() {
                    *lane = lane.add(delta);
                }
            }

            self.cross_section.clear();
            self.cross_section.insert(RelativeLane::CURRENT, new_root);
            for lat in LateralDirection::SIDES {
                let mut relative_lane = RelativeLane::CURRENT;
                let mut prev = new_root;
                while let Some(next) = self.lateral(prev, lat) {
                    if self.cross_section.values().any(|r| *r == next) {
                        break;
                    }
                    relative_lane = relative_lane.lateral_step(lat);
                    self.set_source(next, None, RecordLink::Cross);
                    self.cross_section.insert(relative_lane, next);
                    prev = next;
                }
            }
        }

        self.frac_pos = frac_pos;
        self.generation += 1;
        self.retreat_upstream_edge(ctx)?;
        self.derive_first_records(ctx)?;
        trace!(
            "Shifted lane structure to {:?}: {} records, {} upstream and {} downstream edge records",
            self.root,
            self.records.len(),
            self.upstream_edge.len(),
            self.downstream_edge.len()
        );
        Ok(true)
    }

    /// Finds the record the agent moved onto: the one on the given lane whose
    /// position for the agent lies closest to the old root position, preferring
    /// records nearer the old current lane.
    fn find_new_root(
        &self,
        lane: LaneId,
        dir: Direction,
        frac_pos: f64,
    ) -> Result<Option<RecordId>, PerceptionError> {
        let mut best: Option<(f64, u32, RecordId)> = None;
        for (relative_lane, records) in &self.relative_lane_map {
            for &id in records {
                let rec = &self.records[id];
                if rec.lane_id() != lane || rec.direction() != dir {
                    continue;
                }
                let shift = (self.start_distance(id)? + frac_pos * rec.length()).abs();
                let lanes = relative_lane.num_lanes();
                let better = match best {
                    None => true,
                    Some((best_shift, best_lanes, _)) => {
                        shift < best_shift - SHIFT_TOLERANCE
                            || (shift <= best_shift + SHIFT_TOLERANCE && lanes < best_lanes)
                    }
                };
                if better {
                    best = Some((shift, lanes, id));
                }
            }
        }
        Ok(best.map(|(_, _, id)| id))
    }

    /// Re-derives start distances outward from the new root: laterally along each
    /// cross-section, then upstream. Branches that only diverge from the route
    /// the agent has left behind are removed.
    fn update_start_distance_sources(&mut self) -> Result<(), PerceptionError> {
        let root = self.root.ok_or(PerceptionError::NotInitialized)?;
        self.set_source(root, None, RecordLink::Cross);
        let mut visited: HashSet<RecordId> = HashSet::new();
        visited.insert(root);
        let mut set = vec![root];
        for lat in LateralDirection::SIDES {
            let mut prev = root;
            while let Some(next) = self.lateral(prev, lat) {
                if !visited.insert(next) {
                    break;
                }
                self.set_source(next, None, RecordLink::Cross);
                set.push(next);
                prev = next;
            }
        }

        while !set.is_empty() {
            // lateral
            let members: HashSet<RecordId> = set.iter().copied().collect();
            let mut lateral = vec![];
            for &record in &set {
                if !self.records.contains_key(record) {
                    continue;
                }
                for lat in LateralDirection::SIDES {
                    let mut prev = record;
                    while let Some(next) = self.lateral(prev, lat) {
                        if members.contains(&next) || !visited.insert(next) {
                            break;
                        }
                        self.set_source(next, Some(prev), RecordLink::LateralEnd);
                        self.remove_diverging(next, lat.flip(), &members);
                        lateral.push(next);
                        prev = next;
                    }
                }
            }
            set.extend(lateral);

            // longitudinal
            let protected: HashSet<RecordId> = set.iter().copied().collect();
            let mut upstream = vec![];
            for &record in &set {
                let Some(rec) = self.records.get(record) else {
                    continue;
                };
                let link = rec.link_id();
                for prev in rec.prev.clone() {
                    if !self.records.contains_key(prev) {
                        continue;
                    }
                    // branches onto other links are no longer reachable from the agent
                    for other in self.records[prev].next.clone() {
                        if other != record
                            && self.records.get(other).map_or(false, |o| o.link_id() != link)
                        {
                            self.remove_subtree(other, &protected);
                        }
                    }
                    if self.records[prev].source != Some(record) && visited.insert(prev) {
                        self.set_source(prev, Some(record), RecordLink::Up);
                        upstream.push(prev);
                    }
                }
            }
            set = upstream;
        }
        Ok(())
    }

    /// Removes the downstream records of `record` that have no neighbour on side `lat`.
    fn remove_diverging(
        &mut self,
        record: RecordId,
        lat: LateralDirection,
        protected: &HashSet<RecordId>,
    ) {
        let Some(rec) = self.records.get(record) else {
            return;
        };
        for next in rec.next.clone() {
            if protected.contains(&next) {
                continue;
            }
            if self.lateral(next, lat).is_none() {
                self.remove_subtree(next, protected);
            }
        }
    }

    /// Drops the records that fell behind the upstream horizon and cuts off the rest.
    pub(super) fn retreat_upstream_edge(&mut self, ctx: &Context) -> Result<(), PerceptionError> {
        let horizon = -ctx.config.up;
        let mut next_edge: BTreeSet<RecordId> = BTreeSet::new();
        let mut pending: Vec<RecordId> = self.upstream_edge.iter().copied().collect();
        while let Some(prev) = pending.pop() {
            if !self.records.contains_key(prev) || next_edge.contains(&prev) {
                continue;
            }
            let start = self.start_distance(prev)?;
            let end = start + self.records[prev].length();
            if end < horizon {
                // the records it leads to become the edge, unless they fell behind too
                for next in self.records[prev].next.clone() {
                    self.clear_prev(next);
                    pending.push(next);
                    for lat in LateralDirection::SIDES {
                        if let Some(adj) = self.lateral(next, lat) {
                            if self.records[adj].prev.is_empty() {
                                pending.push(adj);
                            }
                        }
                    }
                }
                self.remove_record(prev);
            } else {
                if horizon - start > 0.0 {
                    self.cut_start(prev, horizon - start)?;
                }
                next_edge.insert(prev);
            }
        }
        next_edge.retain(|id| self.records.contains_key(*id));
        self.upstream_edge = next_edge;

        // lanes alongside the edge that do not end at it
        let mut found = BTreeSet::new();
        for record in self.upstream_edge.clone() {
            for lat in LateralDirection::SIDES {
                let mut prev = record;
                while let Some(next) = self.lateral(prev, lat) {
                    if self.upstream_edge.contains(&next) || found.contains(&next) {
                        break;
                    }
                    self.find_upstream_edge(next, horizon, &mut found)?;
                    prev = next;
                }
            }
        }
        self.upstream_edge.extend(found);
        self.upstream_edge.retain(|id| self.records.contains_key(*id));
        Ok(())
    }

    /// Walks upstream from a record to where its lane crosses the upstream horizon,
    /// collecting the records found there.
    fn find_upstream_edge(
        &mut self,
        record: RecordId,
        horizon: f64,
        found: &mut BTreeSet<RecordId>,
    ) -> Result<(), PerceptionError> {
        let mut stack = vec![record];
        while let Some(id) = stack.pop() {
            if !self.records.contains_key(id) || found.contains(&id) {
                continue;
            }
            let start = self.start_distance(id)?;
            let end = start + self.records[id].length();
            if start >= horizon {
                if self.records[id].prev.is_empty() {
                    found.insert(id);
                } else {
                    stack.extend(self.records[id].prev.iter().copied());
                }
            } else if end >= horizon {
                // straddles the horizon
                self.clear_prev(id);
                self.cut_start(id, horizon - start)?;
                found.insert(id);
            } else {
                let next = self.records[id].next.clone();
                if Some(id) != self.root && !self.cross_section.values().any(|r| *r == id) {
                    self.remove_record(id);
                }
                for n in next {
                    if self.records.get(n).map_or(false, |rec| rec.prev.is_empty()) {
                        let next_start = self.start_distance(n)?;
                        self.cut_start(n, horizon - next_start)?;
                        found.insert(n);
                    }
                }
            }
        }
        Ok(())
    }
}
