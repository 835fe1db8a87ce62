use std::collections::HashSet;

use log::debug;

use super::{Context, Edge, Graph};
use crate::{
    Direction, LaneId, LateralDirection, LinkId, PerceptionError, RecordId, RecordLink,
    RelativeLane,
};

impl Graph {
    /// Builds the structure from scratch around the agent's lane.
    pub(super) fn rebuild(
        &mut self,
        ctx: &Context,
        lane: LaneId,
        dir: Direction,
        frac_pos: f64,
        reason: &str,
    ) -> Result<(), PerceptionError> {
        debug!("Building lane structure on lane {:?}: {}", lane, reason);
        self.clear();
        self.frac_pos = frac_pos;

        let root =
            self.construct_record(ctx, lane, dir, None, RecordLink::Cross, RelativeLane::CURRENT)?;
        self.root = Some(root);
        self.cross_section.insert(RelativeLane::CURRENT, root);
        for lat in LateralDirection::SIDES {
            let mut current = root;
            let mut relative_lane = RelativeLane::CURRENT;
            loop {
                let current_lane = self.records[current].lane_id();
                let adjacent =
                    ctx.network
                        .adjacent_lanes_physical(current_lane, lat, ctx.agent_type, dir);
                let Some(&adj_lane) = adjacent.first() else {
                    break;
                };
                if adjacent.len() > 1 {
                    return Err(PerceptionError::IllFormedNetwork {
                        lane: current_lane,
                        side: lat,
                    });
                }
                if self
                    .cross_section
                    .values()
                    .any(|r| self.records[*r].lane_id() == adj_lane)
                {
                    break;
                }
                relative_lane = relative_lane.lateral_step(lat);
                let adj = self.construct_record(
                    ctx,
                    adj_lane,
                    dir,
                    None,
                    RecordLink::Cross,
                    relative_lane,
                )?;
                self.cross_section.insert(relative_lane, adj);
                self.connect_pair(ctx, current, lat, adj);
                current = adj;
            }
        }

        self.upstream_edge = self.cross_section.values().copied().collect();
        self.downstream_edge = self.upstream_edge.clone();
        self.expand_upstream_edge(ctx)?;
        self.derive_first_records(ctx)
    }

    /// Grows the structure upstream until every edge record reaches the upstream horizon
    /// or has nothing upstream of it.
    pub(super) fn expand_upstream_edge(&mut self, ctx: &Context) -> Result<(), PerceptionError> {
        let horizon = -ctx.config.up;
        self.ignore = self
            .upstream_edge
            .iter()
            .map(|id| self.records[*id].lane_id())
            .collect();
        loop {
            let edge: Vec<RecordId> = self.upstream_edge.iter().copied().collect();
            let mut modified_edge = edge.clone();
            let mut new_edge = vec![];
            for record in edge {
                let (lane, dir) = (self.records[record].lane_id(), self.records[record].direction());
                let prevs = ctx.network.upstream_lanes(lane, dir, ctx.agent_type);
                let start = self.start_distance(record)?;
                if start < horizon {
                    self.cut_start(record, horizon - start)?;
                    self.ignore.extend(prevs.iter().map(|(lane, _)| *lane));
                    continue;
                }
                self.records[record].cut_off_start = None;
                if prevs.is_empty() {
                    continue;
                }
                self.upstream_edge.remove(&record);
                let relative_lane = self.relative_lane(record);
                for (prev_lane, prev_dir) in prevs {
                    if self.records[record]
                        .prev
                        .iter()
                        .any(|p| self.records[*p].lane_id() == prev_lane)
                    {
                        continue;
                    }
                    let prev = self.construct_record(
                        ctx,
                        prev_lane,
                        prev_dir,
                        Some(record),
                        RecordLink::Up,
                        relative_lane,
                    )?;
                    self.ignore.insert(prev_lane);
                    self.connect_laterally(ctx, prev, &modified_edge);
                    self.link_longitudinal(prev, record)?;
                    new_edge.push(prev);
                    modified_edge.push(prev);
                }
            }
            let mut expanded = !new_edge.is_empty();
            self.upstream_edge.extend(new_edge);
            let lateral = self.expand_lateral(ctx, Edge::Upstream)?;
            expanded |= !lateral.is_empty();
            self.upstream_edge.extend(lateral);
            if !expanded {
                return Ok(());
            }
        }
    }

    /// Adds the lanes alongside the records of an edge that are not yet in the structure,
    /// returning the added records.
    pub(super) fn expand_lateral(
        &mut self,
        ctx: &Context,
        edge: Edge,
    ) -> Result<Vec<RecordId>, PerceptionError> {
        let edge_set: Vec<RecordId> = match edge {
            Edge::Upstream => self.upstream_edge.iter().copied().collect(),
            Edge::Downstream => self.downstream_edge.iter().copied().collect(),
        };
        let mut lane_set: HashSet<LaneId> = edge_set
            .iter()
            .map(|id| self.records[*id].lane_id())
            .collect();
        let mut new_set = vec![];
        for &record in &edge_set {
            for lat in LateralDirection::SIDES {
                if self.lateral(record, lat).is_some() {
                    continue;
                }
                let mut relative_lane = self.relative_lane(record);
                let mut prev = record;
                loop {
                    let (prev_lane, dir) = (self.records[prev].lane_id(), self.records[prev].direction());
                    let adjacent =
                        ctx.network
                            .adjacent_lanes_physical(prev_lane, lat, ctx.agent_type, dir);
                    let Some(&next_lane) = adjacent.first() else {
                        break;
                    };
                    if adjacent.len() > 1 {
                        return Err(PerceptionError::IllFormedNetwork {
                            lane: prev_lane,
                            side: lat,
                        });
                    }
                    relative_lane = relative_lane.lateral_step(lat);
                    if lane_set.contains(&next_lane) || self.ignore.contains(&next_lane) {
                        break;
                    }
                    let next = self.construct_record(
                        ctx,
                        next_lane,
                        dir,
                        Some(prev),
                        RecordLink::LateralEnd,
                        relative_lane,
                    )?;
                    self.ignore.insert(next_lane);
                    lane_set.insert(next_lane);
                    new_set.push(next);
                    self.connect_pair(ctx, prev, lat, next);

                    // other edge records on the far side of the new record
                    let next_link = self.records[next].link_id();
                    for &other in &edge_set {
                        if other == prev
                            || self.records[other].link_id() != next_link
                            || self.lateral(other, lat.flip()).is_some()
                        {
                            continue;
                        }
                        let (other_lane, other_dir) =
                            (self.records[other].lane_id(), self.records[other].direction());
                        if ctx
                            .network
                            .adjacent_lanes_physical(other_lane, lat.flip(), ctx.agent_type, other_dir)
                            .contains(&next_lane)
                        {
                            self.connect_pair(ctx, other, lat.flip(), next);
                        }
                    }

                    // the new lane may merge into, or split from, the lanes alongside it
                    let neighbours = [self.records[next].left, self.records[next].right];
                    for adj in neighbours.into_iter().flatten() {
                        let ups = ctx.network.upstream_lanes(next_lane, dir, ctx.agent_type);
                        for adj_prev in self.records[adj].prev.clone() {
                            if ups.iter().any(|(lane, _)| *lane == self.records[adj_prev].lane_id()) {
                                self.link_longitudinal(adj_prev, next)?;
                            }
                        }
                        let downs = ctx.network.downstream_lanes(next_lane, dir, ctx.agent_type);
                        for adj_next in self.records[adj].next.clone() {
                            if downs.iter().any(|(lane, _)| *lane == self.records[adj_next].lane_id()) {
                                self.link_longitudinal(next, adj_next)?;
                            }
                        }
                    }
                    prev = next;
                }
            }
        }
        Ok(new_set)
    }

    /// Grows the structure downstream until every edge record reaches the downstream
    /// horizon, ends, or leaves the route.
    pub(super) fn expand_downstream_edge(&mut self, ctx: &Context) -> Result<(), PerceptionError> {
        let horizon = ctx.config.down;
        self.ignore = self
            .downstream_edge
            .iter()
            .map(|id| self.records[*id].lane_id())
            .collect();
        loop {
            let edge: Vec<RecordId> = self.downstream_edge.iter().copied().collect();
            // a link is expanded if any of its lanes ends short of the horizon
            let mut links_to_expand: HashSet<LinkId> = HashSet::new();
            for &record in &edge {
                let rec = &self.records[record];
                if self.start_distance(record)? + rec.length() < horizon {
                    links_to_expand.insert(rec.link_id());
                }
            }
            let mut modified_edge = edge.clone();
            let mut new_edge = vec![];
            let mut split_set = vec![];
            for record in edge {
                let rec = &self.records[record];
                let (lane, dir, link) = (rec.lane_id(), rec.direction(), rec.link_id());
                let nexts = ctx.network.downstream_lanes(lane, dir, ctx.agent_type);
                if !links_to_expand.contains(&link) {
                    let start = self.start_distance(record)?;
                    self.cut_end(record, horizon - start)?;
                    self.ignore.extend(nexts.iter().map(|(lane, _)| *lane));
                    continue;
                }
                self.records[record].cut_off_end = None;
                if nexts.is_empty() {
                    // a dead end stays on the edge
                    continue;
                }
                self.downstream_edge.remove(&record);
                let chosen = ctx
                    .network
                    .next_lane_for_route(lane, dir, ctx.agent_type, ctx.route)
                    .and_then(|(lane, _)| ctx.network.lane(lane))
                    .map(|lane| (lane.id(), lane.link_id()));
                let relative_lane = self.relative_lane(record);
                for (next_lane, next_dir) in nexts {
                    // at a lane split within the route, only the lane for the route is followed
                    if let Some((chosen_lane, chosen_link)) = chosen {
                        let next_link = ctx.network.lane(next_lane).map(|lane| lane.link_id());
                        if next_lane != chosen_lane && next_link == Some(chosen_link) {
                            continue;
                        }
                    }
                    if self.records[record]
                        .next
                        .iter()
                        .any(|n| self.records[*n].lane_id() == next_lane)
                    {
                        continue;
                    }
                    let next = self.construct_record(
                        ctx,
                        next_lane,
                        next_dir,
                        Some(record),
                        RecordLink::Down,
                        relative_lane,
                    )?;
                    self.ignore.insert(next_lane);
                    self.link_longitudinal(record, next)?;
                    self.connect_laterally(ctx, next, &modified_edge);
                    if ctx.lane_on_route(next_lane, next_dir) {
                        new_edge.push(next);
                    } else {
                        split_set.push(next);
                    }
                    modified_edge.push(next);
                    self.expand_upstream_merge(ctx, &[next])?;
                }
            }
            let mut expanded = !new_edge.is_empty();
            self.downstream_edge.extend(new_edge);
            self.expand_downstream_split(ctx, &split_set)?;
            let lateral = self.expand_lateral(ctx, Edge::Downstream)?;
            self.expand_upstream_merge(ctx, &lateral)?;
            expanded |= !lateral.is_empty();
            self.downstream_edge.extend(lateral);
            if !expanded {
                return Ok(());
            }
        }
    }

    /// Follows the branches that leave the route for the split margin past where they split.
    pub(super) fn expand_downstream_split(
        &mut self,
        ctx: &Context,
        set: &[RecordId],
    ) -> Result<(), PerceptionError> {
        let mut prevs = vec![];
        for &record in set {
            prevs.push((record, self.start_distance(record)? + ctx.config.down_split));
        }
        while !prevs.is_empty() {
            let mut nexts: Vec<(RecordId, f64)> = vec![];
            for (prev, limit) in prevs {
                let start = self.start_distance(prev)?;
                let rec = &self.records[prev];
                let (lane, dir, length) = (rec.lane_id(), rec.direction(), rec.length());
                if start + length >= limit {
                    self.cut_end(prev, limit - start)?;
                    continue;
                }
                let relative_lane = self.relative_lane(prev);
                for (next_lane, next_dir) in ctx.network.downstream_lanes(lane, dir, ctx.agent_type) {
                    if ctx.lane_on_route(next_lane, next_dir) {
                        continue;
                    }
                    let next = self.construct_record(
                        ctx,
                        next_lane,
                        next_dir,
                        Some(prev),
                        RecordLink::Down,
                        relative_lane,
                    )?;
                    self.link_longitudinal(prev, next)?;
                    let siblings: Vec<RecordId> = nexts.iter().map(|(r, _)| *r).collect();
                    self.connect_laterally(ctx, next, &siblings);
                    nexts.push((next, limit));
                }
            }
            prevs = nexts;
        }
        Ok(())
    }

    /// Follows the branches that merge onto the route for the merge margin upstream of
    /// where they merge. Records reaching the margin join the upstream edge.
    pub(super) fn expand_upstream_merge(
        &mut self,
        ctx: &Context,
        set: &[RecordId],
    ) -> Result<(), PerceptionError> {
        if ctx.route.is_none() {
            return Ok(());
        }
        let seeds: HashSet<RecordId> = set.iter().copied().collect();
        let mut nexts = vec![];
        for &record in set {
            nexts.push((record, self.start_distance(record)? - ctx.config.up_merge));
        }
        while !nexts.is_empty() {
            let mut prevs: Vec<(RecordId, f64)> = vec![];
            for (record, limit) in nexts {
                let rec = &self.records[record];
                let (lane, dir) = (rec.lane_id(), rec.direction());
                let relative_lane = self.relative_lane(record);
                let mut added = false;
                for (prev_lane, prev_dir) in ctx.network.upstream_lanes(lane, dir, ctx.agent_type) {
                    if ctx.lane_on_route(prev_lane, prev_dir)
                        || self.records[record]
                            .prev
                            .iter()
                            .any(|p| self.records[*p].lane_id() == prev_lane)
                    {
                        continue;
                    }
                    added = true;
                    let prev = self.construct_record(
                        ctx,
                        prev_lane,
                        prev_dir,
                        Some(record),
                        RecordLink::Up,
                        relative_lane,
                    )?;
                    self.link_longitudinal(prev, record)?;
                    let siblings: Vec<RecordId> = prevs.iter().map(|(r, _)| *r).collect();
                    self.connect_laterally(ctx, prev, &siblings);
                    let start = self.start_distance(prev)?;
                    if start < limit {
                        self.cut_start(prev, limit - start)?;
                        self.upstream_edge.insert(prev);
                    } else {
                        prevs.push((prev, limit));
                    }
                }
                if !added && !seeds.contains(&record) {
                    self.upstream_edge.insert(record);
                }
            }
            nexts = prevs;
        }
        Ok(())
    }

    /// Finds, for every relative lane in the structure, the record on that lane nearest
    /// to the agent's cross-section.
    pub(super) fn derive_first_records(&mut self, ctx: &Context) -> Result<(), PerceptionError> {
        self.first_records = self.cross_section.clone();
        let lanes: Vec<RelativeLane> = self.relative_lane_map.keys().copied().collect();
        for lane in lanes {
            if self.first_records.contains_key(&lane) {
                continue;
            }
            if let Some(record) = self.find_first_record(ctx, lane)? {
                self.first_records.insert(lane, record);
            }
        }
        Ok(())
    }

    fn find_first_record(
        &self,
        ctx: &Context,
        lane: RelativeLane,
    ) -> Result<Option<RecordId>, PerceptionError> {
        // start from the outermost cross-section lane short of the target
        let mut current = RelativeLane::CURRENT;
        for cross in self.cross_section.keys() {
            if cross.lateral() == lane.lateral()
                && cross.num_lanes() <= lane.num_lanes()
                && cross.num_lanes() > current.num_lanes()
            {
                current = *cross;
            }
        }
        let Some(&start) = self.cross_section.get(&current) else {
            return Ok(None);
        };

        let mut record = start;
        while current.num_lanes() < lane.num_lanes() {
            if let Some(adj) = self.lateral(record, lane.lateral()) {
                current = current.lateral_step(lane.lateral());
                record = adj;
                continue;
            }
            let rec = &self.records[record];
            let Some((next_lane, _)) = ctx.network.next_lane_for_route(
                rec.lane_id(),
                rec.direction(),
                ctx.agent_type,
                ctx.route,
            ) else {
                return Ok(None);
            };
            match rec
                .next
                .iter()
                .find(|n| self.records[**n].lane_id() == next_lane)
            {
                Some(next) => record = *next,
                None => return Ok(None),
            }
        }

        // back up to where the lane begins downstream of the agent
        loop {
            let rec = &self.records[record];
            if rec.prev.len() == 1 && self.start_distance(record)? > 0.0 {
                record = rec.prev[0];
            } else {
                return Ok(Some(record));
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::test::{agent, road};
    use super::super::LaneStructure;
    use crate::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn cross_section_spans_the_link() {
        let road = road(1, 3, 500.0);
        let mut structure = LaneStructure::new(StructureConfig::default()).unwrap();
        structure
            .update(&road.net, &agent(road.lanes[0][1], 100.0), None, 0.0)
            .unwrap();
        let lanes: Vec<_> = structure.extended_cross_section().unwrap().into_iter().collect();
        assert_eq!(
            lanes,
            vec![RelativeLane::RIGHT, RelativeLane::CURRENT, RelativeLane::LEFT]
        );
        let left = structure.first_record(RelativeLane::LEFT).unwrap().unwrap();
        assert_eq!(left.lane_id(), road.lanes[0][0]);
        assert!(left.legal_right());
        assert_approx_eq!(structure.start_distance(left.id()).unwrap(), -100.0);
        let root = structure.root_record().unwrap();
        assert_eq!(root.left(), Some(left.id()));
        assert_eq!(left.right(), Some(root.id()));
    }

    #[test]
    fn ambiguous_adjacency_is_ill_formed() {
        let mut road = road(1, 2, 100.0);
        let extra = road.net.add_link(road.nodes[0], road.nodes[1]);
        let other = road.net.add_lane(
            extra,
            &LaneAttributes {
                length: 100.0,
                ..Default::default()
            },
        );
        road.net
            .add_adjacency(road.lanes[0][1], LateralDirection::Left, other, true);
        let mut structure = LaneStructure::new(StructureConfig::default()).unwrap();
        let result = structure.update(&road.net, &agent(road.lanes[0][1], 10.0), None, 0.0);
        assert!(matches!(
            result,
            Err(PerceptionError::IllFormedNetwork {
                side: LateralDirection::Left,
                ..
            })
        ));
        assert!(structure.root_record().is_err());
    }

    #[test]
    fn records_are_cut_off_at_the_horizons() {
        let road = road(10, 1, 100.0);
        let config = StructureConfig {
            down: 250.0,
            up: 120.0,
            ..Default::default()
        };
        let mut structure = LaneStructure::new(config).unwrap();
        structure
            .update(&road.net, &agent(road.lanes[4][0], 50.0), None, 0.0)
            .unwrap();
        // upstream: lane 3 (-150..-50), cut at -120
        // downstream: lanes 5 (50..150) and 6 (150..250), which reaches the horizon
        assert_eq!(structure.records().count(), 4);
        let upstream: Vec<_> = structure.upstream_edge().collect();
        assert_eq!(upstream.len(), 1);
        assert_eq!(upstream[0].lane_id(), road.lanes[3][0]);
        assert_approx_eq!(upstream[0].cut_off_start().unwrap(), 30.0);
        let downstream: Vec<_> = structure.downstream_edge().collect();
        assert_eq!(downstream.len(), 1);
        assert_eq!(downstream[0].lane_id(), road.lanes[6][0]);
        assert_approx_eq!(downstream[0].cut_off_end().unwrap(), 100.0);
        assert!(!downstream[0].is_dead_end());
    }
}
