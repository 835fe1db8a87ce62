//! Network fixtures shared by the integration tests.

#![allow(dead_code)]

use lane_perception::{
    AgentState, AgentType, Direction, LaneAttributes, LaneId, LaneStructure, Network, NodeId,
    StructureConfig, VehicleAttributes,
};

pub const CAR: VehicleAttributes = VehicleAttributes {
    agent_type: AgentType::CAR,
    length: 4.0,
};

pub const EPS: f64 = 1e-6;

/// A road of consecutive links, each with the same lanes numbered left to right.
pub struct Road {
    pub net: Network,
    pub nodes: Vec<NodeId>,
    pub lanes: Vec<Vec<LaneId>>,
}

impl Road {
    pub fn new(num_links: usize, num_lanes: usize, length: f64) -> Self {
        let mut net = Network::new();
        let nodes: Vec<_> = (0..=num_links)
            .map(|i| net.add_node(&format!("n{}", i)))
            .collect();
        let mut lanes: Vec<Vec<LaneId>> = vec![];
        for i in 0..num_links {
            let link = net.add_link(nodes[i], nodes[i + 1]);
            let link_lanes: Vec<_> = (0..num_lanes)
                .map(|_| net.add_lane(link, &attribs(length)))
                .collect();
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
        Self { net, nodes, lanes }
    }
}

pub fn attribs(length: f64) -> LaneAttributes<'static> {
    LaneAttributes {
        length,
        ..Default::default()
    }
}

pub fn agent(lane: LaneId, position: f64) -> AgentState {
    AgentState {
        lane,
        position,
        direction: Direction::Plus,
        agent_type: AgentType::CAR,
        deviative: false,
    }
}

pub fn structure(config: StructureConfig) -> LaneStructure {
    LaneStructure::new(config).unwrap()
}

/// Checks that longitudinal and lateral links between records are mutual.
pub fn assert_links_consistent(structure: &LaneStructure) {
    for rec in structure.records() {
        for next in rec.next() {
            let next = structure.record(*next).expect("next record exists");
            assert!(next.prev().contains(&rec.id()), "{:?} missing from prev", rec.id());
        }
        for prev in rec.prev() {
            let prev = structure.record(*prev).expect("prev record exists");
            assert!(prev.next().contains(&rec.id()), "{:?} missing from next", rec.id());
        }
        if let Some(left) = rec.left() {
            let left = structure.record(left).expect("left record exists");
            assert!(
                left.right().map_or(true, |right| right == rec.id()),
                "{:?} has a different right neighbour",
                left.id()
            );
        }
        if let Some(right) = rec.right() {
            let right = structure.record(right).expect("right record exists");
            assert!(
                right.left().map_or(true, |left| left == rec.id()),
                "{:?} has a different left neighbour",
                right.id()
            );
        }
    }
}

/// Checks that the retained span of every record lies within the horizons and margins.
pub fn assert_within_horizons(structure: &LaneStructure) {
    let config = structure.config();
    for rec in structure.records() {
        let start = structure.start_distance(rec.id()).unwrap();
        let retained_start = start + rec.cut_off_start().unwrap_or(0.0);
        let retained_end = start + rec.cut_off_end().unwrap_or(rec.length());
        assert!(
            retained_start <= config.down + config.down_split + EPS,
            "record on {:?} starts at {}",
            rec.lane_id(),
            retained_start
        );
        assert!(
            retained_end >= -(config.up + config.up_merge) - EPS,
            "record on {:?} ends at {}",
            rec.lane_id(),
            retained_end
        );
    }
}
