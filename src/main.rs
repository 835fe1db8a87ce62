use std::time::Instant;

use lane_perception::{
    AgentState, AgentType, Direction, LaneAttributes, LaneId, LaneStructure, Network,
    PerceptionError, RelativeLane, Route, StructureConfig, VehicleAttributes, VehicleId,
};

const NUM_LINKS: usize = 40;
const NUM_LANES: usize = 3;
const LINK_LENGTH: f64 = 250.0;
const NUM_VEHICLES: usize = 300;
const NUM_FRAMES: usize = 200;
const DT: f64 = 0.1;

/// A three-lane motorway with an on-ramp and an off-ramp every fourth link.
fn motorway() -> (Network, Vec<Vec<LaneId>>, Route) {
    let mut net = Network::new();
    let nodes: Vec<_> = (0..=NUM_LINKS)
        .map(|i| net.add_node(&format!("m{}", i)))
        .collect();
    let attribs = LaneAttributes {
        length: LINK_LENGTH,
        ..Default::default()
    };
    let mut lanes: Vec<Vec<LaneId>> = vec![];
    for i in 0..NUM_LINKS {
        let link = net.add_link(nodes[i], nodes[i + 1]);
        let link_lanes: Vec<_> = (0..NUM_LANES).map(|_| net.add_lane(link, &attribs)).collect();
        for pair in link_lanes.windows(2) {
            net.add_lane_pair(pair[0], pair[1], true);
        }
        if let Some(prev) = lanes.last() {
            for (a, b) in prev.iter().zip(&link_lanes) {
                net.add_lane_connection(*a, *b);
            }
        }
        if i % 4 == 2 {
            let (on, off) = (net.add_node(&format!("on{}", i)), net.add_node(&format!("off{}", i)));
            let ramp_in = net.add_link(on, nodes[i]);
            let ramp_in = net.add_lane(ramp_in, &attribs);
            net.add_lane_connection(ramp_in, link_lanes[NUM_LANES - 1]);
            let ramp_out = net.add_link(nodes[i + 1], off);
            let ramp_out = net.add_lane(ramp_out, &attribs);
            net.add_lane_connection(link_lanes[NUM_LANES - 1], ramp_out);
        }
        lanes.push(link_lanes);
    }
    let route = Route::new(nodes);
    (net, lanes, route)
}

fn main() -> Result<(), PerceptionError> {
    let (mut net, lanes, route) = motorway();
    let attribs = VehicleAttributes {
        agent_type: AgentType::CAR,
        length: 4.5,
    };
    let spacing = (NUM_LINKS / 2) as f64 * LINK_LENGTH / NUM_VEHICLES as f64;
    let mut agents: Vec<(VehicleId, usize, usize, f64, f64)> = (0..NUM_VEHICLES)
        .map(|i| {
            let along = spacing * (i / NUM_LANES * NUM_LANES) as f64;
            let (link, lane) = ((along / LINK_LENGTH) as usize, i % NUM_LANES);
            let pos = along % LINK_LENGTH;
            let id = net.add_vehicle(&attribs, lanes[link][lane], pos, Direction::Plus);
            let speed = 25.0 + 2.0 * lane as f64;
            (id, link, lane, pos, speed)
        })
        .collect();
    let mut structures = (0..NUM_VEHICLES)
        .map(|_| LaneStructure::new(StructureConfig::default()))
        .collect::<Result<Vec<_>, _>>()?;

    println!("Simulating {} vehicles...", NUM_VEHICLES);
    let mut time = 0.0;
    let start = Instant::now();
    let mut leaders = 0;
    for _ in 0..NUM_FRAMES {
        time += DT;
        for agent in agents.iter_mut() {
            let (id, link, lane, pos, speed) = agent;
            *pos += *speed * DT;
            if *pos > LINK_LENGTH {
                *pos -= LINK_LENGTH;
                *link = (*link + 1) % NUM_LINKS;
            }
            net.move_vehicle(*id, lanes[*link][*lane], *pos, Direction::Plus);
        }
        for ((id, ..), structure) in agents.iter().zip(&mut structures) {
            let Some(vehicle) = net.vehicle(*id) else {
                continue;
            };
            let state = AgentState::of(vehicle);
            structure.update(&net, &state, Some(&route), time)?;
            leaders += structure
                .all_leaders(&net, [RelativeLane::LEFT, RelativeLane::CURRENT, RelativeLane::RIGHT], vehicle)?
                .take(3)
                .count();
        }
    }
    let frame = start.elapsed() / NUM_FRAMES as u32;
    println!(
        "Avg. frame: {:?} --> {:.1}x real time ({} leaders perceived)",
        frame,
        DT / frame.as_secs_f64(),
        leaders,
    );
    Ok(())
}
