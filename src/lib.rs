//! Rolling lane structures and distance-ordered perception for agents in a
//! lane-based traffic simulation.
//!
//! Each agent owns a [LaneStructure]: a graph of [LaneRecord]s covering the lanes
//! around it, measured as distances from the agent. The structure is rebuilt or
//! shifted as the agent moves, and searched lazily through [perception].

pub use config::StructureConfig;
#[cfg(feature = "debug")]
pub use debug::take_debug_frame;
pub use direction::{Direction, LateralDirection};
pub use error::PerceptionError;
pub use network::{
    Conflict, ConflictType, Lane, LaneAttributes, LaneObject, LightState, Link, Network, Node,
    ObjectKind, Perceivable, Route, SpeedSign, TrafficLight,
};
pub use relative_lane::RelativeLane;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use structure::{AgentState, History, LaneRecord, LaneStructure, RecordLink, RootState};
pub use util::Interval;
pub use vehicle::{AgentType, RelativePosition, Vehicle, VehicleAttributes};

mod config;
mod debug;
mod direction;
mod error;
mod network;
pub mod perception;
mod relative_lane;
mod structure;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Node].
    pub struct NodeId;
    /// Unique ID of a [Link].
    pub struct LinkId;
    /// Unique ID of a [Lane].
    pub struct LaneId;
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
    /// Unique ID of a [LaneObject].
    pub struct ObjectId;
    /// Unique ID of a [LaneRecord] within its [LaneStructure].
    pub struct RecordId;
}

type NodeSet = SlotMap<NodeId, Node>;
type LinkSet = SlotMap<LinkId, Link>;
type LaneSet = SlotMap<LaneId, Lane>;
type ObjectSet = SlotMap<ObjectId, LaneObject>;
type VehicleSet = SlotMap<VehicleId, Vehicle>;
