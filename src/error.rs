use thiserror::Error;

use crate::{LaneId, LateralDirection, RecordId};

/// An error raised while maintaining or querying a lane structure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PerceptionError {
    /// More than one physically accessible lane was found on one side of a lane.
    #[error("lane {lane:?} has more than one physically accessible lane on its {side:?} side")]
    IllFormedNetwork {
        lane: LaneId,
        side: LateralDirection,
    },
    /// The structure was queried before the first successful update.
    #[error("the lane structure has not been initialized by an update")]
    NotInitialized,
    /// A parameter violated a precondition.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The lane is not part of the network.
    #[error("lane {0:?} is not part of the network")]
    UnknownLane(LaneId),
    /// The record is not, or no longer, part of the lane structure.
    #[error("record {0:?} is not part of the lane structure")]
    UnknownRecord(RecordId),
    /// The structure reached a state that violates one of its invariants.
    #[error("inconsistent lane structure: {0}")]
    Inconsistent(&'static str),
}
