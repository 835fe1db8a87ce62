use crate::{LaneId, ObjectId};

/// The state of a traffic light.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightState {
    Red,
    Amber,
    Green,
}

/// A traffic light controlling a stop line.
#[derive(Clone, Debug, PartialEq)]
pub struct TrafficLight {
    pub state: LightState,
}

/// How two conflicting streams of traffic meet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictType {
    Merge,
    Split,
    Crossing,
}

/// The start of an area where the lane conflicts with another.
#[derive(Clone, Debug, PartialEq)]
pub struct Conflict {
    pub conflict_type: ConflictType,
    /// The length of the conflict area along the lane, in m.
    pub length: f64,
    /// Whether traffic on this lane has priority.
    pub priority: bool,
}

/// A sign announcing a new speed limit.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeedSign {
    /// The speed limit in m/s.
    pub speed_limit: f64,
}

/// A static object that can be perceived on a lane.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectKind {
    TrafficLight(TrafficLight),
    Conflict(Conflict),
    SpeedSign(SpeedSign),
}

/// A kind of object that can be searched for on a lane.
pub trait Perceivable {
    /// Selects this kind of object, if `kind` is one.
    fn select(kind: &ObjectKind) -> Option<&Self>;
}

impl Perceivable for ObjectKind {
    fn select(kind: &ObjectKind) -> Option<&Self> {
        Some(kind)
    }
}

impl Perceivable for TrafficLight {
    fn select(kind: &ObjectKind) -> Option<&Self> {
        match kind {
            ObjectKind::TrafficLight(light) => Some(light),
            _ => None,
        }
    }
}

impl Perceivable for Conflict {
    fn select(kind: &ObjectKind) -> Option<&Self> {
        match kind {
            ObjectKind::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }
}

impl Perceivable for SpeedSign {
    fn select(kind: &ObjectKind) -> Option<&Self> {
        match kind {
            ObjectKind::SpeedSign(sign) => Some(sign),
            _ => None,
        }
    }
}

/// A static object placed on a lane.
#[derive(Clone, Debug)]
pub struct LaneObject {
    id: ObjectId,
    lane: LaneId,
    /// The position along the lane's design line, in m.
    pos: f64,
    kind: ObjectKind,
}

impl LaneObject {
    pub(crate) fn new(id: ObjectId, lane: LaneId, pos: f64, kind: ObjectKind) -> Self {
        Self {
            id,
            lane,
            pos,
            kind,
        }
    }

    /// Gets the object ID.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Gets the lane the object is on.
    pub fn lane_id(&self) -> LaneId {
        self.lane
    }

    /// Gets the position along the lane's design line, in m.
    pub fn pos(&self) -> f64 {
        self.pos
    }

    /// Gets the kind of object.
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn selects_only_its_own_kind() {
        let kind = ObjectKind::TrafficLight(TrafficLight {
            state: LightState::Red,
        });
        assert!(TrafficLight::select(&kind).is_some());
        assert!(Conflict::select(&kind).is_none());
        assert!(SpeedSign::select(&kind).is_none());
        assert_eq!(ObjectKind::select(&kind), Some(&kind));
    }
}
