use crate::util::Interval;
use crate::{Direction, LaneId, VehicleId};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A class of road user, used to decide which lanes and lane changes are permitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AgentType(pub u16);

impl AgentType {
    pub const CAR: Self = Self(0);
    pub const TRUCK: Self = Self(1);
    pub const BUS: Self = Self(2);
}

/// The attributes of a vehicle.
#[derive(Clone, Copy, Debug)]
pub struct VehicleAttributes {
    /// The kind of road user.
    pub agent_type: AgentType,
    /// The vehicle length in m.
    pub length: f64,
}

/// A point on a vehicle, along its direction of travel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelativePosition {
    Front,
    /// The mid-point of the vehicle.
    Reference,
    Rear,
}

/// A vehicle registered on a lane.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID.
    id: VehicleId,
    /// The kind of road user.
    agent_type: AgentType,
    /// Half the vehicle's length in m.
    half_len: f64,
    /// The lane the vehicle is registered on.
    lane: LaneId,
    /// The position of the vehicle's mid-point along the lane's design line, in m.
    pos: f64,
    /// The direction the vehicle travels in.
    direction: Direction,
}

impl Vehicle {
    /// Creates a new vehicle.
    pub(crate) fn new(
        id: VehicleId,
        attribs: &VehicleAttributes,
        lane: LaneId,
        pos: f64,
        direction: Direction,
    ) -> Self {
        Self {
            id,
            agent_type: attribs.agent_type,
            half_len: 0.5 * attribs.length,
            lane,
            pos,
            direction,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// Gets the kind of road user.
    pub fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    /// Gets the vehicle's length in m.
    pub fn length(&self) -> f64 {
        2.0 * self.half_len
    }

    /// Gets the lane the vehicle is on.
    pub fn lane_id(&self) -> LaneId {
        self.lane
    }

    /// Gets the position of the vehicle's mid-point along the lane's design line, in m.
    pub fn pos_mid(&self) -> f64 {
        self.pos
    }

    /// Gets the direction the vehicle travels in.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Gets the position of the vehicle's front along the lane's design line, in m.
    pub fn pos_front(&self) -> f64 {
        match self.direction {
            Direction::Plus => self.pos + self.half_len,
            Direction::Minus => self.pos - self.half_len,
        }
    }

    /// Gets the position of the vehicle's rear along the lane's design line, in m.
    pub fn pos_rear(&self) -> f64 {
        match self.direction {
            Direction::Plus => self.pos - self.half_len,
            Direction::Minus => self.pos + self.half_len,
        }
    }

    /// Gets the longitudinal offset of a point on the vehicle from its mid-point,
    /// measured in the vehicle's direction of travel.
    pub fn offset_of(&self, point: RelativePosition) -> f64 {
        match point {
            RelativePosition::Front => self.half_len,
            RelativePosition::Reference => 0.0,
            RelativePosition::Rear => -self.half_len,
        }
    }

    /// Gets the part of the design line the vehicle occupies.
    pub fn extent(&self) -> Interval {
        Interval::disc(self.pos, self.half_len)
    }

    /// Gets the part of the lane the vehicle occupies, measured from the start
    /// of a lane of the given length when travelling in direction `dir`.
    pub fn extent_along(&self, dir: Direction, length: f64) -> Interval {
        match dir {
            Direction::Plus => self.extent(),
            Direction::Minus => self.extent().mirrored(length),
        }
    }

    /// Moves the vehicle.
    pub(crate) fn set_location(&mut self, lane: LaneId, pos: f64, direction: Direction) {
        self.lane = lane;
        self.pos = pos;
        self.direction = direction;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn vehicle(pos: f64, direction: Direction) -> Vehicle {
        let attribs = VehicleAttributes {
            agent_type: AgentType::CAR,
            length: 4.0,
        };
        Vehicle::new(VehicleId::default(), &attribs, LaneId::default(), pos, direction)
    }

    #[test]
    fn front_and_rear_follow_direction() {
        let veh = vehicle(50.0, Direction::Plus);
        assert_approx_eq!(veh.pos_front(), 52.0);
        assert_approx_eq!(veh.pos_rear(), 48.0);
        let veh = vehicle(50.0, Direction::Minus);
        assert_approx_eq!(veh.pos_front(), 48.0);
        assert_approx_eq!(veh.pos_rear(), 52.0);
    }

    #[test]
    fn extent_along_the_other_direction() {
        let veh = vehicle(10.0, Direction::Plus);
        let ext = veh.extent_along(Direction::Minus, 100.0);
        assert_approx_eq!(ext.min, 88.0);
        assert_approx_eq!(ext.max, 92.0);
    }
}
