use std::cmp::Ordering;
use std::fmt;

use crate::LateralDirection;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A lane identified by its lateral offset from the lane the agent is on.
///
/// Relative lanes are ordered by signed lane count, with lanes to the right
/// counting negative and lanes to the left counting positive. The agent's
/// own lane is [RelativeLane::CURRENT].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RelativeLane {
    lat: LateralDirection,
    num_lanes: u32,
}

impl RelativeLane {
    /// The agent's own lane.
    pub const CURRENT: Self = Self::from_parts(LateralDirection::None, 0);
    /// The lane directly to the left.
    pub const LEFT: Self = Self::from_parts(LateralDirection::Left, 1);
    /// The lane directly to the right.
    pub const RIGHT: Self = Self::from_parts(LateralDirection::Right, 1);
    /// The second lane to the left.
    pub const SECOND_LEFT: Self = Self::from_parts(LateralDirection::Left, 2);
    /// The second lane to the right.
    pub const SECOND_RIGHT: Self = Self::from_parts(LateralDirection::Right, 2);

    const fn from_parts(lat: LateralDirection, num_lanes: u32) -> Self {
        Self { lat, num_lanes }
    }

    /// Creates a relative lane `num_lanes` lanes to the given side.
    ///
    /// # Panics
    /// Panics if `lat` is `None` while `num_lanes` is non-zero.
    pub fn new(lat: LateralDirection, num_lanes: u32) -> Self {
        if num_lanes == 0 {
            return Self::CURRENT;
        }
        assert!(
            !lat.is_none(),
            "A relative lane other than the current lane needs a lateral direction"
        );
        Self::from_parts(lat, num_lanes)
    }

    /// Creates a relative lane from a signed lane count (left is positive).
    pub fn from_offset(offset: i32) -> Self {
        match offset.cmp(&0) {
            Ordering::Greater => Self::from_parts(LateralDirection::Left, offset.unsigned_abs()),
            Ordering::Less => Self::from_parts(LateralDirection::Right, offset.unsigned_abs()),
            Ordering::Equal => Self::CURRENT,
        }
    }

    /// Gets the signed lane count (left is positive).
    pub fn offset(&self) -> i32 {
        match self.lat {
            LateralDirection::Left => self.num_lanes as i32,
            LateralDirection::Right => -(self.num_lanes as i32),
            LateralDirection::None => 0,
        }
    }

    /// Gets the side this lane is on.
    pub fn lateral(&self) -> LateralDirection {
        self.lat
    }

    /// Gets the number of lanes between the current lane and this one.
    pub fn num_lanes(&self) -> u32 {
        self.num_lanes
    }

    pub fn is_current(&self) -> bool {
        self.lat.is_none()
    }

    pub fn is_left(&self) -> bool {
        self.lat.is_left()
    }

    pub fn is_right(&self) -> bool {
        self.lat.is_right()
    }

    /// Gets the lane one further to the left.
    pub fn left(&self) -> Self {
        Self::from_offset(self.offset() + 1)
    }

    /// Gets the lane one further to the right.
    pub fn right(&self) -> Self {
        Self::from_offset(self.offset() - 1)
    }

    /// Gets the lane one further to the given side.
    pub fn lateral_step(&self, lat: LateralDirection) -> Self {
        match lat {
            LateralDirection::Left => self.left(),
            LateralDirection::Right => self.right(),
            LateralDirection::None => *self,
        }
    }

    /// Adds the offset of `other` to this lane.
    pub fn add(&self, other: RelativeLane) -> Self {
        Self::from_offset(self.offset() + other.offset())
    }

    /// Gets the lane mirrored around the current lane.
    pub fn mirrored(&self) -> Self {
        Self::from_offset(-self.offset())
    }
}

impl Default for RelativeLane {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl PartialOrd for RelativeLane {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RelativeLane {
    fn cmp(&self, other: &Self) -> Ordering {
        self.offset().cmp(&other.offset())
    }
}

impl fmt::Debug for RelativeLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lat {
            LateralDirection::None => write!(f, "RelativeLane(CURRENT)"),
            LateralDirection::Left => write!(f, "RelativeLane(LEFT {})", self.num_lanes),
            LateralDirection::Right => write!(f, "RelativeLane(RIGHT {})", self.num_lanes),
        }
    }
}

impl fmt::Display for RelativeLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lat {
            LateralDirection::None => write!(f, "current"),
            LateralDirection::Left => write!(f, "left {}", self.num_lanes),
            LateralDirection::Right => write!(f, "right {}", self.num_lanes),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ordered_by_signed_count() {
        let mut lanes = vec![
            RelativeLane::LEFT,
            RelativeLane::SECOND_RIGHT,
            RelativeLane::CURRENT,
            RelativeLane::RIGHT,
            RelativeLane::SECOND_LEFT,
        ];
        lanes.sort();
        assert_eq!(
            lanes,
            vec![
                RelativeLane::SECOND_RIGHT,
                RelativeLane::RIGHT,
                RelativeLane::CURRENT,
                RelativeLane::LEFT,
                RelativeLane::SECOND_LEFT,
            ]
        );
    }

    #[test]
    fn stepping_crosses_the_current_lane() {
        assert_eq!(RelativeLane::LEFT.right(), RelativeLane::CURRENT);
        assert_eq!(RelativeLane::CURRENT.right().right(), RelativeLane::SECOND_RIGHT);
        assert_eq!(RelativeLane::RIGHT.add(RelativeLane::SECOND_LEFT), RelativeLane::LEFT);
        assert_eq!(RelativeLane::SECOND_LEFT.mirrored(), RelativeLane::SECOND_RIGHT);
    }

    #[test]
    fn zero_lanes_is_current() {
        assert_eq!(RelativeLane::new(LateralDirection::Left, 0), RelativeLane::CURRENT);
        assert_eq!(RelativeLane::new(LateralDirection::Right, 2).offset(), -2);
    }

    #[test]
    #[should_panic]
    fn lateral_none_needs_zero_lanes() {
        RelativeLane::new(LateralDirection::None, 1);
    }
}
