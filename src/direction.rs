//! Longitudinal and lateral directions.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The direction in which a lane is traversed, relative to its design line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// With the design line.
    Plus,
    /// Against the design line.
    Minus,
}

impl Direction {
    /// Returns true if travelling with the design line.
    pub fn is_plus(self) -> bool {
        self == Self::Plus
    }

    /// Returns the opposite direction.
    pub fn flip(self) -> Self {
        match self {
            Self::Plus => Self::Minus,
            Self::Minus => Self::Plus,
        }
    }

    /// Converts a position along the design line of a lane with the given length
    /// into a position measured from the start of the lane in this direction.
    /// The conversion is its own inverse.
    pub fn along(self, pos: f64, length: f64) -> f64 {
        match self {
            Self::Plus => pos,
            Self::Minus => length - pos,
        }
    }
}

/// A lateral direction, as seen when facing the direction of travel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LateralDirection {
    Left,
    Right,
    None,
}

impl LateralDirection {
    /// Both sides, left first.
    pub const SIDES: [Self; 2] = [Self::Left, Self::Right];

    pub fn is_left(self) -> bool {
        self == Self::Left
    }

    pub fn is_right(self) -> bool {
        self == Self::Right
    }

    pub fn is_none(self) -> bool {
        self == Self::None
    }

    /// Returns the opposite side; `None` stays `None`.
    pub fn flip(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::None => Self::None,
        }
    }

    /// Gets the side of the design line that corresponds to this side
    /// when travelling in the given direction.
    pub fn on_design_line(self, dir: Direction) -> Self {
        match dir {
            Direction::Plus => self,
            Direction::Minus => self.flip(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn along_is_an_involution() {
        assert_approx_eq!(Direction::Minus.along(30.0, 100.0), 70.0);
        assert_approx_eq!(
            Direction::Minus.along(Direction::Minus.along(30.0, 100.0), 100.0),
            30.0
        );
        assert_approx_eq!(Direction::Plus.along(30.0, 100.0), 30.0);
    }

    #[test]
    fn sides_swap_against_the_design_line() {
        let left = LateralDirection::Left;
        assert_eq!(left.on_design_line(Direction::Plus), LateralDirection::Left);
        assert_eq!(left.on_design_line(Direction::Minus), LateralDirection::Right);
        assert_eq!(LateralDirection::None.flip(), LateralDirection::None);
    }
}
