//! Miscellaneous utility structs and functions.

use std::fmt::Debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An interval on the real number line.
#[derive(Copy, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    /// Creates a new interval.
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Creates an interval with the given centre and radius.
    pub fn disc(centre: f64, radius: f64) -> Self {
        Self {
            min: centre - radius,
            max: centre + radius,
        }
    }

    /// Returns true if this interval contains the value.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Gets the magnitude of the interval.
    pub fn length(&self) -> f64 {
        self.max - self.min
    }

    /// Mirrors the interval within `[0, length]`, as seen travelling in the other direction.
    pub fn mirrored(&self, length: f64) -> Self {
        Self::new(length - self.max, length - self.min)
    }
}

impl Debug for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interval({:?}, {:?})", &self.min, &self.max)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn disc_contains_its_ends() {
        let int = Interval::disc(10.0, 2.0);
        assert!(int.contains(8.0));
        assert!(int.contains(12.0));
        assert!(!int.contains(12.5));
        assert_approx_eq!(int.length(), 4.0);
    }

    #[test]
    fn mirrored_swaps_ends() {
        let int = Interval::new(10.0, 14.0).mirrored(100.0);
        assert_approx_eq!(int.min, 86.0);
        assert_approx_eq!(int.max, 90.0);
        assert_approx_eq!(int.mirrored(100.0).min, 10.0);
    }
}
