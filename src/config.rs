use crate::PerceptionError;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The default perception look-ahead, in m.
const LOOK_AHEAD: f64 = 295.0;

/// The default upstream horizon, in m.
const LOOK_BACK: f64 = 200.0;

/// The default margin beyond a split for branches off the route, in m.
const SPLIT_MARGIN: f64 = 50.0;

/// The default margin upstream of a merge for branches off the route, in m.
const MERGE_MARGIN: f64 = 50.0;

/// The horizons of a lane structure. All distances are positive lengths in m.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StructureConfig {
    /// The maximum distance over which downstream objects are perceived.
    pub look_ahead: f64,
    /// How far downstream the structure extends.
    pub down: f64,
    /// How far upstream the structure extends.
    pub up: f64,
    /// How far beyond a split a branch that is not on the route is kept.
    pub down_split: f64,
    /// How far upstream of a merge a branch that is not on the route is kept.
    pub up_merge: f64,
    /// How long old roots are retained, in s; `None` keeps all of them.
    pub history_horizon: Option<f64>,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            look_ahead: LOOK_AHEAD,
            down: LOOK_AHEAD,
            up: LOOK_BACK,
            down_split: SPLIT_MARGIN,
            up_merge: MERGE_MARGIN,
            history_horizon: None,
        }
    }
}

impl StructureConfig {
    /// Checks that every horizon is a finite, non-negative length.
    pub fn validate(&self) -> Result<(), PerceptionError> {
        let horizons = [
            ("look_ahead", self.look_ahead),
            ("down", self.down),
            ("up", self.up),
            ("down_split", self.down_split),
            ("up_merge", self.up_merge),
            ("history_horizon", self.history_horizon.unwrap_or(0.0)),
        ];
        for (name, value) in horizons {
            if !value.is_finite() || value < 0.0 {
                return Err(PerceptionError::InvalidParameter(format!(
                    "{} must be a finite, non-negative value, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(StructureConfig::default().validate(), Ok(()));
    }

    #[test]
    fn negative_horizon_is_rejected() {
        let config = StructureConfig {
            up: -10.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PerceptionError::InvalidParameter(_))
        ));
        let config = StructureConfig {
            down: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
