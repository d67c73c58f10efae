//! The unit external durations/timestamps in a simulation config are
//! expressed in. Internal engine bookkeeping (`des-core::time`) always
//! works in minutes and converts through this enum at the config boundary.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseTimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl Default for BaseTimeUnit {
    fn default() -> Self {
        BaseTimeUnit::Minutes
    }
}

impl BaseTimeUnit {
    /// How many minutes one unit of this kind is worth.
    pub fn minutes_per_unit(self) -> f64 {
        match self {
            BaseTimeUnit::Seconds => 1.0 / 60.0,
            BaseTimeUnit::Minutes => 1.0,
            BaseTimeUnit::Hours => 60.0,
            BaseTimeUnit::Days => 60.0 * 24.0,
        }
    }

    pub fn to_minutes(self, value: f64) -> f64 {
        value * self.minutes_per_unit()
    }

    pub fn from_minutes(self, minutes: f64) -> f64 {
        minutes / self.minutes_per_unit()
    }

    pub fn label(self) -> &'static str {
        match self {
            BaseTimeUnit::Seconds => "seconds",
            BaseTimeUnit::Minutes => "minutes",
            BaseTimeUnit::Hours => "hours",
            BaseTimeUnit::Days => "days",
        }
    }
}
