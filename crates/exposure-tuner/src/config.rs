//! Tuner configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which candidate wins when two have the same coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Earlier in the sweep order
    #[default]
    FirstTried,
    /// Larger exposure value (more signal)
    HigherSetting,
}

/// Exposure sweep configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Exposure values in sweep order (device units)
    pub candidates: Vec<i32>,

    /// Wait after applying a setting (ms)
    pub settle_delay_ms: u64,

    /// Frames grabbed and discarded after the settle delay
    pub settle_frames: u32,

    /// Coverage below this is too dark to be useful
    pub min_coverage: f64,

    /// Coverage above this is unacceptable
    pub max_coverage: f64,

    pub tie_break: TieBreak,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            candidates: vec![200, 100, 50, 30, 20, 10, 5, 2],
            settle_delay_ms: 100,
            settle_frames: 1,
            min_coverage: 0.02,
            max_coverage: 1.0,
            tie_break: TieBreak::FirstTried,
        }
    }
}

impl TunerConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Whether `coverage` lies within the acceptance band
    pub fn accepts(&self, coverage: f64) -> bool {
        coverage >= self.min_coverage && coverage <= self.max_coverage
    }
}
