//! Sweep samples and the tuning verdict

use camera_capture::CameraId;
use serde::Serialize;

/// What happened at one candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOutcome {
    /// Fraction of saturated pixels in the measurement frame
    Measured { coverage: f64 },
    /// No measurement; the setting was rejected or no frame arrived
    Skipped { reason: String },
}

/// One candidate tried during a sweep
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub setting: i32,
    pub outcome: SampleOutcome,
}

impl Sample {
    pub fn measured(setting: i32, coverage: f64) -> Self {
        Self {
            setting,
            outcome: SampleOutcome::Measured { coverage },
        }
    }

    pub fn skipped(setting: i32, reason: impl Into<String>) -> Self {
        Self {
            setting,
            outcome: SampleOutcome::Skipped { reason: reason.into() },
        }
    }

    pub fn coverage(&self) -> Option<f64> {
        match self.outcome {
            SampleOutcome::Measured { coverage } => Some(coverage),
            SampleOutcome::Skipped { .. } => None,
        }
    }
}

/// How the selected setting was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningQuality {
    /// Lowest coverage inside the acceptance band
    Optimal,
    /// Nothing qualified; lowest coverage overall
    Degraded,
    /// No candidate produced a measurement
    NoMeasurement,
}

/// Outcome of a sweep; always produced, never an error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuningResult {
    pub camera: CameraId,
    pub selected_setting: Option<i32>,
    pub achieved_coverage: Option<f64>,
    /// Samples in sweep order
    pub samples: Vec<Sample>,
    pub quality: TuningQuality,
}
