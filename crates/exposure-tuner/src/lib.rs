//! Exposure Tuner for Saturation Control
//!
//! Sweeps a list of exposure candidates on one camera while its capture loop
//! is paused, measures saturated-pixel coverage at each, and leaves the
//! device on the setting that minimizes saturation above a signal floor.

mod config;
mod result;
mod target;
mod tuner;

pub use config::{TieBreak, TunerConfig};
pub use result::{Sample, SampleOutcome, TuningQuality, TuningResult};
pub use target::{PauseGuard, TuningTarget};
pub use tuner::{select, ExposureTuner};
