//! Dual-Camera Fusion Pipeline
//!
//! Wires the capture loops, fusion stage and frame store together:
//! - [`CaptureLoop`]: one thread per camera, source → extractor → slot
//! - [`StoreFeeder`]: copies new hand-off generations into the [`SharedFrameStore`]
//! - [`Pipeline`]: builds everything from [`PipelineConfig`], reports frame
//!   rates, runs exposure sweeps and shuts down

pub mod capture;
pub mod control;
pub mod feeder;
pub mod logging;
pub mod settings;
pub mod store;
pub mod supervisor;

pub use capture::{CaptureError, CaptureHandle, CaptureLoop, CaptureSummary};
pub use control::{LoopControl, LoopState};
pub use feeder::StoreFeeder;
pub use logging::init_logging;
pub use settings::{CameraSettings, ConfigError, PipelineConfig, SourceKind};
pub use store::{DisplayFrame, SharedFrameStore, StoreSnapshot, ViewMode};
pub use supervisor::{Pipeline, PipelineBuilder, PipelineReport};

use camera_capture::CameraId;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Pipeline-level failures
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot open source for {camera}: {reason}")]
    SourceOpen { camera: CameraId, reason: String },

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("A {0} thread panicked")]
    ThreadPanicked(String),

    #[error("Both camera sources were lost")]
    AllSourcesLost,

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
