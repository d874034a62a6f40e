//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::PipelineError;

/// Install the global fmt subscriber.
///
/// Filtering follows `RUST_LOG`, falling back to `info`. `json` switches to
/// one JSON object per line.
pub fn init_logging(json: bool) -> Result<(), PipelineError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| PipelineError::Logging(e.to_string()))
}
