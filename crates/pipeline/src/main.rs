//! Dual-Camera Fusion Pipeline - Headless Entry Point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use camera_capture::CameraId;
use clap::Parser;
use pipeline::{init_logging, Pipeline, PipelineConfig};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "dual-fusion", version, about = "Dual-camera saturation fusion pipeline")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "DUAL_FUSION_CONFIG")]
    config: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Run one exposure sweep on this camera after startup
    #[arg(long, value_name = "CAMERA")]
    tune: Option<CameraId>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs)?;

    info!("=== Dual Fusion v{} ===", env!("CARGO_PKG_VERSION"));

    let config = PipelineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let pipeline = Arc::new(Pipeline::start(config)?);

    if let Some(camera) = cli.tune {
        let target = Arc::clone(&pipeline);
        let result = tokio::task::spawn_blocking(move || target.tune(camera)).await?;
        info!(
            camera = %result.camera,
            setting = ?result.selected_setting,
            coverage = ?result.achieved_coverage,
            quality = ?result.quality,
            samples = result.samples.len(),
            "Exposure sweep finished"
        );
    }

    let mut stopped = {
        let watched = Arc::clone(&pipeline);
        tokio::task::spawn_blocking(move || watched.wait_stopped())
    };

    let ctrl_c = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            true
        }
        waited = &mut stopped => {
            waited?;
            false
        }
    };
    if ctrl_c {
        info!("Ctrl-C received");
        pipeline.request_stop();
        stopped.await?;
    } else {
        warn!("Pipeline stopped on its own");
    }

    let pipeline = Arc::try_unwrap(pipeline).map_err(|_| anyhow!("pipeline still shared at shutdown"))?;
    let report = tokio::task::spawn_blocking(move || pipeline.shutdown()).await??;

    info!(
        cam1 = ?report.cam1,
        cam2 = ?report.cam2,
        fused = report.fusion.published,
        "Shutdown complete"
    );
    Ok(())
}
