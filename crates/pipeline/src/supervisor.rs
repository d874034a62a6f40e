//! Builds, runs and tears down the whole pipeline

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camera_capture::{
    CameraId, DynamicBarSource, ExposureControl, FrameSource, RecordingExposure, StaticSource, V4l2Exposure,
};
use exposure_tuner::{ExposureTuner, TuningResult};
use fusion::{Fuser, FusionFrame, FusionStage, FusionStats};
use handoff::{Doorbell, LatestSlot, StopToken};
use saturation::{AnnotatedFrame, SaturationExtractor};
use tracing::{error, info, warn};

use crate::capture::{CaptureError, CaptureHandle, CaptureLoop, CaptureSummary};
use crate::control::LoopState;
use crate::feeder::StoreFeeder;
use crate::settings::{CameraSettings, PipelineConfig, SourceKind};
use crate::store::SharedFrameStore;
use crate::PipelineError;

/// Poll slice for [`Pipeline::wait_stopped`]
const WAIT_SLICE: Duration = Duration::from_millis(250);

type CaptureJoin = JoinHandle<Result<CaptureSummary, CaptureError>>;

/// What every stage reported at shutdown
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub cam1: Result<CaptureSummary, CaptureError>,
    pub cam2: Result<CaptureSummary, CaptureError>,
    pub fusion: FusionStats,
}

/// Assembles a [`Pipeline`], optionally with injected sources and exposure control
pub struct PipelineBuilder {
    config: PipelineConfig,
    cam1_source: Option<Box<dyn FrameSource>>,
    cam2_source: Option<Box<dyn FrameSource>>,
    exposure: Option<Arc<dyn ExposureControl>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cam1_source: None,
            cam2_source: None,
            exposure: None,
        }
    }

    /// Use `source` instead of the one named in the configuration
    pub fn with_source(mut self, camera: CameraId, source: Box<dyn FrameSource>) -> Self {
        match camera {
            CameraId::Cam1 => self.cam1_source = Some(source),
            CameraId::Cam2 => self.cam2_source = Some(source),
        }
        self
    }

    pub fn with_exposure(mut self, control: Arc<dyn ExposureControl>) -> Self {
        self.exposure = Some(control);
        self
    }

    /// Open the sources and spawn every stage
    pub fn start(self) -> Result<Pipeline, PipelineError> {
        let PipelineBuilder {
            config,
            cam1_source,
            cam2_source,
            exposure,
        } = self;
        config.validate()?;

        let cam1_source = match cam1_source {
            Some(source) => source,
            None => open_source(CameraId::Cam1, &config.cam1)?,
        };
        let cam2_source = match cam2_source {
            Some(source) => source,
            None => open_source(CameraId::Cam2, &config.cam2)?,
        };
        let exposure = exposure.unwrap_or_else(|| default_exposure(&config));

        let stop = StopToken::new();
        let bell = Arc::new(Doorbell::new());
        let cam1_slot: Arc<LatestSlot<AnnotatedFrame>> = Arc::new(LatestSlot::with_doorbell(Arc::clone(&bell)));
        let cam2_slot: Arc<LatestSlot<AnnotatedFrame>> = Arc::new(LatestSlot::with_doorbell(Arc::clone(&bell)));
        let fusion_slot: Arc<LatestSlot<FusionFrame>> = Arc::new(LatestSlot::with_doorbell(Arc::clone(&bell)));
        let store = Arc::new(SharedFrameStore::new());

        let (cam1, cam1_join) = spawn_capture(&config, CameraId::Cam1, cam1_source, &cam1_slot, &stop)?;
        let (cam2, cam2_join) = match spawn_capture(&config, CameraId::Cam2, cam2_source, &cam2_slot, &stop) {
            Ok(spawned) => spawned,
            Err(e) => {
                stop.stop();
                cam1.stop();
                return Err(e);
            }
        };

        // From here an early return drops `pipeline`, which stops what already runs
        let mut pipeline = Pipeline {
            cam1,
            cam2,
            stop: stop.clone(),
            bell: Arc::clone(&bell),
            store: Arc::clone(&store),
            fusion_slot: Arc::clone(&fusion_slot),
            exposure,
            cam1_join: Some(cam1_join),
            cam2_join: Some(cam2_join),
            fusion_join: None,
            feeder_join: None,
            monitor_join: None,
            config,
        };

        let stage = FusionStage::new(
            Fuser::new(pipeline.config.fusion_config()),
            Arc::clone(&cam1_slot),
            Arc::clone(&cam2_slot),
            Arc::clone(&bell),
            Arc::clone(&fusion_slot),
        );
        pipeline.fusion_join = Some(spawn_named("fusion", {
            let stop = stop.clone();
            move || stage.run(stop)
        })?);

        let feeder = StoreFeeder::new(cam1_slot, cam2_slot, Arc::clone(&fusion_slot), Arc::clone(&bell), store);
        pipeline.feeder_join = Some(spawn_named("store-feeder", {
            let stop = stop.clone();
            move || feeder.run(stop)
        })?);

        let monitor = Monitor {
            cam1: pipeline.cam1.clone(),
            cam2: pipeline.cam2.clone(),
            fusion: fusion_slot,
            bell,
            stop,
            interval: pipeline.config.stats_interval(),
        };
        pipeline.monitor_join = Some(spawn_named("monitor", move || monitor.run())?);

        info!(
            threshold = pipeline.config.threshold,
            resolution = ?pipeline.config.cam1.resolution(),
            "Pipeline started"
        );
        Ok(pipeline)
    }
}

/// A running pipeline.
///
/// Dropping it without [`Pipeline::shutdown`] signals every stage to stop but
/// does not wait for them.
pub struct Pipeline {
    config: PipelineConfig,
    stop: StopToken,
    bell: Arc<Doorbell>,
    store: Arc<SharedFrameStore>,
    fusion_slot: Arc<LatestSlot<FusionFrame>>,
    exposure: Arc<dyn ExposureControl>,
    cam1: CaptureHandle,
    cam2: CaptureHandle,
    cam1_join: Option<CaptureJoin>,
    cam2_join: Option<CaptureJoin>,
    fusion_join: Option<JoinHandle<FusionStats>>,
    feeder_join: Option<JoinHandle<()>>,
    monitor_join: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Start with sources and exposure control taken from `config`
    pub fn start(config: PipelineConfig) -> Result<Self, PipelineError> {
        PipelineBuilder::new(config).start()
    }

    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<SharedFrameStore> {
        Arc::clone(&self.store)
    }

    /// Capture loop control for `camera`
    pub fn handle(&self, camera: CameraId) -> &CaptureHandle {
        match camera {
            CameraId::Cam1 => &self.cam1,
            CameraId::Cam2 => &self.cam2,
        }
    }

    /// Number of fusion frames published so far
    pub fn fusion_frames(&self) -> u64 {
        self.fusion_slot.generation()
    }

    /// Run one exposure sweep on `camera`, pausing its capture loop meanwhile.
    ///
    /// Blocks for the whole sweep; async callers should use `spawn_blocking`.
    /// Concurrent sweeps on the same camera run one after the other.
    pub fn tune(&self, camera: CameraId) -> TuningResult {
        let handle = self.handle(camera);
        let _exclusive = handle.exclusive_sweep();
        let tuner = ExposureTuner::new(
            self.config.tuner.clone(),
            SaturationExtractor::new(self.config.extractor(camera)),
            Arc::clone(&self.exposure),
        );
        tuner.tune(handle)
    }

    /// Ask every stage to stop without waiting
    pub fn request_stop(&self) {
        self.stop.stop();
        self.cam1.stop();
        self.cam2.stop();
        self.bell.ring();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Block until the pipeline is asked to stop, or stops itself
    pub fn wait_stopped(&self) {
        while !self.stop.sleep(WAIT_SLICE) {}
    }

    /// Stop every stage and collect their reports.
    ///
    /// Fails with [`PipelineError::AllSourcesLost`] when both capture loops
    /// ended because their devices went away.
    pub fn shutdown(mut self) -> Result<PipelineReport, PipelineError> {
        info!("Shutting down pipeline");
        self.request_stop();

        let cam1 = join(self.cam1_join.take(), "capture-cam1")?;
        let cam2 = join(self.cam2_join.take(), "capture-cam2")?;
        let fusion = join(self.fusion_join.take(), "fusion")?;
        join(self.feeder_join.take(), "store-feeder")?;
        join(self.monitor_join.take(), "monitor")?;

        let (Some(cam1), Some(cam2)) = (cam1, cam2) else {
            return Err(PipelineError::ThreadPanicked("capture".into()));
        };
        if let (Err(CaptureError::DeviceUnavailable { .. }), Err(CaptureError::DeviceUnavailable { .. })) = (&cam1, &cam2)
        {
            error!("Both camera sources were lost");
            return Err(PipelineError::AllSourcesLost);
        }
        for outcome in [&cam1, &cam2] {
            if let Err(e) = outcome {
                warn!(error = %e, "Capture loop ended early");
            }
        }

        let fusion = fusion.unwrap_or_default();
        info!(fused = fusion.published, "Pipeline stopped");
        Ok(PipelineReport { cam1, cam2, fusion })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.request_stop();
    }
}

fn join<T>(handle: Option<JoinHandle<T>>, name: &str) -> Result<Option<T>, PipelineError> {
    match handle {
        Some(handle) => handle
            .join()
            .map(Some)
            .map_err(|_| PipelineError::ThreadPanicked(name.to_string())),
        None => Ok(None),
    }
}

fn spawn_named<T, F>(name: &str, body: F) -> Result<JoinHandle<T>, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| PipelineError::Spawn {
            name: name.to_string(),
            source,
        })
}

fn spawn_capture(
    config: &PipelineConfig,
    camera: CameraId,
    source: Box<dyn FrameSource>,
    slot: &Arc<LatestSlot<AnnotatedFrame>>,
    stop: &StopToken,
) -> Result<(CaptureHandle, CaptureJoin), PipelineError> {
    let capture = CaptureLoop::new(
        camera,
        source,
        SaturationExtractor::new(config.extractor(camera)),
        Arc::clone(slot),
        stop.clone(),
    )
    .with_retry_backoff(config.retry_backoff());
    let handle = capture.handle();
    let join = capture.spawn()?;
    Ok((handle, join))
}

/// Build the frame source named in `settings`
pub fn open_source(camera: CameraId, settings: &CameraSettings) -> Result<Box<dyn FrameSource>, PipelineError> {
    let (width, height) = settings.resolution();
    match &settings.source {
        SourceKind::SyntheticGrid => Ok(Box::new(StaticSource::tile_grid(width, height).with_fps(settings.fps))),
        SourceKind::SyntheticRect => Ok(Box::new(StaticSource::bright_rect(width, height).with_fps(settings.fps))),
        SourceKind::SyntheticUniform { value } => Ok(Box::new(
            StaticSource::uniform(width, height, *value).with_fps(settings.fps),
        )),
        SourceKind::SyntheticBar { step } => Ok(Box::new(
            DynamicBarSource::new(width, height)
                .with_step(*step)
                .with_fps(settings.fps),
        )),
        SourceKind::Device { path } => open_device(camera, path, settings),
    }
}

#[cfg(feature = "v4l2")]
fn open_device(camera: CameraId, path: &str, settings: &CameraSettings) -> Result<Box<dyn FrameSource>, PipelineError> {
    let config = camera_capture::CameraConfig {
        id: camera,
        device: path.to_string(),
        width: settings.width,
        height: settings.height,
        fps: settings.fps,
    };
    camera_capture::device::V4l2Source::open(config)
        .map(|source| Box::new(source) as Box<dyn FrameSource>)
        .map_err(|e| PipelineError::SourceOpen {
            camera,
            reason: e.to_string(),
        })
}

#[cfg(not(feature = "v4l2"))]
fn open_device(camera: CameraId, path: &str, _settings: &CameraSettings) -> Result<Box<dyn FrameSource>, PipelineError> {
    Err(PipelineError::SourceOpen {
        camera,
        reason: format!("{path}: built without the v4l2 feature"),
    })
}

/// Device-backed control when any camera is a device, in-memory otherwise
fn default_exposure(config: &PipelineConfig) -> Arc<dyn ExposureControl> {
    let devices: Vec<(CameraId, &str)> = CameraId::ALL
        .into_iter()
        .filter_map(|camera| match &config.camera(camera).source {
            SourceKind::Device { path } => Some((camera, path.as_str())),
            _ => None,
        })
        .collect();

    if devices.is_empty() {
        return Arc::new(RecordingExposure::default());
    }
    let control = devices
        .into_iter()
        .fold(V4l2Exposure::new(), |control, (camera, path)| control.with_device(camera, path));
    Arc::new(control)
}

/// Logs per-stage frame rates and escalates the loss of both cameras
struct Monitor {
    cam1: CaptureHandle,
    cam2: CaptureHandle,
    fusion: Arc<LatestSlot<FusionFrame>>,
    bell: Arc<Doorbell>,
    stop: StopToken,
    interval: Duration,
}

impl Monitor {
    fn counts(&self) -> [u64; 3] {
        [
            self.cam1.frames_captured(),
            self.cam2.frames_captured(),
            self.fusion.generation(),
        ]
    }

    fn run(self) {
        let mut last = self.counts();
        let mut last_at = Instant::now();

        while !self.stop.sleep(self.interval) {
            let now = self.counts();
            let secs = last_at.elapsed().as_secs_f64().max(f64::EPSILON);
            let fps = |i: usize| now[i].saturating_sub(last[i]) as f64 / secs;
            let (cam1_fps, cam2_fps, fusion_fps) = (fps(0), fps(1), fps(2));

            info!(cam1_fps, cam2_fps, fusion_fps, "Frame rates");
            metrics::gauge!("stage_fps", "stage" => "cam1").set(cam1_fps);
            metrics::gauge!("stage_fps", "stage" => "cam2").set(cam2_fps);
            metrics::gauge!("stage_fps", "stage" => "fusion").set(fusion_fps);

            last = now;
            last_at = Instant::now();

            if self.cam1.state() == LoopState::Stopped && self.cam2.state() == LoopState::Stopped {
                error!("All camera sources lost, stopping pipeline");
                self.stop.stop();
                self.bell.ring();
                break;
            }
        }
    }
}
