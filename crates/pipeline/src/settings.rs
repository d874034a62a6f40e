//! Pipeline configuration: TOML file plus `DUAL_FUSION__*` environment overrides

use std::path::Path;
use std::time::Duration;

use camera_capture::CameraId;
use config::{Config, Environment, File, FileFormat};
use exposure_tuner::TunerConfig;
use fusion::{CompositeMode, FusionConfig};
use saturation::ExtractorConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix; nested keys are separated by `__`
pub const ENV_PREFIX: &str = "DUAL_FUSION";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where a camera's frames come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceKind {
    /// Static checkerboard of saturated tiles
    SyntheticGrid,
    /// One saturated rectangle on a black frame
    SyntheticRect,
    /// Every pixel at `value`
    SyntheticUniform { value: u8 },
    /// Bar pattern sweeping across the frame
    SyntheticBar {
        #[serde(default = "default_bar_step")]
        step: u32,
    },
    /// V4L2 device node
    Device { path: String },
}

fn default_bar_step() -> u32 {
    3
}

/// Per-camera settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub source: SourceKind,
    pub width: u32,
    pub height: u32,
    /// Frame rate limit; 0 lets synthetic sources run free
    pub fps: u32,
    /// Contour color; defaults to blue for cam1, red for cam2
    pub overlay_color: Option<[u8; 3]>,
    pub line_width: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            source: SourceKind::SyntheticGrid,
            width: 1280,
            height: 720,
            fps: 30,
            overlay_color: None,
            line_width: 2,
        }
    }
}

impl CameraSettings {
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn color(&self, camera: CameraId) -> [u8; 3] {
        self.overlay_color.unwrap_or(match camera {
            CameraId::Cam1 => saturation::CAM1_COLOR,
            CameraId::Cam2 => saturation::CAM2_COLOR,
        })
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pixels at or above this are saturated
    pub threshold: u8,

    pub cam1: CameraSettings,
    pub cam2: CameraSettings,

    pub fusion: FusionConfig,
    pub tuner: TunerConfig,

    /// Wait before retrying a transient read failure (ms)
    pub retry_backoff_ms: u64,

    /// Frame rate report interval (ms)
    pub stats_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: 240,
            cam1: CameraSettings::default(),
            cam2: CameraSettings {
                source: SourceKind::SyntheticBar { step: default_bar_step() },
                ..CameraSettings::default()
            },
            fusion: FusionConfig::default(),
            tuner: TunerConfig::default(),
            retry_backoff_ms: 100,
            stats_interval_ms: 1000,
        }
    }
}

impl PipelineConfig {
    /// Load from an optional file plus environment overrides, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        Self::finish(builder)
    }

    /// Load from TOML text plus environment overrides, then validate
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Self::finish(Config::builder().add_source(File::from_str(text, FileFormat::Toml)))
    }

    fn finish(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self, ConfigError> {
        let loaded: PipelineConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn camera(&self, camera: CameraId) -> &CameraSettings {
        match camera {
            CameraId::Cam1 => &self.cam1,
            CameraId::Cam2 => &self.cam2,
        }
    }

    /// Extractor settings for one camera
    pub fn extractor(&self, camera: CameraId) -> ExtractorConfig {
        let settings = self.camera(camera);
        ExtractorConfig {
            threshold: self.threshold,
            overlay_color: settings.color(camera),
            line_width: settings.line_width,
        }
    }

    /// Fusion settings with the per-camera colors applied
    pub fn fusion_config(&self) -> FusionConfig {
        FusionConfig {
            cam1_color: self.cam1.color(CameraId::Cam1),
            cam2_color: self.cam2.color(CameraId::Cam2),
            ..self.fusion.clone()
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        for camera in CameraId::ALL {
            let settings = self.camera(camera);
            if settings.width == 0 || settings.height == 0 {
                return invalid(format!("{camera} resolution must be non-zero"));
            }
            if settings.line_width == 0 {
                return invalid(format!("{camera} line_width must be at least 1"));
            }
        }
        if self.cam1.resolution() != self.cam2.resolution() {
            return invalid(format!(
                "camera resolutions differ: cam1 {:?}, cam2 {:?}",
                self.cam1.resolution(),
                self.cam2.resolution()
            ));
        }
        let (dx, dy) = self.fusion.offset();
        let (width, height) = self.cam1.resolution();
        if dx.unsigned_abs() >= width || dy.unsigned_abs() >= height {
            return invalid(format!(
                "fusion offset ({dx}, {dy}) leaves no overlap at {width}x{height}"
            ));
        }
        if let CompositeMode::Blend { cam2_weight } = self.fusion.mode {
            if !(0.0..=1.0).contains(&cam2_weight) {
                return invalid(format!("blend cam2_weight {cam2_weight} outside 0.0..=1.0"));
            }
        }
        if self.fusion.line_width == 0 {
            return invalid("fusion line_width must be at least 1".into());
        }
        if self.tuner.candidates.is_empty() {
            return invalid("tuner needs at least one candidate".into());
        }
        let (min, max) = (self.tuner.min_coverage, self.tuner.max_coverage);
        if !(0.0..=1.0).contains(&min) || !(0.0..=1.0).contains(&max) || min > max {
            return invalid(format!("tuner coverage band [{min}, {max}] is not within 0.0..=1.0"));
        }
        if self.stats_interval_ms == 0 {
            return invalid("stats_interval_ms must be positive".into());
        }
        Ok(())
    }
}
