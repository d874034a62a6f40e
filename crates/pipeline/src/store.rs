//! Latest-value frame cache for the dashboard

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use camera_capture::CameraId;
use fusion::FusionFrame;
use image::RgbImage;
use saturation::AnnotatedFrame;
use serde::{Deserialize, Serialize};

use crate::lock;

/// Which stream the dashboard shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Cam1,
    Cam2,
    #[default]
    Fusion,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViewMode::Cam1 => "cam1",
            ViewMode::Cam2 => "cam2",
            ViewMode::Fusion => "fusion",
        };
        f.write_str(name)
    }
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cam1" => Ok(ViewMode::Cam1),
            "cam2" => Ok(ViewMode::Cam2),
            "fusion" => Ok(ViewMode::Fusion),
            other => Err(format!("unknown view mode: {other}")),
        }
    }
}

impl From<CameraId> for ViewMode {
    fn from(camera: CameraId) -> Self {
        match camera {
            CameraId::Cam1 => ViewMode::Cam1,
            CameraId::Cam2 => ViewMode::Cam2,
        }
    }
}

/// A stored frame of either kind
#[derive(Debug, Clone)]
pub enum DisplayFrame {
    Camera(Arc<AnnotatedFrame>),
    Fusion(Arc<FusionFrame>),
}

impl DisplayFrame {
    /// RGB image with contours drawn
    pub fn overlay(&self) -> &RgbImage {
        match self {
            DisplayFrame::Camera(frame) => &frame.overlay,
            DisplayFrame::Fusion(frame) => &frame.overlay,
        }
    }

    pub fn timestamp_ns(&self) -> u64 {
        match self {
            DisplayFrame::Camera(frame) => frame.timestamp_ns(),
            DisplayFrame::Fusion(frame) => frame.fused_at_ns,
        }
    }
}

/// Consistent copy of the whole store
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub cam1: Option<Arc<AnnotatedFrame>>,
    pub cam2: Option<Arc<AnnotatedFrame>>,
    pub fusion: Option<Arc<FusionFrame>>,
    pub view: ViewMode,
}

impl StoreSnapshot {
    fn camera(&self, camera: CameraId) -> Option<Arc<AnnotatedFrame>> {
        match camera {
            CameraId::Cam1 => self.cam1.clone(),
            CameraId::Cam2 => self.cam2.clone(),
        }
    }

    fn select(&self, view: ViewMode) -> Option<DisplayFrame> {
        match view {
            ViewMode::Cam1 => self.cam1.clone().map(DisplayFrame::Camera),
            ViewMode::Cam2 => self.cam2.clone().map(DisplayFrame::Camera),
            ViewMode::Fusion => self.fusion.clone().map(DisplayFrame::Fusion),
        }
    }
}

/// Latest cam1, cam2 and fusion frames plus the view mode, under one mutex.
///
/// Every critical section is an `Arc` clone or swap.
#[derive(Debug, Default)]
pub struct SharedFrameStore {
    inner: Mutex<StoreSnapshot>,
}

impl SharedFrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_camera(&self, frame: Arc<AnnotatedFrame>) {
        let mut inner = lock(&self.inner);
        match frame.camera {
            CameraId::Cam1 => inner.cam1 = Some(frame),
            CameraId::Cam2 => inner.cam2 = Some(frame),
        }
    }

    pub fn update_fusion(&self, frame: Arc<FusionFrame>) {
        lock(&self.inner).fusion = Some(frame);
    }

    pub fn latest_camera(&self, camera: CameraId) -> Option<Arc<AnnotatedFrame>> {
        lock(&self.inner).camera(camera)
    }

    pub fn latest_fusion(&self) -> Option<Arc<FusionFrame>> {
        lock(&self.inner).fusion.clone()
    }

    /// Latest frame for `view`, regardless of the selected mode
    pub fn latest(&self, view: ViewMode) -> Option<DisplayFrame> {
        lock(&self.inner).select(view)
    }

    /// Latest frame for the selected mode, read under the same lock
    pub fn displayed(&self) -> Option<DisplayFrame> {
        let inner = lock(&self.inner);
        inner.select(inner.view)
    }

    pub fn view_mode(&self) -> ViewMode {
        lock(&self.inner).view
    }

    pub fn set_view_mode(&self, view: ViewMode) {
        lock(&self.inner).view = view;
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        lock(&self.inner).clone()
    }
}
