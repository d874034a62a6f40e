//! Exposure control for live devices
//!
//! The tuner only needs "apply this exposure to that camera". The V4L2
//! implementation talks to the driver through `VIDIOC_S_CTRL`; the recording
//! implementation keeps settings in memory for synthetic runs and tests.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::CameraId;

/// Exposure error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExposureError {
    #[error("No device configured for {0}")]
    UnknownCamera(CameraId),

    #[error("Failed to open {device}: {reason}")]
    Open { device: String, reason: String },

    #[error("Device rejected exposure {value} on {camera}: {reason}")]
    Rejected {
        camera: CameraId,
        value: i32,
        reason: String,
    },
}

/// Device exposure capability.
///
/// Fire-and-forget: success means the driver accepted the request, not that
/// the sensor has already switched. The effect is observed through later
/// frames.
pub trait ExposureControl: Send + Sync {
    /// Request an absolute exposure setting
    fn apply_exposure(&self, camera: CameraId, setting: i32) -> Result<(), ExposureError>;

    /// Currently active setting, if the device can report it
    fn current_exposure(&self, _camera: CameraId) -> Option<i32> {
        None
    }

    /// Switch the device to manual exposure so absolute values take effect
    fn enable_manual(&self, _camera: CameraId) -> Result<(), ExposureError> {
        Ok(())
    }
}

// ===== V4L2 control IDs (camera class) =====

const V4L2_CID_CAMERA_CLASS_BASE: u32 = 0x009a0000 | 0x900;
/// Exposure mode menu
pub const V4L2_CID_EXPOSURE_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 1;
/// Absolute exposure time
pub const V4L2_CID_EXPOSURE_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 2;
/// Manual exposure time and iris
pub const V4L2_EXPOSURE_MANUAL: i32 = 1;

const VIDIOC_G_CTRL: libc::c_ulong = 0xC008561B;
const VIDIOC_S_CTRL: libc::c_ulong = 0xC008561C;

/// V4L2 control get/set structure
#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

/// Exposure control through V4L2 device nodes
#[derive(Debug, Clone)]
pub struct V4l2Exposure {
    devices: HashMap<CameraId, String>,
}

impl V4l2Exposure {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
        }
    }

    /// Map a camera to its device node (e.g., "/dev/video0")
    pub fn with_device(mut self, camera: CameraId, device: impl Into<String>) -> Self {
        self.devices.insert(camera, device.into());
        self
    }

    fn device(&self, camera: CameraId) -> Result<&str, ExposureError> {
        self.devices
            .get(&camera)
            .map(String::as_str)
            .ok_or(ExposureError::UnknownCamera(camera))
    }

    fn set_control(&self, camera: CameraId, control_id: u32, value: i32) -> Result<(), ExposureError> {
        use std::os::unix::io::AsRawFd;

        let device = self.device(camera)?;
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .map_err(|e| ExposureError::Open {
                device: device.to_string(),
                reason: e.to_string(),
            })?;

        let mut ctrl = V4l2Control { id: control_id, value };
        // SAFETY: fd is valid for the lifetime of `file`, ctrl matches struct v4l2_control
        let result = unsafe { libc::ioctl(file.as_raw_fd(), VIDIOC_S_CTRL as _, &mut ctrl as *mut V4l2Control) };

        if result < 0 {
            let errno = std::io::Error::last_os_error();
            warn!(device, control_id, value, ?errno, "Failed to set V4L2 control");
            return Err(ExposureError::Rejected {
                camera,
                value,
                reason: errno.to_string(),
            });
        }

        if ctrl.value != value {
            debug!(device, control_id, requested = value, actual = ctrl.value, "V4L2 control value was clamped");
        }
        Ok(())
    }

    fn get_control(&self, camera: CameraId, control_id: u32) -> Option<i32> {
        use std::os::unix::io::AsRawFd;

        let device = self.device(camera).ok()?;
        let file = std::fs::File::open(device).ok()?;
        let mut ctrl = V4l2Control { id: control_id, value: 0 };
        // SAFETY: see set_control
        let result = unsafe { libc::ioctl(file.as_raw_fd(), VIDIOC_G_CTRL as _, &mut ctrl as *mut V4l2Control) };
        (result >= 0).then_some(ctrl.value)
    }
}

impl Default for V4l2Exposure {
    fn default() -> Self {
        Self::new()
    }
}

impl ExposureControl for V4l2Exposure {
    fn apply_exposure(&self, camera: CameraId, setting: i32) -> Result<(), ExposureError> {
        self.set_control(camera, V4L2_CID_EXPOSURE_ABSOLUTE, setting)?;
        info!("Set exposure to {} on {}", setting, camera);
        Ok(())
    }

    fn current_exposure(&self, camera: CameraId) -> Option<i32> {
        self.get_control(camera, V4L2_CID_EXPOSURE_ABSOLUTE)
    }

    fn enable_manual(&self, camera: CameraId) -> Result<(), ExposureError> {
        self.set_control(camera, V4L2_CID_EXPOSURE_AUTO, V4L2_EXPOSURE_MANUAL)
    }
}

/// In-memory exposure control.
///
/// Accepts any value inside `range`, remembers the last accepted value per
/// camera, and keeps the full request history.
#[derive(Debug)]
pub struct RecordingExposure {
    range: RangeInclusive<i32>,
    state: Mutex<RecordingState>,
}

#[derive(Debug, Default)]
struct RecordingState {
    current: HashMap<CameraId, i32>,
    history: Vec<(CameraId, i32)>,
    manual: Vec<CameraId>,
}

impl RecordingExposure {
    pub fn new(range: RangeInclusive<i32>) -> Self {
        Self {
            range,
            state: Mutex::new(RecordingState::default()),
        }
    }

    /// Every accepted (camera, setting) request in order
    pub fn history(&self) -> Vec<(CameraId, i32)> {
        self.lock().history.clone()
    }

    /// Whether manual mode was requested for `camera`
    pub fn is_manual(&self, camera: CameraId) -> bool {
        self.lock().manual.contains(&camera)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for RecordingExposure {
    fn default() -> Self {
        Self::new(1..=5000)
    }
}

impl ExposureControl for RecordingExposure {
    fn apply_exposure(&self, camera: CameraId, setting: i32) -> Result<(), ExposureError> {
        if !self.range.contains(&setting) {
            return Err(ExposureError::Rejected {
                camera,
                value: setting,
                reason: format!("outside {:?}", self.range),
            });
        }
        let mut state = self.lock();
        state.current.insert(camera, setting);
        state.history.push((camera, setting));
        debug!("Recorded exposure {} on {}", setting, camera);
        Ok(())
    }

    fn current_exposure(&self, camera: CameraId) -> Option<i32> {
        self.lock().current.get(&camera).copied()
    }

    fn enable_manual(&self, camera: CameraId) -> Result<(), ExposureError> {
        let mut state = self.lock();
        if !state.manual.contains(&camera) {
            state.manual.push(camera);
        }
        Ok(())
    }
}
