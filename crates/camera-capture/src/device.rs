//! Live V4L2 frame source
//!
//! Requests a `GREY` capture format and falls back to `YUYV` (luma only) when
//! the driver refuses it. Read errors are transient; a vanished device node is
//! reported as unavailable.

use std::path::Path;

use ouroboros::self_referencing;
use tracing::{info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::FourCC;

use crate::clock::monotonic_ns;
use crate::{CameraConfig, FrameSource, GrayFrame, SourceError};

/// Pixel layout delivered by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Grey,
    Yuyv,
}

#[self_referencing]
struct StreamState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

/// Frame source backed by a V4L2 device node
pub struct V4l2Source {
    config: CameraConfig,
    state: StreamState,
    layout: Layout,
    width: u32,
    height: u32,
    sequence: u64,
}

impl V4l2Source {
    /// Open and start streaming from `config.device`
    pub fn open(config: CameraConfig) -> Result<Self, SourceError> {
        let mut device = v4l::Device::with_path(&config.device)
            .map_err(|e| SourceError::Unavailable(format!("open {}: {}", config.device, e)))?;

        let mut format = device
            .format()
            .map_err(|e| SourceError::Unavailable(format!("read format: {}", e)))?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = FourCC::new(b"GREY");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                warn!("Failed to set format on {}: {}", config.device, err);
                device
                    .format()
                    .map_err(|e| SourceError::Unavailable(format!("read format: {}", e)))?
            }
        };

        let layout = match &format.fourcc.repr {
            b"GREY" => Layout::Grey,
            b"YUYV" => Layout::Yuyv,
            other => {
                return Err(SourceError::Unavailable(format!(
                    "unsupported pixel format {}",
                    String::from_utf8_lossy(other)
                )))
            }
        };

        if config.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.fps);
            if let Err(err) = device.set_params(&params) {
                warn!("Failed to set fps on {}: {}", config.device, err);
            }
        }

        let state = StreamStateTryBuilder {
            device,
            stream_builder: |device| v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 2),
        }
        .try_build()
        .map_err(|e| SourceError::Unavailable(format!("create buffer stream: {}", e)))?;

        info!(
            "Opened {} ({}x{}, {:?}) for {}",
            config.device, format.width, format.height, layout, config.id
        );

        Ok(Self {
            width: format.width,
            height: format.height,
            config,
            state,
            layout,
            sequence: 0,
        })
    }
}

// SAFETY: the mapped buffers are only touched through `&mut self`, and a
// source is owned by exactly one capture loop at a time.
unsafe impl Send for V4l2Source {}

impl FrameSource for V4l2Source {
    fn next_frame(&mut self) -> Result<GrayFrame, SourceError> {
        let (width, height, layout) = (self.width, self.height, self.layout);
        let result = self.state.with_stream_mut(|stream| {
            stream.next().map(|(buf, _meta)| match layout {
                Layout::Grey => GrayFrame::from_raw(buf.to_vec(), width, height, monotonic_ns(), 0),
                Layout::Yuyv => GrayFrame::from_yuyv(buf, width, height, monotonic_ns(), 0),
            })
        });

        match result {
            Ok(Some(mut frame)) => {
                self.sequence += 1;
                frame.sequence = self.sequence;
                Ok(frame)
            }
            Ok(None) => Err(SourceError::Transient("short frame buffer".to_string())),
            Err(err) if !Path::new(&self.config.device).exists() => {
                Err(SourceError::Unavailable(format!("{} removed: {}", self.config.device, err)))
            }
            Err(err) => Err(SourceError::Transient(err.to_string())),
        }
    }

    fn describe(&self) -> String {
        format!("{} ({}x{})", self.config.device, self.width, self.height)
    }
}
