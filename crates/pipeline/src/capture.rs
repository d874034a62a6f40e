//! Per-camera capture loop

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camera_capture::{CameraId, FrameSource, GrayFrame, SourceError};
use exposure_tuner::TuningTarget;
use handoff::{LatestSlot, StopToken};
use saturation::{AnnotatedFrame, SaturationExtractor};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::control::{LoopControl, LoopState};
use crate::{lock, PipelineError};

/// Longest single wait while paused, so a stop is seen promptly
const PAUSE_POLL: Duration = Duration::from_millis(50);

type SharedSource = Arc<Mutex<Option<Box<dyn FrameSource>>>>;

/// Fatal capture loop outcome
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("{camera} device unavailable: {reason}")]
    DeviceUnavailable { camera: CameraId, reason: String },
}

/// Counters returned when a loop ends cleanly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSummary {
    pub camera: CameraId,
    pub frames: u64,
    pub transient_errors: u64,
}

/// Pulls frames from one source, annotates them and publishes to a slot
pub struct CaptureLoop {
    camera: CameraId,
    source: SharedSource,
    extractor: SaturationExtractor,
    slot: Arc<LatestSlot<AnnotatedFrame>>,
    control: Arc<LoopControl>,
    stop: StopToken,
    retry_backoff: Duration,
    frames: Arc<AtomicU64>,
    sweep: Arc<Mutex<()>>,
    transient_errors: u64,
}

impl CaptureLoop {
    pub fn new(
        camera: CameraId,
        source: Box<dyn FrameSource>,
        extractor: SaturationExtractor,
        slot: Arc<LatestSlot<AnnotatedFrame>>,
        stop: StopToken,
    ) -> Self {
        Self {
            camera,
            source: Arc::new(Mutex::new(Some(source))),
            extractor,
            slot,
            control: Arc::new(LoopControl::new()),
            stop,
            retry_backoff: Duration::from_millis(100),
            frames: Arc::new(AtomicU64::new(0)),
            sweep: Arc::new(Mutex::new(())),
            transient_errors: 0,
        }
    }

    /// Wait between retries after a transient read failure
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Control handle; stays valid after the loop ends
    pub fn handle(&self) -> CaptureHandle {
        CaptureHandle {
            camera: self.camera,
            source: Arc::clone(&self.source),
            control: Arc::clone(&self.control),
            frames: Arc::clone(&self.frames),
            sweep: Arc::clone(&self.sweep),
        }
    }

    /// Run on a named thread
    pub fn spawn(self) -> Result<JoinHandle<Result<CaptureSummary, CaptureError>>, PipelineError> {
        let name = format!("capture-{}", self.camera);
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || self.run())
            .map_err(|source| PipelineError::Spawn { name, source })
    }

    /// Capture until stopped or the device goes away
    pub fn run(mut self) -> Result<CaptureSummary, CaptureError> {
        let describe = lock(&self.source)
            .as_ref()
            .map(|s| s.describe())
            .unwrap_or_default();
        info!(camera = %self.camera, source = %describe, "Capture loop started");

        let outcome = self.capture();

        self.control.stop();
        lock(&self.source).take();

        match &outcome {
            Ok(summary) => info!(
                camera = %self.camera,
                frames = summary.frames,
                transient_errors = summary.transient_errors,
                "Capture loop stopped"
            ),
            Err(e) => error!(camera = %self.camera, error = %e, "Capture loop ended"),
        }
        outcome
    }

    fn capture(&mut self) -> Result<CaptureSummary, CaptureError> {
        loop {
            if self.stop.is_stopped() {
                break;
            }
            match self.control.wait_while_paused(PAUSE_POLL) {
                LoopState::Stopped => break,
                LoopState::Paused => continue,
                LoopState::Running => {}
            }

            let read = {
                let mut source = lock(&self.source);
                // A pause may have landed while waiting for the source
                if self.control.state() != LoopState::Running {
                    continue;
                }
                match source.as_mut() {
                    Some(source) => source.next_frame(),
                    None => break,
                }
            };

            match read {
                Ok(frame) => self.publish(frame),
                Err(SourceError::Transient(reason)) => {
                    self.transient_errors += 1;
                    metrics::counter!("capture_errors_total", "camera" => self.camera.as_str()).increment(1);
                    warn!(camera = %self.camera, %reason, "Transient capture failure, retrying");
                    if self.stop.sleep(self.retry_backoff) {
                        break;
                    }
                }
                Err(SourceError::Unavailable(reason)) => {
                    return Err(CaptureError::DeviceUnavailable {
                        camera: self.camera,
                        reason,
                    });
                }
            }
        }

        Ok(CaptureSummary {
            camera: self.camera,
            frames: self.frames.load(Ordering::Relaxed),
            transient_errors: self.transient_errors,
        })
    }

    fn publish(&self, frame: GrayFrame) {
        let annotated = self.extractor.annotate(self.camera, frame);
        debug!(
            camera = %self.camera,
            sequence = annotated.sequence(),
            contours = annotated.contours.len(),
            "Frame published"
        );
        self.slot.publish(annotated);
        self.frames.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("capture_frames_total", "camera" => self.camera.as_str()).increment(1);
    }
}

/// Cloneable control and tuning access to a capture loop
#[derive(Clone)]
pub struct CaptureHandle {
    camera: CameraId,
    source: SharedSource,
    control: Arc<LoopControl>,
    frames: Arc<AtomicU64>,
    sweep: Arc<Mutex<()>>,
}

impl CaptureHandle {
    pub fn camera(&self) -> CameraId {
        self.camera
    }

    pub fn state(&self) -> LoopState {
        self.control.state()
    }

    /// Stop pulling frames; the last published frame stays visible
    pub fn pause(&self) -> bool {
        let changed = self.control.pause();
        if changed {
            info!(camera = %self.camera, "Capture paused");
        }
        changed
    }

    pub fn resume(&self) -> bool {
        let changed = self.control.resume();
        if changed {
            info!(camera = %self.camera, "Capture resumed");
        }
        changed
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    /// Frames published so far
    pub fn frames_captured(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Held for the whole of an exposure sweep; one sweep per camera at a time
    pub fn exclusive_sweep(&self) -> MutexGuard<'_, ()> {
        lock(&self.sweep)
    }
}

impl TuningTarget for CaptureHandle {
    fn camera(&self) -> CameraId {
        self.camera
    }

    fn pause(&self) -> bool {
        CaptureHandle::pause(self)
    }

    fn resume(&self) -> bool {
        CaptureHandle::resume(self)
    }

    fn grab(&self) -> Result<GrayFrame, SourceError> {
        let mut source = lock(&self.source);
        match source.as_mut() {
            Some(source) => source.next_frame(),
            None => Err(SourceError::Unavailable(format!("{} capture loop has released its source", self.camera))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::collections::VecDeque;
    use std::time::Instant;

    /// Replays scripted results, then repeats a dark frame
    struct ScriptedSource {
        script: VecDeque<Result<u8, SourceError>>,
        sequence: u64,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<u8, SourceError>>) -> Self {
            Self {
                script: script.into(),
                sequence: 0,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<GrayFrame, SourceError> {
            thread::sleep(Duration::from_millis(2));
            let value = self.script.pop_front().unwrap_or(Ok(10))?;
            self.sequence += 1;
            Ok(GrayFrame::new(
                GrayImage::from_pixel(8, 8, Luma([value])),
                camera_capture::clock::monotonic_ns(),
                self.sequence,
            ))
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    fn capture_loop(source: ScriptedSource) -> (CaptureLoop, Arc<LatestSlot<AnnotatedFrame>>, StopToken) {
        let slot = Arc::new(LatestSlot::new());
        let stop = StopToken::new();
        let capture = CaptureLoop::new(
            CameraId::Cam1,
            Box::new(source),
            SaturationExtractor::default(),
            Arc::clone(&slot),
            stop.clone(),
        )
        .with_retry_backoff(Duration::from_millis(5));
        (capture, slot, stop)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_publishes_annotated_frames() {
        let (capture, slot, stop) = capture_loop(ScriptedSource::new(vec![Ok(255)]));
        let handle = capture.handle();
        let join = capture.spawn().unwrap();

        assert!(wait_for(|| handle.frames_captured() >= 3));
        stop.stop();
        let summary = join.join().unwrap().unwrap();

        assert!(summary.frames >= 3);
        let latest = slot.latest().unwrap();
        assert_eq!(latest.value.camera, CameraId::Cam1);
        assert_eq!(handle.state(), LoopState::Stopped);
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let script = vec![
            Err(SourceError::Transient("timeout".into())),
            Err(SourceError::Transient("timeout".into())),
            Ok(200),
        ];
        let (capture, _slot, stop) = capture_loop(ScriptedSource::new(script));
        let handle = capture.handle();
        let join = capture.spawn().unwrap();

        assert!(wait_for(|| handle.frames_captured() >= 1));
        stop.stop();
        let summary = join.join().unwrap().unwrap();
        assert_eq!(summary.transient_errors, 2);
    }

    #[test]
    fn test_unavailable_stops_loop() {
        let script = vec![Ok(100), Err(SourceError::Unavailable("unplugged".into()))];
        let (capture, slot, _stop) = capture_loop(ScriptedSource::new(script));
        let handle = capture.handle();
        let outcome = capture.spawn().unwrap().join().unwrap();

        assert_eq!(
            outcome,
            Err(CaptureError::DeviceUnavailable {
                camera: CameraId::Cam1,
                reason: "unplugged".into()
            })
        );
        assert_eq!(handle.state(), LoopState::Stopped);
        assert_eq!(slot.generation(), 1);
        assert!(matches!(handle.grab(), Err(SourceError::Unavailable(_))));
    }

    #[test]
    fn test_pause_holds_publishing_then_resumes() {
        let (capture, slot, stop) = capture_loop(ScriptedSource::new(Vec::new()));
        let handle = capture.handle();
        let join = capture.spawn().unwrap();

        assert!(wait_for(|| slot.generation() >= 2));
        assert!(handle.pause());
        // At most the in-flight read lands after pause
        let at_pause = slot.generation();
        thread::sleep(Duration::from_millis(50));
        assert!(slot.generation() <= at_pause + 1);
        assert!(!slot.is_empty());

        // Direct reads while paused go to the tuner, not the slot
        let before = slot.generation();
        assert!(handle.grab().is_ok());
        assert_eq!(slot.generation(), before);

        assert!(handle.resume());
        assert_eq!(handle.state(), LoopState::Running);
        assert!(wait_for(|| slot.generation() > before + 2));

        stop.stop();
        join.join().unwrap().unwrap();
    }

    #[test]
    fn test_stop_while_paused() {
        let (capture, _slot, _stop) = capture_loop(ScriptedSource::new(Vec::new()));
        let handle = capture.handle();
        let join = capture.spawn().unwrap();

        handle.pause();
        handle.stop();
        assert!(join.join().unwrap().is_ok());
        assert_eq!(handle.state(), LoopState::Stopped);
    }
}
