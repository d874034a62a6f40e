//! Fusion loop over the camera hand-off slots

use std::sync::Arc;
use std::time::Duration;

use handoff::{Doorbell, LatestSlot, StopToken};
use saturation::AnnotatedFrame;
use tracing::{debug, info, warn};

use crate::fuser::{FusionFrame, Fuser};
use crate::FusionError;

/// Upper bound on one idle wait, so a stop is seen promptly
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Outcome of one [`FusionStage::poll_once`]
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// At least one camera has not published yet
    NoInput,
    /// The current generation pair was already evaluated
    AlreadyEvaluated,
    /// The pair produced no frame
    Rejected(FusionError),
    /// A fusion frame was published with this output generation
    Published(u64),
}

/// Fusion loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionStats {
    pub pairs_evaluated: u64,
    pub published: u64,
    pub skew_rejected: u64,
    pub geometry_rejected: u64,
}

/// Consumes the two camera slots and publishes fusion frames
pub struct FusionStage {
    fuser: Fuser,
    cam1: Arc<LatestSlot<AnnotatedFrame>>,
    cam2: Arc<LatestSlot<AnnotatedFrame>>,
    output: Arc<LatestSlot<FusionFrame>>,
    /// Rung by both camera slots
    bell: Arc<Doorbell>,
    /// Last (cam1, cam2) generation pair evaluated
    last_pair: Option<(u64, u64)>,
    stats: FusionStats,
}

impl FusionStage {
    pub fn new(
        fuser: Fuser,
        cam1: Arc<LatestSlot<AnnotatedFrame>>,
        cam2: Arc<LatestSlot<AnnotatedFrame>>,
        bell: Arc<Doorbell>,
        output: Arc<LatestSlot<FusionFrame>>,
    ) -> Self {
        Self {
            fuser,
            cam1,
            cam2,
            output,
            bell,
            last_pair: None,
            stats: FusionStats::default(),
        }
    }

    pub fn stats(&self) -> FusionStats {
        self.stats
    }

    /// Evaluate the current pair of latest frames once
    pub fn poll_once(&mut self) -> Step {
        let (Some(cam1), Some(cam2)) = (self.cam1.latest(), self.cam2.latest()) else {
            return Step::NoInput;
        };
        let pair = (cam1.generation, cam2.generation);
        if self.last_pair == Some(pair) {
            return Step::AlreadyEvaluated;
        }
        self.last_pair = Some(pair);
        self.stats.pairs_evaluated += 1;

        match self.fuser.fuse(&cam1.value, &cam2.value) {
            Ok(frame) => {
                self.output.publish(frame);
                self.stats.published += 1;
                metrics::counter!("fusion_frames_total").increment(1);
                Step::Published(self.output.generation())
            }
            Err(err) => {
                match &err {
                    FusionError::SkewExceeded { skew, tolerance } => {
                        self.stats.skew_rejected += 1;
                        debug!(?skew, ?tolerance, cam1_gen = pair.0, cam2_gen = pair.1, "Pair out of sync");
                    }
                    FusionError::GeometryMismatch { .. } | FusionError::NoOverlap { .. } => {
                        self.stats.geometry_rejected += 1;
                        warn!(error = %err, "Pair rejected");
                    }
                }
                metrics::counter!("fusion_pairs_rejected_total", "reason" => err.reason()).increment(1);
                Step::Rejected(err)
            }
        }
    }

    /// Run until `stop` is signalled, returning the final counters
    pub fn run(mut self, stop: StopToken) -> FusionStats {
        info!(
            skew_tolerance_ms = self.fuser.config().skew_tolerance_ms,
            offset = ?self.fuser.config().offset(),
            "Fusion stage started"
        );

        while !stop.is_stopped() {
            let rung = self.bell.current();
            if let Step::Published(_) = self.poll_once() {
                continue;
            }
            self.bell.wait_past(rung, IDLE_WAIT);
        }

        info!(
            published = self.stats.published,
            skew_rejected = self.stats.skew_rejected,
            geometry_rejected = self.stats.geometry_rejected,
            "Fusion stage stopped"
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FusionConfig;
    use camera_capture::{clock::ms_to_ns, CameraId, GrayFrame};
    use image::{GrayImage, Luma};
    use saturation::{ExtractorConfig, SaturationExtractor};
    use std::thread;

    struct Rig {
        cam1: Arc<LatestSlot<AnnotatedFrame>>,
        cam2: Arc<LatestSlot<AnnotatedFrame>>,
        bell: Arc<Doorbell>,
        output: Arc<LatestSlot<FusionFrame>>,
    }

    impl Rig {
        fn new() -> Self {
            let bell = Arc::new(Doorbell::new());
            Self {
                cam1: Arc::new(LatestSlot::with_doorbell(Arc::clone(&bell))),
                cam2: Arc::new(LatestSlot::with_doorbell(Arc::clone(&bell))),
                bell,
                output: Arc::new(LatestSlot::new()),
            }
        }

        fn stage(&self) -> FusionStage {
            FusionStage::new(
                Fuser::new(FusionConfig::default()),
                Arc::clone(&self.cam1),
                Arc::clone(&self.cam2),
                Arc::clone(&self.bell),
                Arc::clone(&self.output),
            )
        }
    }

    fn frame(camera: CameraId, value: u8, at_ms: u64) -> AnnotatedFrame {
        SaturationExtractor::new(ExtractorConfig::with_threshold(200))
            .annotate(camera, GrayFrame::new(GrayImage::from_pixel(16, 12, Luma([value])), ms_to_ns(at_ms), 0))
    }

    #[test]
    fn test_waits_for_both_cameras() {
        let rig = Rig::new();
        let mut stage = rig.stage();
        assert_eq!(stage.poll_once(), Step::NoInput);
        rig.cam1.publish(frame(CameraId::Cam1, 255, 1000));
        assert_eq!(stage.poll_once(), Step::NoInput);
    }

    #[test]
    fn test_pair_evaluated_once() {
        let rig = Rig::new();
        let mut stage = rig.stage();
        rig.cam1.publish(frame(CameraId::Cam1, 255, 1000));
        rig.cam2.publish(frame(CameraId::Cam2, 50, 1020));

        assert_eq!(stage.poll_once(), Step::Published(1));
        assert_eq!(stage.poll_once(), Step::AlreadyEvaluated);
        assert_eq!(rig.output.generation(), 1);

        rig.cam2.publish(frame(CameraId::Cam2, 50, 1030));
        assert_eq!(stage.poll_once(), Step::Published(2));
        assert_eq!(stage.stats().pairs_evaluated, 2);
    }

    #[test]
    fn test_out_of_sync_pair_leaves_output_unchanged() {
        let rig = Rig::new();
        let mut stage = rig.stage();
        rig.cam1.publish(frame(CameraId::Cam1, 255, 1000));
        rig.cam2.publish(frame(CameraId::Cam2, 50, 1020));
        assert_eq!(stage.poll_once(), Step::Published(1));

        rig.cam2.publish(frame(CameraId::Cam2, 50, 1100));
        assert!(matches!(stage.poll_once(), Step::Rejected(FusionError::SkewExceeded { .. })));
        assert_eq!(rig.output.generation(), 1);
        assert_eq!(stage.stats().skew_rejected, 1);

        // A fresh cam1 frame brings the pair back in sync
        rig.cam1.publish(frame(CameraId::Cam1, 255, 1090));
        assert_eq!(stage.poll_once(), Step::Published(2));
    }

    #[test]
    fn test_run_publishes_and_stops() {
        let rig = Rig::new();
        let stop = StopToken::new();
        let stage = rig.stage();
        let handle = {
            let stop = stop.clone();
            thread::spawn(move || stage.run(stop))
        };

        rig.cam1.publish(frame(CameraId::Cam1, 255, 1000));
        rig.cam2.publish(frame(CameraId::Cam2, 50, 1010));

        let mut waited = 0;
        while rig.output.is_empty() && waited < 200 {
            thread::sleep(Duration::from_millis(10));
            waited += 1;
        }
        stop.stop();
        rig.bell.ring();

        let stats = handle.join().unwrap();
        assert_eq!(stats.published, 1);
        let fused = rig.output.latest().unwrap();
        assert!(fused.value.composite.pixels().all(|p| p.0[0] == 50));
    }
}
