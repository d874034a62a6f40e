//! Exposure sweep and selection

use std::sync::Arc;
use std::thread;

use camera_capture::{ExposureControl, SourceError};
use saturation::SaturationExtractor;
use tracing::{debug, info, warn};

use crate::config::{TieBreak, TunerConfig};
use crate::result::{Sample, TuningQuality, TuningResult};
use crate::target::{PauseGuard, TuningTarget};

/// Pick the winning sample.
///
/// Lowest coverage inside the acceptance band is `Optimal`; failing that the
/// lowest coverage of any measured sample is `Degraded`.
pub fn select<'a>(samples: &'a [Sample], config: &TunerConfig) -> (Option<&'a Sample>, TuningQuality) {
    let measured: Vec<(&Sample, f64)> = samples
        .iter()
        .filter_map(|s| s.coverage().map(|c| (s, c)))
        .collect();
    if measured.is_empty() {
        return (None, TuningQuality::NoMeasurement);
    }

    let qualifying = measured.iter().filter(|(_, c)| config.accepts(*c)).copied();
    if let Some(best) = lowest(qualifying, config.tie_break) {
        return (Some(best), TuningQuality::Optimal);
    }
    (lowest(measured.into_iter(), config.tie_break), TuningQuality::Degraded)
}

fn lowest<'a>(samples: impl Iterator<Item = (&'a Sample, f64)>, tie_break: TieBreak) -> Option<&'a Sample> {
    let mut best: Option<(&Sample, f64)> = None;
    for (sample, coverage) in samples {
        let better = match best {
            None => true,
            Some((current, current_cov)) => {
                coverage < current_cov
                    || (coverage == current_cov
                        && tie_break == TieBreak::HigherSetting
                        && sample.setting > current.setting)
            }
        };
        if better {
            best = Some((sample, coverage));
        }
    }
    best.map(|(sample, _)| sample)
}

/// Runs exposure sweeps against one exposure control
pub struct ExposureTuner {
    config: TunerConfig,
    extractor: SaturationExtractor,
    control: Arc<dyn ExposureControl>,
}

impl ExposureTuner {
    pub fn new(config: TunerConfig, extractor: SaturationExtractor, control: Arc<dyn ExposureControl>) -> Self {
        Self {
            config,
            extractor,
            control,
        }
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    /// Sweep all candidates on `target` and leave the best one applied.
    ///
    /// The target is paused for the whole sweep and resumed on every exit.
    pub fn tune<T: TuningTarget + ?Sized>(&self, target: &T) -> TuningResult {
        let camera = target.camera();
        info!(
            camera = %camera,
            candidates = ?self.config.candidates,
            "Starting exposure sweep"
        );

        let _paused = PauseGuard::new(target);

        if let Err(e) = self.control.enable_manual(camera) {
            warn!(camera = %camera, error = %e, "Could not switch to manual exposure");
        }

        let mut samples = Vec::with_capacity(self.config.candidates.len());
        for &setting in &self.config.candidates {
            match self.sample(target, setting) {
                Ok(sample) => samples.push(sample),
                Err(reason) => {
                    warn!(camera = %camera, setting, %reason, "Device lost, ending sweep");
                    samples.push(Sample::skipped(setting, reason));
                    break;
                }
            }
        }

        let (selected, quality) = select(&samples, &self.config);
        let selected_setting = selected.map(|s| s.setting);
        let achieved_coverage = selected.and_then(Sample::coverage);

        if let Some(setting) = selected_setting {
            if let Err(e) = self.control.apply_exposure(camera, setting) {
                warn!(camera = %camera, setting, error = %e, "Could not re-apply selected exposure");
            }
        }

        metrics::counter!("exposure_sweeps_total", "camera" => camera.as_str()).increment(1);
        match quality {
            TuningQuality::Optimal => info!(
                camera = %camera,
                setting = ?selected_setting,
                coverage = ?achieved_coverage,
                "Exposure selected"
            ),
            TuningQuality::Degraded => warn!(
                camera = %camera,
                setting = ?selected_setting,
                coverage = ?achieved_coverage,
                "No candidate inside coverage band, using least saturated"
            ),
            TuningQuality::NoMeasurement => warn!(camera = %camera, "Exposure sweep measured nothing"),
        }

        TuningResult {
            camera,
            selected_setting,
            achieved_coverage,
            samples,
            quality,
        }
    }

    /// Try one candidate. `Err` means the device is gone.
    fn sample<T: TuningTarget + ?Sized>(&self, target: &T, setting: i32) -> Result<Sample, String> {
        let camera = target.camera();
        if let Err(e) = self.control.apply_exposure(camera, setting) {
            debug!(camera = %camera, setting, error = %e, "Candidate rejected");
            return Ok(Sample::skipped(setting, e.to_string()));
        }

        let delay = self.config.settle_delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        for _ in 0..self.config.settle_frames {
            match target.grab() {
                Ok(_) => {}
                Err(SourceError::Unavailable(reason)) => return Err(reason),
                Err(e) => return Ok(Sample::skipped(setting, format!("settle frame: {e}"))),
            }
        }

        match target.grab() {
            Ok(frame) => {
                let coverage = self.extractor.extract(&frame.image).mask.coverage();
                debug!(camera = %camera, setting, coverage, "Candidate measured");
                Ok(Sample::measured(setting, coverage))
            }
            Err(SourceError::Unavailable(reason)) => Err(reason),
            Err(e) => Ok(Sample::skipped(setting, e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::SampleOutcome;
    use camera_capture::{CameraId, GrayFrame, RecordingExposure};
    use image::{GrayImage, Luma};
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Target whose frames are saturated in proportion to the applied setting
    struct ScriptedTarget {
        control: Arc<RecordingExposure>,
        coverage: HashMap<i32, f64>,
        failing: Vec<i32>,
        unavailable_at: Option<i32>,
        pauses: AtomicU32,
        resumes: AtomicU32,
        grabs: Mutex<Vec<i32>>,
    }

    impl ScriptedTarget {
        fn new(control: Arc<RecordingExposure>, coverage: &[(i32, f64)]) -> Self {
            Self {
                control,
                coverage: coverage.iter().copied().collect(),
                failing: Vec::new(),
                unavailable_at: None,
                pauses: AtomicU32::new(0),
                resumes: AtomicU32::new(0),
                grabs: Mutex::new(Vec::new()),
            }
        }
    }

    impl TuningTarget for ScriptedTarget {
        fn camera(&self) -> CameraId {
            CameraId::Cam2
        }

        fn pause(&self) -> bool {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn resume(&self) -> bool {
            self.resumes.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn grab(&self) -> Result<GrayFrame, SourceError> {
            let setting = self.control.current_exposure(CameraId::Cam2).unwrap_or(0);
            self.grabs.lock().unwrap().push(setting);
            if self.unavailable_at == Some(setting) {
                return Err(SourceError::Unavailable("unplugged".into()));
            }
            if self.failing.contains(&setting) {
                return Err(SourceError::Transient("timeout".into()));
            }
            // 100 pixels, the first `coverage * 100` saturated
            let bright = (self.coverage.get(&setting).copied().unwrap_or(0.0) * 100.0).round() as u32;
            let image = GrayImage::from_fn(10, 10, |x, y| Luma([if y * 10 + x < bright { 255 } else { 20 }]));
            Ok(GrayFrame::new(image, 0, 0))
        }
    }

    fn tuner(control: Arc<RecordingExposure>, candidates: Vec<i32>) -> ExposureTuner {
        let config = TunerConfig {
            candidates,
            settle_delay_ms: 0,
            settle_frames: 1,
            min_coverage: 0.02,
            max_coverage: 1.0,
            tie_break: TieBreak::FirstTried,
        };
        ExposureTuner::new(config, SaturationExtractor::default(), control)
    }

    #[test]
    fn test_selects_lowest_coverage_above_floor() {
        let control = Arc::new(RecordingExposure::default());
        let (low, mid, high) = (5, 50, 500);
        let target = ScriptedTarget::new(Arc::clone(&control), &[(low, 0.01), (mid, 0.10), (high, 0.60)]);

        let result = tuner(Arc::clone(&control), vec![low, mid, high]).tune(&target);

        assert_eq!(result.selected_setting, Some(mid));
        assert_eq!(result.quality, TuningQuality::Optimal);
        assert!((result.achieved_coverage.unwrap() - 0.10).abs() < 1e-9);
        assert_eq!(result.samples.len(), 3);
        assert_eq!(control.current_exposure(CameraId::Cam2), Some(mid));
        assert!(control.is_manual(CameraId::Cam2));
        assert_eq!(target.pauses.load(Ordering::SeqCst), 1);
        assert_eq!(target.resumes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_settle_frames_are_discarded() {
        let control = Arc::new(RecordingExposure::default());
        let target = ScriptedTarget::new(Arc::clone(&control), &[(10, 0.5)]);
        let mut tuner = tuner(Arc::clone(&control), vec![10]);
        tuner.config.settle_frames = 3;
        tuner.tune(&target);
        assert_eq!(*target.grabs.lock().unwrap(), vec![10, 10, 10, 10]);
    }

    #[test]
    fn test_degraded_when_nothing_qualifies() {
        let control = Arc::new(RecordingExposure::default());
        let target = ScriptedTarget::new(Arc::clone(&control), &[(5, 0.01), (10, 0.0)]);

        let result = tuner(Arc::clone(&control), vec![5, 10]).tune(&target);

        assert_eq!(result.quality, TuningQuality::Degraded);
        assert_eq!(result.selected_setting, Some(10));
    }

    #[test]
    fn test_rejected_and_failed_candidates_are_skipped() {
        let control = Arc::new(RecordingExposure::new(1..=1000));
        let mut target = ScriptedTarget::new(Arc::clone(&control), &[(50, 0.2), (100, 0.3)]);
        target.failing.push(100);

        let result = tuner(Arc::clone(&control), vec![9000, 100, 50]).tune(&target);

        assert!(matches!(result.samples[0].outcome, SampleOutcome::Skipped { .. }));
        assert!(matches!(result.samples[1].outcome, SampleOutcome::Skipped { .. }));
        assert_eq!(result.samples[2], Sample::measured(50, 0.2));
        assert_eq!(result.selected_setting, Some(50));
    }

    #[test]
    fn test_unavailable_ends_sweep_and_resumes() {
        let control = Arc::new(RecordingExposure::default());
        let mut target = ScriptedTarget::new(Arc::clone(&control), &[(200, 0.4), (100, 0.3), (50, 0.2)]);
        target.unavailable_at = Some(100);

        let result = tuner(Arc::clone(&control), vec![200, 100, 50]).tune(&target);

        assert_eq!(result.samples.len(), 2);
        assert_eq!(result.selected_setting, Some(200));
        assert_eq!(target.resumes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_measurement() {
        let control = Arc::new(RecordingExposure::new(1..=10));
        let target = ScriptedTarget::new(Arc::clone(&control), &[]);

        let result = tuner(Arc::clone(&control), vec![100, 200]).tune(&target);

        assert_eq!(result.quality, TuningQuality::NoMeasurement);
        assert_eq!(result.selected_setting, None);
        assert_eq!(result.achieved_coverage, None);
        assert_eq!(target.resumes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tie_break() {
        let samples = vec![Sample::measured(10, 0.1), Sample::measured(30, 0.1), Sample::measured(20, 0.1)];
        let mut config = TunerConfig::default();
        assert_eq!(select(&samples, &config).0.map(|s| s.setting), Some(10));
        config.tie_break = TieBreak::HigherSetting;
        assert_eq!(select(&samples, &config).0.map(|s| s.setting), Some(30));
    }

    #[test]
    fn test_ceiling_excludes_candidates() {
        let samples = vec![Sample::measured(10, 0.3), Sample::measured(20, 0.5)];
        let config = TunerConfig {
            max_coverage: 0.2,
            ..Default::default()
        };
        let (selected, quality) = select(&samples, &config);
        assert_eq!(quality, TuningQuality::Degraded);
        assert_eq!(selected.map(|s| s.setting), Some(10));
    }

    #[tokio::test]
    async fn test_tune_from_async_caller() {
        let control = Arc::new(RecordingExposure::default());
        let target = ScriptedTarget::new(Arc::clone(&control), &[(30, 0.05)]);
        let tuner = tuner(Arc::clone(&control), vec![30]);

        let result = tokio::task::spawn_blocking(move || tuner.tune(&target))
            .await
            .unwrap();
        assert_eq!(result.selected_setting, Some(30));
    }

    proptest! {
        #[test]
        fn prop_optimal_is_minimal_in_band(
            coverages in proptest::collection::vec(0.0f64..1.0, 1..12),
        ) {
            let samples: Vec<Sample> = coverages
                .iter()
                .enumerate()
                .map(|(i, &c)| Sample::measured(i as i32, c))
                .collect();
            let config = TunerConfig::default();
            let (selected, quality) = select(&samples, &config);
            let chosen = selected.and_then(Sample::coverage).unwrap();
            match quality {
                TuningQuality::Optimal => {
                    prop_assert!(config.accepts(chosen));
                    prop_assert!(coverages.iter().filter(|c| config.accepts(**c)).all(|c| chosen <= *c));
                }
                TuningQuality::Degraded => {
                    prop_assert!(coverages.iter().all(|c| !config.accepts(*c)));
                    prop_assert!(coverages.iter().all(|c| chosen <= *c));
                }
                TuningQuality::NoMeasurement => prop_assert!(false),
            }
        }
    }
}
