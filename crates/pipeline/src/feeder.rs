//! Copies new hand-off generations into the frame store

use std::sync::Arc;
use std::time::Duration;

use fusion::FusionFrame;
use handoff::{Doorbell, LatestSlot, StopToken};
use saturation::AnnotatedFrame;
use tracing::{debug, info};

use crate::store::SharedFrameStore;

const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Mirrors the cam1, cam2 and fusion slots into a [`SharedFrameStore`]
pub struct StoreFeeder {
    cam1: Arc<LatestSlot<AnnotatedFrame>>,
    cam2: Arc<LatestSlot<AnnotatedFrame>>,
    fusion: Arc<LatestSlot<FusionFrame>>,
    /// Rung by all three slots
    bell: Arc<Doorbell>,
    store: Arc<SharedFrameStore>,
    /// Last generation copied from cam1, cam2, fusion
    seen: [u64; 3],
}

impl StoreFeeder {
    pub fn new(
        cam1: Arc<LatestSlot<AnnotatedFrame>>,
        cam2: Arc<LatestSlot<AnnotatedFrame>>,
        fusion: Arc<LatestSlot<FusionFrame>>,
        bell: Arc<Doorbell>,
        store: Arc<SharedFrameStore>,
    ) -> Self {
        Self {
            cam1,
            cam2,
            fusion,
            bell,
            store,
            seen: [0; 3],
        }
    }

    /// Copy whatever is new; returns how many slots had news
    pub fn poll_once(&mut self) -> usize {
        let mut copied = 0;
        for (index, slot) in [&self.cam1, &self.cam2].into_iter().enumerate() {
            if let Some(stamped) = slot.newer_than(self.seen[index]) {
                self.seen[index] = stamped.generation;
                self.store.update_camera(stamped.value);
                copied += 1;
            }
        }
        if let Some(stamped) = self.fusion.newer_than(self.seen[2]) {
            self.seen[2] = stamped.generation;
            self.store.update_fusion(stamped.value);
            copied += 1;
        }
        copied
    }

    pub fn run(mut self, stop: StopToken) {
        info!("Store feeder started");
        let mut updates: u64 = 0;
        while !stop.is_stopped() {
            let rung = self.bell.current();
            let copied = self.poll_once();
            if copied > 0 {
                updates += copied as u64;
                debug!(copied, "Store updated");
            }
            self.bell.wait_past(rung, IDLE_WAIT);
        }
        info!(updates, "Store feeder stopped");
    }
}
