//! Capture loop run state

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::lock;

/// Capture loop state. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Running,
    Paused,
    Stopped,
}

/// Pause/resume/stop switch shared by a capture loop and its handles
#[derive(Debug)]
pub struct LoopControl {
    state: Mutex<LoopState>,
    cond: Condvar,
}

impl Default for LoopControl {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopControl {
    /// New control in `Running`
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopState::Running),
            cond: Condvar::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        *lock(&self.state)
    }

    /// Running → Paused. Returns whether the state changed.
    pub fn pause(&self) -> bool {
        self.transition(LoopState::Running, LoopState::Paused)
    }

    /// Paused → Running. Returns whether the state changed.
    pub fn resume(&self) -> bool {
        self.transition(LoopState::Paused, LoopState::Running)
    }

    /// Any state → Stopped; idempotent
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        *state = LoopState::Stopped;
        self.cond.notify_all();
    }

    /// Block while paused, for at most `timeout`, and return the state seen
    pub fn wait_while_paused(&self, timeout: Duration) -> LoopState {
        let state = lock(&self.state);
        let (state, _) = self
            .cond
            .wait_timeout_while(state, timeout, |s| *s == LoopState::Paused)
            .unwrap_or_else(PoisonError::into_inner);
        *state
    }

    fn transition(&self, from: LoopState, to: LoopState) -> bool {
        let mut state = lock(&self.state);
        if *state != from {
            return false;
        }
        *state = to;
        self.cond.notify_all();
        true
    }
}
