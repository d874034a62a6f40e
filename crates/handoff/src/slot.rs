//! Latest-value slot

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::{lock, Doorbell};

/// A value together with the publish generation that produced it
#[derive(Debug)]
pub struct Stamped<T> {
    /// 1 for the first publish, incremented on every publish
    pub generation: u64,
    pub value: Arc<T>,
}

impl<T> Clone for Stamped<T> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            value: Arc::clone(&self.value),
        }
    }
}

/// Single-slot hand-off queue with overwrite-on-publish semantics.
///
/// The producer never blocks: `publish` swaps the new value in and hands back
/// whatever was still sitting in the slot. Consumers either peek
/// ([`LatestSlot::latest`]) and track generations themselves, or
/// [`LatestSlot::take`] the value out.
pub struct LatestSlot<T> {
    /// Current value (None before the first publish or after a take)
    value: Mutex<Option<Stamped<T>>>,
    /// Publish generation counter
    generation: AtomicU64,
    /// Values replaced before anyone took them
    overwritten: AtomicU64,
    /// Rung after every publish
    bell: Option<Arc<Doorbell>>,
}

impl<T> LatestSlot<T> {
    /// Create an empty slot
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            generation: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
            bell: None,
        }
    }

    /// Create an empty slot that rings `bell` on every publish
    pub fn with_doorbell(bell: Arc<Doorbell>) -> Self {
        Self {
            bell: Some(bell),
            ..Self::new()
        }
    }

    /// Publish a value, returning the unread value it displaced
    pub fn publish(&self, value: T) -> Option<Arc<T>> {
        self.publish_arc(Arc::new(value))
    }

    /// Publish an already shared value
    pub fn publish_arc(&self, value: Arc<T>) -> Option<Arc<T>> {
        let previous = {
            let mut slot = lock(&self.value);
            let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            slot.replace(Stamped { generation, value })
        };

        if previous.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(bell) = &self.bell {
            bell.ring();
        }
        previous.map(|stamped| stamped.value)
    }

    /// Peek at the current value without consuming it
    pub fn latest(&self) -> Option<Stamped<T>> {
        lock(&self.value).clone()
    }

    /// Peek only if the slot holds a generation newer than `seen`
    pub fn newer_than(&self, seen: u64) -> Option<Stamped<T>> {
        lock(&self.value)
            .as_ref()
            .filter(|stamped| stamped.generation > seen)
            .cloned()
    }

    /// Consume the current value
    pub fn take(&self) -> Option<Stamped<T>> {
        lock(&self.value).take()
    }

    /// Number of publishes so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Number of values replaced while still unread
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }

    /// Check if slot is empty
    pub fn is_empty(&self) -> bool {
        lock(&self.value).is_none()
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
