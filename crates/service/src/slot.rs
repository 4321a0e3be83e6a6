//! Single-slot hand-off of the latest frame from the poll loop to a display
//! consumer.

use std::sync::atomic::{AtomicU64, Ordering};

use adaptive_trigger_telemetry_core::TelemetryFrame;
use crossbeam::queue::ArrayQueue;

/// Lock-free slot holding at most one frame.
///
/// The producer overwrites whatever is there; the consumer takes the newest
/// frame or nothing. Neither side ever waits on the other.
#[derive(Debug)]
pub struct LatestFrameSlot {
    slot: ArrayQueue<TelemetryFrame>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl Default for LatestFrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self {
            slot: ArrayQueue::new(1),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Replace the slot's content with `frame`.
    pub fn publish(&self, frame: TelemetryFrame) {
        if self.slot.force_push(frame).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the newest frame published since the last call.
    pub fn take_latest(&self) -> Option<TelemetryFrame> {
        self.slot.pop()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames overwritten before the consumer saw them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
