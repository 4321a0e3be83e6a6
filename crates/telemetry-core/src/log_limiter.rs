//! Suppression of repeated failure logs.
//!
//! The poll loop runs at ~100 Hz, so a persistent failure (game not running,
//! driver unreachable) would otherwise log a line every tick. The limiter lets
//! one line per failure kind through per cooldown window and counts the rest.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default window between two log lines for the same failure kind.
pub const DEFAULT_LOG_COOLDOWN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct Window {
    last_emitted: Instant,
    suppressed: u64,
}

/// Per-kind cooldown gate for log lines.
#[derive(Debug, Clone)]
pub struct ErrorLogLimiter {
    cooldown: Duration,
    windows: HashMap<&'static str, Window>,
}

impl Default for ErrorLogLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_COOLDOWN)
    }
}

impl ErrorLogLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            windows: HashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Decide whether a failure of `kind` observed at `now` should be logged.
    ///
    /// Returns `Some(n)` when the caller should emit a line, where `n` is the
    /// number of occurrences suppressed since the previous emitted line.
    /// Returns `None` while the kind is cooling down.
    pub fn should_log(&mut self, kind: &'static str, now: Instant) -> Option<u64> {
        match self.windows.get_mut(kind) {
            Some(window) => {
                let elapsed = now.saturating_duration_since(window.last_emitted);
                if elapsed >= self.cooldown {
                    let suppressed = window.suppressed;
                    window.last_emitted = now;
                    window.suppressed = 0;
                    Some(suppressed)
                } else {
                    window.suppressed = window.suppressed.saturating_add(1);
                    None
                }
            }
            None => {
                self.windows.insert(
                    kind,
                    Window {
                        last_emitted: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
        }
    }

    /// Forget `kind`, so its next occurrence is logged immediately.
    ///
    /// Called when the failing condition recovers.
    pub fn clear(&mut self, kind: &'static str) {
        self.windows.remove(kind);
    }

    pub fn reset(&mut self) {
        self.windows.clear();
    }
}
