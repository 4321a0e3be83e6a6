//! State carried between ticks by the poll loop.

use adaptive_trigger_dsx_protocol::TriggerMode;

/// Mode and strength last applied to one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSetting {
    pub mode: TriggerMode,
    pub strength: u8,
}

impl TriggerSetting {
    /// Normal mode at the minimum strength.
    pub const RELEASED: Self = Self {
        mode: TriggerMode::Normal,
        strength: 1,
    };

    #[must_use]
    pub fn is_vibrating(&self) -> bool {
        self.mode != TriggerMode::Normal
    }
}

impl Default for TriggerSetting {
    fn default() -> Self {
        Self::RELEASED
    }
}

/// Last-applied settings of both triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerState {
    pub left: TriggerSetting,
    pub right: TriggerSetting,
}

impl TriggerState {
    #[must_use]
    pub fn is_released(&self) -> bool {
        !self.left.is_vibrating() && !self.right.is_vibrating()
    }
}

/// Whether looping rumble audio is playing, and when the last severe burst
/// was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RumbleState {
    pub active: bool,
    pub last_burst_ns: Option<u64>,
}

/// Everything the mapper reads from the previous tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedbackState {
    pub triggers: TriggerState,
    pub rumble: RumbleState,
}

impl FeedbackState {
    /// State after a reset or force-stop batch has been sent.
    #[must_use]
    pub fn released() -> Self {
        Self::default()
    }
}
