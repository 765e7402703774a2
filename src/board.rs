/// Hardware abstraction for supported boards.
///
/// Each board module defines pin assignments selected at compile time via
/// feature flags. Both supported boards are ESP32-S3 with an active-low
/// boot button used as the test button.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const TEST_BUTTON_PIN: u8 = 0;
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(all(feature = "board-s3zero", not(feature = "board-xiao")))]
mod hw {
    pub const TEST_BUTTON_PIN: u8 = 0;
    pub const BOARD_NAME: &str = "waveshare_s3_zero";
}

#[cfg(not(any(feature = "board-xiao", feature = "board-s3zero")))]
mod hw {
    pub const TEST_BUTTON_PIN: u8 = 0; // BOOT on most ESP32 devkits
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;

/// Stable time (ms) before a button level change is accepted
pub const BUTTON_DEBOUNCE_MS: u64 = 50;

/// Press detector for an active-low push button.
///
/// Feed it the raw pin level on every poll; it reports a press once per
/// stable high → low transition.
pub struct TestButton {
    /// Last raw level sampled
    raw_high: bool,
    /// Last level that held for the debounce time
    stable_high: bool,
    changed_at: u64,
}

impl TestButton {
    pub const fn new() -> Self {
        Self {
            raw_high: true,
            stable_high: true,
            changed_at: 0,
        }
    }

    /// Sample the pin. Returns `true` exactly once per debounced press.
    pub fn update(&mut self, is_high: bool, now: u64) -> bool {
        if is_high != self.raw_high {
            self.raw_high = is_high;
            self.changed_at = now;
            return false;
        }
        if is_high == self.stable_high
            || now.saturating_sub(self.changed_at) < BUTTON_DEBOUNCE_MS
        {
            return false;
        }
        self.stable_high = is_high;
        !is_high
    }
}

impl Default for TestButton {
    fn default() -> Self {
        Self::new()
    }
}
