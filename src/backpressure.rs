use std::sync::atomic::{AtomicBool, Ordering};

/// Watermark-based throttle signal over a buffer's utilization.
///
/// Becomes active once utilization reaches the high watermark and stays
/// active until it falls to the low watermark or below. It is advisory only:
/// producers that ignore it simply block once the buffer is full.
#[derive(Debug)]
pub struct SaturationMonitor {
    /// Percentage at which throttling starts
    high_watermark: u32,
    /// Percentage at which throttling is released
    low_watermark: u32,
    is_active: AtomicBool,
}

impl SaturationMonitor {
    /// Default: high=80%, low=40%
    pub fn new() -> Self {
        Self::with_watermarks(80, 40)
    }

    pub fn with_watermarks(high: u32, low: u32) -> Self {
        Self {
            high_watermark: high.min(100),
            low_watermark: low.min(100),
            is_active: AtomicBool::new(false),
        }
    }

    /// Feed the current utilization (percent) and get the updated state
    pub fn check_and_update(&self, utilization: u32) -> bool {
        let was_active = self.is_active.load(Ordering::Relaxed);

        let is_now_active = if was_active {
            utilization > self.low_watermark
        } else {
            utilization >= self.high_watermark
        };

        if is_now_active != was_active {
            self.is_active.store(is_now_active, Ordering::Relaxed);
        }

        is_now_active
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Relaxed)
    }

    pub fn high_watermark(&self) -> u32 {
        self.high_watermark
    }

    pub fn low_watermark(&self) -> u32 {
        self.low_watermark
    }

    pub fn reset(&self) {
        self.is_active.store(false, Ordering::Relaxed);
    }
}

impl Default for SaturationMonitor {
    fn default() -> Self {
        Self::new()
    }
}
