use std::sync::atomic::{AtomicI16, Ordering};

use coffer_core::transfer::ProgressListener;

/// Default percentage step between notifications.
pub const DEFAULT_STEP: u8 = 5;

/// Turns byte progress into throttled whole-percent notifications.
///
/// Fires only when the percentage grows past the last reported value and lands
/// on a multiple of `step`, or reaches 100. Unknown or zero lengths never fire.
pub struct PercentProgress<F> {
    step: u8,
    last: AtomicI16,
    on_percent: F,
}

impl<F> PercentProgress<F>
where
    F: Fn(u8) + Send + Sync,
{
    pub fn new(on_percent: F) -> Self {
        Self::with_step(DEFAULT_STEP, on_percent)
    }

    pub fn with_step(step: u8, on_percent: F) -> Self {
        Self {
            step: step.clamp(1, 100),
            last: AtomicI16::new(-1),
            on_percent,
        }
    }
}

impl<F> ProgressListener for PercentProgress<F>
where
    F: Fn(u8) + Send + Sync,
{
    fn on_progress(&self, bytes_written: u64, content_length: Option<u64>) {
        let Some(total) = content_length.filter(|len| *len > 0) else {
            return;
        };
        let percent = (u128::from(bytes_written) * 100 / u128::from(total)).min(100) as i16;
        if percent % i16::from(self.step) != 0 && percent != 100 {
            return;
        }
        if self.last.fetch_max(percent, Ordering::AcqRel) < percent {
            (self.on_percent)(percent as u8);
        }
    }
}
