/// Freefall pre-filter
///
/// A device at rest can show momentary low readings from sensor noise.
/// Candidacy requires sustained low-g while the IMU already classifies the
/// wearer as moving; the detection engine only consumes the result in Idle.
use crate::sensors::AccelSample;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreefallTracker {
    started_at: Option<u64>,
    confirmed: bool,
}

impl FreefallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample
    ///
    /// * low-g while in motion starts or continues the timer
    /// * any sample at or above the threshold clears the timer and confirmation
    /// * low-g while not in motion leaves the tracker untouched
    pub fn update(&mut self, sample: &AccelSample, now_ms: u64, threshold_g: f32, confirm_ms: u64) {
        if sample.magnitude_g < threshold_g && sample.stability.is_motion() {
            match self.started_at {
                None => self.started_at = Some(now_ms),
                Some(start) => {
                    if !self.confirmed && now_ms.saturating_sub(start) >= confirm_ms {
                        self.confirmed = true;
                    }
                }
            }
        } else if sample.magnitude_g >= threshold_g {
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.started_at = None;
        self.confirmed = false;
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Timer start, if low-g is being tracked
    pub fn started_at(&self) -> Option<u64> {
        self.started_at
    }
}
