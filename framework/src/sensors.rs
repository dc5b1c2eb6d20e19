/// Sensor abstraction layer for hardware independence
/// Enables testing, replay, and support for multiple IMU/GPS parts
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard gravity used to express acceleration magnitude in g
pub const G: f32 = 9.81; // m/s²

/// Coarse motion classification reported by the IMU
///
/// Wire codes follow the BNO08x stability classifier:
/// 0=unknown, 1=on table, 2=stationary, 3=stable, 4=motion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityClass {
    #[default]
    Unknown,
    OnSurface,
    Stationary,
    Stable,
    Motion,
}

impl StabilityClass {
    /// Decode a classifier report value. Unrecognized codes are `Unknown`.
    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => StabilityClass::OnSurface,
            2 => StabilityClass::Stationary,
            3 => StabilityClass::Stable,
            4 => StabilityClass::Motion,
            _ => StabilityClass::Unknown,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            StabilityClass::Unknown => 0,
            StabilityClass::OnSurface => 1,
            StabilityClass::Stationary => 2,
            StabilityClass::Stable => 3,
            StabilityClass::Motion => 4,
        }
    }

    /// Get class as string for display
    pub fn as_str(self) -> &'static str {
        match self {
            StabilityClass::Unknown => "unknown",
            StabilityClass::OnSurface => "on_table",
            StabilityClass::Stationary => "stationary",
            StabilityClass::Stable => "stable",
            StabilityClass::Motion => "motion",
        }
    }

    /// True for the classes that indicate the wearer is not moving.
    /// `Unknown` is neither still nor moving.
    pub fn is_still(self) -> bool {
        matches!(
            self,
            StabilityClass::OnSurface | StabilityClass::Stationary | StabilityClass::Stable
        )
    }

    pub fn is_motion(self) -> bool {
        self == StabilityClass::Motion
    }
}

/// One detection input: gravity-compensated acceleration norm plus stability
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AccelSample {
    /// Acceleration magnitude (g)
    pub magnitude_g: f32,
    pub stability: StabilityClass,
}

impl AccelSample {
    pub fn new(magnitude_g: f32, stability: StabilityClass) -> Self {
        Self {
            magnitude_g,
            stability,
        }
    }

    /// Build a sample from a linear acceleration vector (m/s², gravity removed)
    pub fn from_linear_acceleration(x: f32, y: f32, z: f32, stability: StabilityClass) -> Self {
        let magnitude_g = (x * x + y * y + z * z).sqrt() / G;
        Self::new(magnitude_g, stability)
    }
}

/// Reports drained from the IMU driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImuReport {
    /// Linear acceleration with gravity removed (m/s²)
    LinearAcceleration { x: f32, y: f32, z: f32 },
    /// Stability classifier output
    Stability(StabilityClass),
}

/// Latest IMU readings folded from the report stream
///
/// Linear acceleration and stability arrive as separate reports at
/// different rates; the newest value of each is kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImuState {
    pub linear_accel: Option<[f32; 3]>,
    pub magnitude_g: f32,
    pub stability: StabilityClass,
}

impl ImuState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, report: ImuReport) {
        match report {
            ImuReport::LinearAcceleration { x, y, z } => {
                self.linear_accel = Some([x, y, z]);
                self.magnitude_g =
                    AccelSample::from_linear_acceleration(x, y, z, self.stability).magnitude_g;
            }
            ImuReport::Stability(class) => self.stability = class,
        }
    }

    /// Current sample, once at least one acceleration report has arrived
    pub fn sample(&self) -> Option<AccelSample> {
        self.linear_accel
            .map(|_| AccelSample::new(self.magnitude_g, self.stability))
    }
}

/// Errors that can occur when reading sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("bus transaction failed")]
    Bus,
    #[error("sensor not ready")]
    NotReady,
    #[error("sensor read timed out")]
    Timeout,
}

/// Abstraction for the IMU driver (BNO085 or compatible)
pub trait ImuSource {
    /// Driver readiness; a not-ready IMU is never ticked
    fn is_ready(&self) -> bool;

    /// Drain one pending report (non-blocking)
    /// Returns None when the driver has nothing buffered
    fn next_report(&mut self) -> Option<ImuReport>;
}

/// Abstraction for the raw GPS byte stream (PA1010D over I2C, UART, replay)
pub trait GpsByteSource {
    /// Read up to `buf.len()` bytes without blocking
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, SensorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stability_codes() {
        for code in 0..=4u8 {
            assert_eq!(StabilityClass::from_u8(code).as_u8(), code);
        }
        assert_eq!(StabilityClass::from_u8(9), StabilityClass::Unknown);
    }

    #[test]
    fn test_still_classes_exclude_unknown() {
        assert!(StabilityClass::OnSurface.is_still());
        assert!(StabilityClass::Stationary.is_still());
        assert!(StabilityClass::Stable.is_still());
        assert!(!StabilityClass::Unknown.is_still());
        assert!(!StabilityClass::Motion.is_still());
    }

    #[test]
    fn test_magnitude_in_g() {
        let s = AccelSample::from_linear_acceleration(0.0, 0.0, 2.0 * G, StabilityClass::Motion);
        assert!((s.magnitude_g - 2.0).abs() < 1e-5);

        let s = AccelSample::from_linear_acceleration(3.0, 4.0, 0.0, StabilityClass::Motion);
        assert!((s.magnitude_g - 5.0 / G).abs() < 1e-5);
    }

    #[test]
    fn test_imu_state_needs_accel_report() {
        let mut imu = ImuState::new();
        imu.apply(ImuReport::Stability(StabilityClass::Stable));
        assert!(imu.sample().is_none());

        imu.apply(ImuReport::LinearAcceleration {
            x: G,
            y: 0.0,
            z: 0.0,
        });
        let sample = imu.sample().unwrap();
        assert!((sample.magnitude_g - 1.0).abs() < 1e-5);
        assert_eq!(sample.stability, StabilityClass::Stable);

        // Stability updates independently of acceleration
        imu.apply(ImuReport::Stability(StabilityClass::Motion));
        assert_eq!(imu.sample().unwrap().stability, StabilityClass::Motion);
    }
}
