//! Diagnostics digest for the serial console
//!
//! Built from a snapshot of the monitor once per digest interval and
//! rendered with `Display`. Sections are included only when their debug
//! flag is enabled.

use core::fmt;

use crate::detection::DetectionState;
use crate::gps::{DecoderStats, FixSnapshot};
use crate::nmea::SanitizerStats;
use crate::sensors::StabilityClass;

/// GPS section: raw sentences, current fix, parser counters
#[derive(Debug, Clone, Default)]
pub struct GpsHealth {
    pub last_gga: Option<String>,
    pub last_rmc: Option<String>,
    pub fix: Option<FixSnapshot>,
    pub decoder: DecoderStats,
    pub sanitizer: SanitizerStats,
}

/// IMU section: latest sample and detection state
#[derive(Debug, Clone, Default)]
pub struct ImuHealth {
    pub ready: bool,
    /// Last linear acceleration (m/s²)
    pub linear_accel: Option<[f32; 3]>,
    pub magnitude_g: f32,
    pub stability: StabilityClass,
    pub state: DetectionState,
    pub impact_threshold_g: f32,
}

/// Loop-level counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemHealth {
    pub uptime_ms: u64,
    pub publish_sent: u32,
    pub publish_failed: u32,
    pub alerts_sent: u32,
    pub alerts_suppressed: u32,
}

/// Complete digest snapshot
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsDigest {
    pub gps: Option<GpsHealth>,
    pub imu: Option<ImuHealth>,
    pub system: SystemHealth,
}

impl DiagnosticsDigest {
    pub fn is_empty(&self) -> bool {
        self.gps.is_none() && self.imu.is_none()
    }
}

impl fmt::Display for GpsHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[GPS]")?;
        if let Some(gga) = &self.last_gga {
            writeln!(f, "  GGA> {}", gga)?;
        }
        if let Some(rmc) = &self.last_rmc {
            writeln!(f, "  RMC> {}", rmc)?;
        }

        match &self.fix {
            Some(fix) => {
                writeln!(
                    f,
                    "  Fix: YES  lat: {:.6}  lon: {:.6}  age(ms): {}",
                    fix.latitude, fix.longitude, fix.age_ms
                )?;
                writeln!(f, "  Satellites: {}", fix.satellites)?;
                if let Some(hdop) = fix.hdop {
                    writeln!(f, "  HDOP: {:.2}", hdop)?;
                }
                if let Some(alt) = fix.altitude_m {
                    writeln!(f, "  Alt: {:.1} m", alt)?;
                }
                if let Some(spd) = fix.speed_kmph {
                    writeln!(f, "  Speed: {:.2} km/h", spd)?;
                }
                if let Some(ts) = fix.utc_unix_secs {
                    writeln!(f, "  UTC: {} (unix)", ts)?;
                }
            }
            None => writeln!(f, "  Fix: NO   (waiting for satellites)")?,
        }

        writeln!(
            f,
            "  [Stats] chars={} withFix={} pass={} fail={}",
            self.decoder.chars_processed,
            self.decoder.sentences_with_fix,
            self.decoder.passed_checksum,
            self.decoder.failed_checksum
        )?;
        writeln!(
            f,
            "  [Lines] total={} fwd={} malformed={} overflow={} remap={} badsum={}",
            self.sanitizer.lines,
            self.sanitizer.forwarded,
            self.sanitizer.malformed,
            self.sanitizer.overflowed,
            self.sanitizer.remapped,
            self.sanitizer.checksum_mismatches
        )
    }
}

impl fmt::Display for ImuHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[IMU]")?;
        if !self.ready {
            return writeln!(f, "  IMU: NOT READY");
        }
        let [x, y, z] = self.linear_accel.unwrap_or_default();
        writeln!(
            f,
            "  Accel: {:.2}g (X:{:.2} Y:{:.2} Z:{:.2} m/s²)",
            self.magnitude_g, x, y, z
        )?;
        writeln!(
            f,
            "  Stability: {} ({})",
            self.stability.as_str(),
            self.stability.as_u8()
        )?;
        write!(f, "  Detection: {}", self.state.as_str())?;
        if let Some(since) = self.state.since_ms() {
            write!(f, " (since {} ms)", since)?;
        }
        writeln!(f, " | Threshold: {:.1}g", self.impact_threshold_g)
    }
}

impl fmt::Display for DiagnosticsDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- SAFETY MONITOR DIGEST ---")?;
        if let Some(gps) = &self.gps {
            write!(f, "{}", gps)?;
        }
        if let Some(imu) = &self.imu {
            write!(f, "{}", imu)?;
        }
        writeln!(
            f,
            "[SYS] up={}s pub={}/{} alerts={} suppressed={}",
            self.system.uptime_ms / 1000,
            self.system.publish_sent,
            self.system.publish_failed,
            self.system.alerts_sent,
            self.system.alerts_suppressed
        )?;
        write!(f, "-----------------------------")
    }
}
