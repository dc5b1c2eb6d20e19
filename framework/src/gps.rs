/// GPS fix data as seen by the safety monitor
///
/// The fix itself is owned by the NMEA decoder; the monitor only takes
/// read-only snapshots when building alert and position payloads.
use serde::{Deserialize, Serialize};

/// Position solution snapshot
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FixSnapshot {
    /// Latitude in degrees (positive = North)
    pub latitude: f64,
    /// Longitude in degrees (positive = East)
    pub longitude: f64,
    /// Altitude above mean sea level (m)
    pub altitude_m: Option<f64>,
    /// Horizontal dilution of precision
    pub hdop: Option<f64>,
    /// Ground speed (km/h)
    pub speed_kmph: Option<f64>,
    /// Satellites in use (0 when not reported)
    pub satellites: u32,
    /// Time since the location was last updated (ms)
    pub age_ms: u64,
    /// UTC time of the fix as unix seconds, when date and time are known
    pub utc_unix_secs: Option<u64>,
}

/// Decoder counters, mirrored into the diagnostics digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecoderStats {
    pub chars_processed: u64,
    pub sentences_with_fix: u32,
    pub passed_checksum: u32,
    pub failed_checksum: u32,
}

/// Abstraction for the NMEA decoder that maintains the current fix
/// Implementations: PA1010D decoder, replay stubs
pub trait NmeaDecoder {
    /// Feed one character of a sanitized sentence
    /// Returns true when a sentence has been committed
    fn encode(&mut self, byte: u8, now_ms: u64) -> bool;

    /// Current fix, or None while the location is not valid
    fn fix(&self, now_ms: u64) -> Option<FixSnapshot>;

    fn stats(&self) -> DecoderStats {
        DecoderStats::default()
    }
}
