//! PA1010D GPS NMEA Decoder
//!
//! This crate provides a pure Rust decoder for the NMEA stream of the CDtop
//! PA1010D (MTK3333) GPS module, read over I2C or UART.
//! It decodes GPGGA and GPRMC sentences into a single best-known fix.
//!
//! # Features
//!
//! - Zero-allocation, byte-at-a-time decoding
//! - Checksum verification with pass/fail counters
//! - Position, altitude, HDOP, satellites, speed, course and UTC date/time
//! - PMTK command framing ([`pmtk`])
//! - `no_std` compatible
//!
//! Multi-constellation talkers (`GNGGA`, `GNRMC`) are not decoded; rewrite
//! them to `GP` before feeding.
//!
//! # Example
//!
//! ```ignore
//! use pa1010d::Pa1010d;
//!
//! let mut gps = Pa1010d::new();
//!
//! // Feed bytes from the I2C/UART stream
//! for byte in i2c_bytes {
//!     if gps.encode(byte, now_ms) && gps.fix().location_valid {
//!         println!("Position: {}, {}", gps.fix().lat, gps.fix().lon);
//!     }
//! }
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod pmtk;

#[cfg(feature = "logging")]
use log::warn;

use libm::floor;

/// Default 7-bit I2C address
pub const I2C_ADDRESS: u8 = 0x10;

/// Longest sentence buffered; longer input is dropped
pub const MAX_SENTENCE_LEN: usize = 120;

const MAX_FIELDS: usize = 24;
const KNOTS_TO_KMPH: f64 = 1.852;

/// Best-known fix, updated field group by field group as sentences arrive
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpsFix {
    /// Latitude in degrees (positive = North, negative = South)
    pub lat: f64,
    /// Longitude in degrees (positive = East, negative = West)
    pub lon: f64,
    /// Position is from a sentence that reported a fix
    pub location_valid: bool,
    /// GGA fix quality (0 = no fix, 1 = GPS, 2 = DGPS)
    pub quality: u8,
    pub satellites: Option<u32>,
    pub hdop: Option<f64>,
    /// Altitude above mean sea level (m)
    pub altitude_m: Option<f64>,
    /// Ground speed (km/h)
    pub speed_kmph: Option<f64>,
    /// Course over ground (degrees)
    pub course_deg: Option<f64>,
    /// UTC date (year, month, day)
    pub date: Option<(u16, u8, u8)>,
    /// UTC time (hour, minute, second)
    pub time: Option<(u8, u8, u8)>,
    /// Decoder time of the last location commit
    pub last_update_ms: Option<u64>,
}

impl GpsFix {
    /// Milliseconds since the location was last committed
    pub fn age_ms(&self, now_ms: u64) -> Option<u64> {
        self.last_update_ms.map(|t| now_ms.saturating_sub(t))
    }

    /// UTC date and time as unix seconds
    pub fn utc_unix_secs(&self) -> Option<u64> {
        let (year, month, day) = self.date?;
        let (hour, minute, second) = self.time?;
        let days = days_from_civil(year as i64, month as u32, day as u32);
        let secs = days * 86_400 + hour as i64 * 3600 + minute as i64 * 60 + second as i64;
        u64::try_from(secs).ok()
    }
}

/// Sentence counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub chars_processed: u64,
    pub sentences_with_fix: u32,
    pub passed_checksum: u32,
    pub failed_checksum: u32,
}

/// NMEA decoder for the PA1010D
pub struct Pa1010d {
    line_buffer: [u8; MAX_SENTENCE_LEN],
    line_len: usize,
    overflowed: bool,
    fix: GpsFix,
    stats: DecoderStats,
}

impl Pa1010d {
    pub fn new() -> Self {
        Self {
            line_buffer: [0; MAX_SENTENCE_LEN],
            line_len: 0,
            overflowed: false,
            fix: GpsFix::default(),
            stats: DecoderStats::default(),
        }
    }

    /// Feed a single byte
    ///
    /// Returns `true` when a checksum-valid GGA or RMC sentence has been
    /// committed to the fix.
    pub fn encode(&mut self, byte: u8, now_ms: u64) -> bool {
        self.stats.chars_processed += 1;
        match byte {
            b'$' => {
                self.line_buffer[0] = byte;
                self.line_len = 1;
                self.overflowed = false;
                false
            }
            b'\r' => false,
            b'\n' => {
                let committed = self.line_len > 0 && !self.overflowed && self.parse_line(now_ms);
                self.line_len = 0;
                self.overflowed = false;
                committed
            }
            // Outside a sentence
            _ if self.line_len == 0 => false,
            _ => {
                if self.line_len < MAX_SENTENCE_LEN {
                    self.line_buffer[self.line_len] = byte;
                    self.line_len += 1;
                } else {
                    self.overflowed = true;
                }
                false
            }
        }
    }

    /// Get reference to the current fix
    pub fn fix(&self) -> &GpsFix {
        &self.fix
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn parse_line(&mut self, now_ms: u64) -> bool {
        let len = self.line_len;

        // Local copy so the fix can be updated while the line is borrowed
        let mut local_buf = [0u8; MAX_SENTENCE_LEN];
        local_buf[..len].copy_from_slice(&self.line_buffer[..len]);

        let line = match core::str::from_utf8(&local_buf[..len]) {
            Ok(s) => s,
            Err(_) => return false,
        };

        let body = match verify_checksum(line) {
            Some(body) => {
                self.stats.passed_checksum += 1;
                body
            }
            None => {
                self.stats.failed_checksum += 1;
                #[cfg(feature = "logging")]
                warn!("NMEA checksum failed: {}", line);
                return false;
            }
        };

        let mut fields = [""; MAX_FIELDS];
        let mut count = 0;
        for field in body.split(',') {
            if count == MAX_FIELDS {
                break;
            }
            fields[count] = field;
            count += 1;
        }
        let fields = &fields[..count];

        match fields[0] {
            "GPGGA" => self.parse_gga(fields, now_ms),
            "GPRMC" => self.parse_rmc(fields, now_ms),
            _ => false,
        }
    }

    fn parse_gga(&mut self, fields: &[&str], now_ms: u64) -> bool {
        if fields.len() < 10 {
            return false;
        }

        if let Some(time) = parse_time(fields[1]) {
            self.fix.time = Some(time);
        }

        let quality = fields[6].parse::<u8>().unwrap_or(0);
        self.fix.quality = quality;
        self.fix.satellites = fields[7].parse::<u32>().ok();
        self.fix.hdop = fields[8].parse::<f64>().ok();
        self.fix.altitude_m = fields[9].parse::<f64>().ok();

        if quality == 0 {
            self.fix.location_valid = false;
            return true;
        }

        self.stats.sentences_with_fix += 1;
        if let (Some(lat), Some(lon)) = (
            parse_coordinate(fields[2], fields[3]),
            parse_coordinate(fields[4], fields[5]),
        ) {
            self.commit_location(lat, lon, now_ms);
        }
        true
    }

    fn parse_rmc(&mut self, fields: &[&str], now_ms: u64) -> bool {
        if fields.len() < 10 {
            return false;
        }

        if let Some(time) = parse_time(fields[1]) {
            self.fix.time = Some(time);
        }
        if let Some(date) = parse_date(fields[9]) {
            self.fix.date = Some(date);
        }

        if fields[2] != "A" {
            self.fix.location_valid = false;
            return true;
        }

        self.stats.sentences_with_fix += 1;
        self.fix.speed_kmph = fields[7].parse::<f64>().ok().map(|kn| kn * KNOTS_TO_KMPH);
        self.fix.course_deg = fields[8].parse::<f64>().ok();

        if let (Some(lat), Some(lon)) = (
            parse_coordinate(fields[3], fields[4]),
            parse_coordinate(fields[5], fields[6]),
        ) {
            self.commit_location(lat, lon, now_ms);
        }
        true
    }

    fn commit_location(&mut self, lat: f64, lon: f64, now_ms: u64) {
        self.fix.lat = lat;
        self.fix.lon = lon;
        self.fix.location_valid = true;
        self.fix.last_update_ms = Some(now_ms);
    }
}

impl Default for Pa1010d {
    fn default() -> Self {
        Self::new()
    }
}

/// XOR checksum of a sentence body
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |cs, b| cs ^ b)
}

/// Body between `$` and `*` when the trailer matches it
fn verify_checksum(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('$')?;
    let star = rest.rfind('*')?;
    let declared = u8::from_str_radix(rest.get(star + 1..star + 3)?, 16).ok()?;
    let body = &rest[..star];
    (checksum(body) == declared).then_some(body)
}

/// Parse NMEA coordinate field (ddmm.mmmm format)
fn parse_coordinate(coord_str: &str, dir_str: &str) -> Option<f64> {
    if coord_str.is_empty() || dir_str.is_empty() {
        return None;
    }

    let value = coord_str.parse::<f64>().ok()?;

    let degrees = floor(value / 100.0);
    let minutes = value - (degrees * 100.0);

    let mut decimal = degrees + (minutes / 60.0);

    if dir_str == "S" || dir_str == "W" {
        decimal = -decimal;
    }

    Some(decimal)
}

/// Parse NMEA time field (hhmmss.sss format)
fn parse_time(time_str: &str) -> Option<(u8, u8, u8)> {
    let hh = time_str.get(0..2)?.parse::<u8>().ok()?;
    let mm = time_str.get(2..4)?.parse::<u8>().ok()?;
    let ss = time_str.get(4..6)?.parse::<u8>().ok()?;

    (hh < 24 && mm < 60 && ss < 61).then_some((hh, mm, ss))
}

/// Parse NMEA date field (ddmmyy format)
fn parse_date(date_str: &str) -> Option<(u16, u8, u8)> {
    if date_str.len() != 6 {
        return None;
    }
    let dd = date_str.get(0..2)?.parse::<u8>().ok()?;
    let mm = date_str.get(2..4)?.parse::<u8>().ok()?;
    let yy = date_str.get(4..6)?.parse::<u16>().ok()?;

    // Two-digit years: 80-99 are the 1900s (GPS epoch is 1980)
    let year = if yy >= 80 { 1900 + yy } else { 2000 + yy };

    ((1..=31).contains(&dd) && (1..=12).contains(&mm)).then_some((year, mm, dd))
}

/// Days since 1970-01-01 for a proleptic Gregorian date
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (month as i64 + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
    const RMC: &str =
        "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n";

    fn feed(gps: &mut Pa1010d, text: &str, now_ms: u64) -> usize {
        text.bytes().filter(|&b| gps.encode(b, now_ms)).count()
    }

    #[test]
    fn test_parse_coordinate() {
        // North latitude
        assert_eq!(parse_coordinate("3723.2475", "N"), Some(37.387458333333336));
        // South latitude
        assert_eq!(parse_coordinate("3723.2475", "S"), Some(-37.387458333333336));
        // West longitude
        assert_eq!(parse_coordinate("12158.3416", "W"), Some(-121.97236));
        assert_eq!(parse_coordinate("", "N"), None);
    }

    #[test]
    fn test_parse_time_and_date() {
        assert_eq!(parse_time("123456"), Some((12, 34, 56)));
        assert_eq!(parse_time("064951.000"), Some((6, 49, 51)));
        assert_eq!(parse_time("12"), None); // Too short
        assert_eq!(parse_time("256000"), None);

        assert_eq!(parse_date("230394"), Some((1994, 3, 23)));
        assert_eq!(parse_date("150125"), Some((2025, 1, 15)));
        assert_eq!(parse_date("001325"), None);
    }

    #[test]
    fn test_gga_decodes_position_and_quality() {
        let mut gps = Pa1010d::new();
        assert_eq!(feed(&mut gps, GGA, 1000), 1);

        let fix = gps.fix();
        assert!(fix.location_valid);
        assert!((fix.lat - 48.1173).abs() < 1e-6);
        assert!((fix.lon - 11.516_666_7).abs() < 1e-6);
        assert_eq!(fix.quality, 1);
        assert_eq!(fix.satellites, Some(8));
        assert_eq!(fix.hdop, Some(0.9));
        assert_eq!(fix.altitude_m, Some(545.4));
        assert_eq!(fix.age_ms(1250), Some(250));
        // GGA carries no date
        assert_eq!(fix.utc_unix_secs(), None);
    }

    #[test]
    fn test_rmc_adds_speed_and_date() {
        let mut gps = Pa1010d::new();
        feed(&mut gps, GGA, 0);
        assert_eq!(feed(&mut gps, RMC, 0), 1);

        let fix = gps.fix();
        assert!((fix.speed_kmph.unwrap() - 22.4 * 1.852).abs() < 1e-9);
        assert_eq!(fix.course_deg, Some(84.4));
        assert_eq!(fix.date, Some((1994, 3, 23)));
        assert_eq!(fix.utc_unix_secs(), Some(764_426_119));

        let stats = gps.stats();
        assert_eq!(stats.passed_checksum, 2);
        assert_eq!(stats.sentences_with_fix, 2);
        assert_eq!(stats.chars_processed, (GGA.len() + RMC.len()) as u64);
    }

    #[test]
    fn test_void_rmc_clears_validity() {
        let mut gps = Pa1010d::new();
        feed(&mut gps, GGA, 0);
        assert!(gps.fix().location_valid);

        feed(&mut gps, "$GPRMC,123519,V,,,,,,,230394,,,N*51\r\n", 0);
        assert!(!gps.fix().location_valid);

        feed(&mut gps, "$GPGGA,123519,,,,,0,00,,,M,,M,,*6B\r\n", 0);
        assert!(!gps.fix().location_valid);
        assert_eq!(gps.fix().satellites, Some(0));
        assert_eq!(gps.fix().altitude_m, None);
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let mut gps = Pa1010d::new();
        let bad = GGA.replace("*47", "*48");
        assert_eq!(feed(&mut gps, &bad, 0), 0);
        assert!(!gps.fix().location_valid);
        assert_eq!(gps.stats().failed_checksum, 1);
    }

    #[test]
    fn test_gn_talker_ignored() {
        let mut gps = Pa1010d::new();
        let line = "$GNGGA,064951.000,2307.1256,N,12016.4438,E,1,8,0.95,39.9,M,17.8,M,,*7D\r\n";
        assert_eq!(feed(&mut gps, line, 0), 0);
        assert_eq!(gps.stats().passed_checksum, 1);
        assert!(!gps.fix().location_valid);
    }

    #[test]
    fn test_resync_on_dollar() {
        let mut gps = Pa1010d::new();
        let torn = format!("$GPGGA,12351{}", GGA);
        assert_eq!(feed(&mut gps, &torn, 0), 1);
    }

    #[test]
    fn test_days_from_civil() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(days_from_civil(2024, 2, 29) * 86_400, 1_709_164_800);
    }
}
