/// Configuration management for the SafeNeck safety monitor
/// Provides firmware defaults plus compile-time environment overrides
use thiserror::Error;

/// Default impact trigger (g)
///
/// Reference impacts: ~2.0g stumble or jogging impact, ~3.0g hard shove or
/// fall from standing, ~4.0g falling onto an object, 5.0g+ severe collision.
/// Lower values catch lighter impacts at the cost of more false positives.
pub const DEFAULT_IMPACT_THRESHOLD_G: f32 = 3.0;

/// Below this magnitude the wearer may be falling (sitting rarely goes this low)
pub const DEFAULT_FREEFALL_THRESHOLD_G: f32 = 0.2;

/// Longest accepted post-impact window or grace period
const MAX_WINDOW_MS: u64 = 3_600_000;

/// Fall/impact detection thresholds and windows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
    pub impact_threshold_g: f32,   // g (strictly above triggers impact)
    pub freefall_threshold_g: f32, // g (strictly below counts as low-g)
    pub freefall_confirm_ms: u64,  // sustained low-g while moving to confirm freefall
    pub freefall_min_ms: u64,      // min freefall before an impact counts as a fall
    pub freefall_timeout_ms: u64,  // freefall without impact is a false alarm after this
    pub post_impact_still_ms: u64, // observation window after impact
    pub post_impact_motion_ms: u64, // earliest resumed-motion verdict
    pub post_impact_grace_ms: u64, // extra wait past the window before abandoning
    pub alert_cooldown_ms: u64,    // minimum spacing of delivered alerts
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            impact_threshold_g: DEFAULT_IMPACT_THRESHOLD_G,
            freefall_threshold_g: DEFAULT_FREEFALL_THRESHOLD_G,
            freefall_confirm_ms: 500,
            freefall_min_ms: 100,
            freefall_timeout_ms: 1000,
            post_impact_still_ms: 2000,
            post_impact_motion_ms: 500,
            post_impact_grace_ms: 2000,
            alert_cooldown_ms: 30_000,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.impact_threshold_g.is_finite() && self.impact_threshold_g > 0.0) {
            return Err(ConfigError::InvalidValue("impact_threshold_g"));
        }
        if !(self.freefall_threshold_g.is_finite() && self.freefall_threshold_g > 0.0) {
            return Err(ConfigError::InvalidValue("freefall_threshold_g"));
        }
        if self.freefall_threshold_g >= self.impact_threshold_g {
            return Err(ConfigError::InvalidValue(
                "freefall_threshold_g must be below impact_threshold_g",
            ));
        }
        if self.post_impact_motion_ms >= self.post_impact_still_ms {
            return Err(ConfigError::InvalidValue(
                "post_impact_motion_ms must be below post_impact_still_ms",
            ));
        }
        if self.post_impact_still_ms > MAX_WINDOW_MS || self.post_impact_grace_ms > MAX_WINDOW_MS
        {
            return Err(ConfigError::InvalidValue("post-impact window longer than an hour"));
        }
        Ok(())
    }
}

/// Shape of the periodic location publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionFormat {
    /// `gps/position` with nullable optional fields
    #[default]
    Position,
    /// `safeneck/location` with battery level and timestamp
    Legacy,
}

/// Publish topics and cadence
#[derive(Debug, Clone, PartialEq)]
pub struct PublishConfig {
    pub interval_ms: u64,
    pub format: PositionFormat,
    pub alert_topic: &'static str,
    pub impact_topic: &'static str,
    pub freefall_topic: &'static str,
    pub position_topic: &'static str,
    pub legacy_topic: &'static str,
    /// Companion to `alert_topic` when the legacy format is selected
    pub legacy_alert_topic: &'static str,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            format: PositionFormat::Position,
            alert_topic: "safety/alert",
            impact_topic: "safety/impact_detected",
            freefall_topic: "safety/freefall_detected",
            position_topic: "gps/position",
            legacy_topic: "safeneck/location",
            legacy_alert_topic: "safeneck/fall",
        }
    }
}

/// GPS polling configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsConfig {
    pub chunk_bytes: usize,   // Wire max per I2C request
    pub burst_chunks: usize,  // chunks drained per loop (~320 B)
    pub max_sentence_len: usize,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 32,
            burst_chunks: 10,
            max_sentence_len: crate::nmea::MAX_SENTENCE_LEN,
        }
    }
}

/// Serial digest configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiagnosticsConfig {
    pub digest_interval_ms: u64,
    pub debug_gps: bool,
    pub debug_imu: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            digest_interval_ms: 1000,
            debug_gps: false,
            debug_imu: false,
        }
    }
}

/// Master system configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SystemConfig {
    pub detection: DetectionConfig,
    pub publish: PublishConfig,
    pub gps: GpsConfig,
    pub diagnostics: DiagnosticsConfig,
}

impl SystemConfig {
    /// Create configuration from environment variables (compile-time)
    ///
    /// ```bash
    /// export IMPACT_THRESHOLD_G="3.5"
    /// export FREEFALL_THRESHOLD_G="0.25"
    /// export ALERT_COOLDOWN_MS="60000"
    /// export PUBLISH_INTERVAL_MS="15000"
    /// export POSITION_FORMAT="legacy"
    /// cargo build --release
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| match key {
            "IMPACT_THRESHOLD_G" => option_env!("IMPACT_THRESHOLD_G"),
            "FREEFALL_THRESHOLD_G" => option_env!("FREEFALL_THRESHOLD_G"),
            "ALERT_COOLDOWN_MS" => option_env!("ALERT_COOLDOWN_MS"),
            "PUBLISH_INTERVAL_MS" => option_env!("PUBLISH_INTERVAL_MS"),
            "POSITION_FORMAT" => option_env!("POSITION_FORMAT"),
            "DEBUG_GPS" => option_env!("DEBUG_GPS"),
            "DEBUG_IMU" => option_env!("DEBUG_IMU"),
            _ => None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `KEY=value` overrides from any lookup (env, NVS, test table)
    pub fn apply_overrides<'a, F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        if let Some(v) = lookup("IMPACT_THRESHOLD_G") {
            self.detection.impact_threshold_g = parse("IMPACT_THRESHOLD_G", v)?;
        }
        if let Some(v) = lookup("FREEFALL_THRESHOLD_G") {
            self.detection.freefall_threshold_g = parse("FREEFALL_THRESHOLD_G", v)?;
        }
        if let Some(v) = lookup("ALERT_COOLDOWN_MS") {
            self.detection.alert_cooldown_ms = parse("ALERT_COOLDOWN_MS", v)?;
        }
        if let Some(v) = lookup("PUBLISH_INTERVAL_MS") {
            self.publish.interval_ms = parse("PUBLISH_INTERVAL_MS", v)?;
        }
        if let Some(v) = lookup("POSITION_FORMAT") {
            self.publish.format = match v.to_lowercase().as_str() {
                "position" | "gps" => PositionFormat::Position,
                "legacy" | "location" => PositionFormat::Legacy,
                _ => {
                    return Err(ConfigError::Parse {
                        key: "POSITION_FORMAT",
                        value: v.to_string(),
                    })
                }
            };
        }
        if let Some(v) = lookup("DEBUG_GPS") {
            self.diagnostics.debug_gps = parse_flag(v);
        }
        if let Some(v) = lookup("DEBUG_IMU") {
            self.diagnostics.debug_imu = parse_flag(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate()?;
        if self.publish.interval_ms == 0 {
            return Err(ConfigError::InvalidValue("publish interval_ms"));
        }
        if self.gps.chunk_bytes == 0 || self.gps.max_sentence_len < 16 {
            return Err(ConfigError::InvalidValue("gps buffer sizes"));
        }
        Ok(())
    }
}

fn parse<T: core::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Parse {
        key,
        value: value.to_string(),
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid configuration value: {0}")]
    InvalidValue(&'static str),
    #[error("cannot parse {key}={value:?}")]
    Parse { key: &'static str, value: String },
}
