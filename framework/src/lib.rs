//! SafeNeck Safety Monitor
//!
//! Core logic for a wearable fall/impact monitor: a real-time detection
//! engine fed by an IMU's acceleration magnitude and stability classifier,
//! and an NMEA sanitizer that keeps the GPS decoder supplied with
//! checksum-consistent sentences so alerts carry the last known location.
//!
//! ## Features
//!
//! - **Detection Engine**: 4-state classifier (idle, freefall, impact, post-impact)
//!   with peak tracking and alert cooldown
//! - **NMEA Sanitizer**: line framing, checksum gate, GN→GP talker remap
//! - **Hardware Abstraction**: IMU, GPS byte stream, decoder, publisher and
//!   battery gauge are traits, so the loop runs on the device, in replay and in tests
//! - **Deterministic**: time is passed in, nothing reads a clock
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  bytes  ┌───────────────┐ sentences ┌──────────────┐
//! │ GpsByteSource │ ──────▶ │ NmeaSanitizer │ ────────▶ │ NmeaDecoder  │
//! └───────────────┘         └───────────────┘           └──────┬───────┘
//!                                                               │ fix
//! ┌───────────────┐ samples ┌─────────────────┐  alerts  ┌──────▼───────┐
//! │   ImuSource   │ ──────▶ │ DetectionEngine │ ───────▶ │  Publisher   │
//! └───────────────┘         └─────────────────┘          └──────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use safety_monitor::detection::{AlertKind, DetectionEngine};
//! use safety_monitor::sensors::{AccelSample, StabilityClass};
//!
//! let mut engine = DetectionEngine::default();
//!
//! // 50 Hz ticks: hard impact, then the wearer lies still
//! engine.tick(AccelSample::new(4.1, StabilityClass::Motion), 0);
//! engine.tick(AccelSample::new(1.0, StabilityClass::Stable), 20);
//! let alert = engine
//!     .tick(AccelSample::new(1.0, StabilityClass::Stable), 2020)
//!     .expect("fall alert");
//! assert_eq!(alert.kind, AlertKind::Fall);
//! ```
//!
//! ## Modules
//!
//! - [`detection`] - Fall/impact state machine and cooldown
//! - [`freefall`] - Sustained low-g pre-filter
//! - [`nmea`] - Sentence sanitizer
//! - [`monitor`] - Control loop wiring the collaborators together
//! - [`payload`] - Publish payload formats

pub mod config;
pub mod detection;
pub mod diagnostics;
pub mod freefall;
pub mod gps;
pub mod monitor;
pub mod nmea;
pub mod payload;
pub mod publish;
pub mod sensors;

// Re-export commonly used types
pub use config::{ConfigError, DetectionConfig, PositionFormat, SystemConfig};
pub use detection::{AlertEvent, AlertKind, DetectionEngine, DetectionSignal, DetectionState};
pub use gps::{FixSnapshot, NmeaDecoder};
pub use monitor::{LoopReport, SafetyMonitor};
pub use nmea::{NmeaSanitizer, Sentence};
pub use publish::{BatteryGauge, PublishError, Publisher};
pub use sensors::{AccelSample, GpsByteSource, ImuReport, ImuSource, SensorError, StabilityClass};
