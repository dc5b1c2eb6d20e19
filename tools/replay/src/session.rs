//! Session recordings
//!
//! One record per line:
//!
//! ```text
//! # comment
//! I,<ms>,<ax>,<ay>,<az>     linear acceleration (m/s², gravity removed)
//! S,<ms>,<class>            stability classifier code (0-4)
//! G,<ms>,<nmea sentence>    raw GPS text, CRLF appended on replay
//! ```

use safety_monitor::nmea::nmea_checksum;
use safety_monitor::sensors::{StabilityClass, G};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Imu { ms: u64, accel: [f32; 3] },
    Stability { ms: u64, class: StabilityClass },
    Gps { ms: u64, text: String },
}

impl Record {
    pub fn ms(&self) -> u64 {
        match self {
            Record::Imu { ms, .. } | Record::Stability { ms, .. } | Record::Gps { ms, .. } => *ms,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("line {line}: unknown record type {kind:?}")]
    UnknownRecord { line: usize, kind: String },
    #[error("line {line}: missing field {field}")]
    MissingField { line: usize, field: &'static str },
    #[error("line {line}: bad {field} value {value:?}")]
    BadValue {
        line: usize,
        field: &'static str,
        value: String,
    },
}

/// Time-ordered list of records
#[derive(Debug, Clone, Default)]
pub struct Session {
    records: Vec<Record>,
}

impl Session {
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        let mut records = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            if let Some(record) = parse_record(raw, idx + 1)? {
                records.push(record);
            }
        }
        // Stable: same-ms records keep file order
        records.sort_by_key(Record::ms);
        Ok(Self { records })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn end_ms(&self) -> u64 {
        self.records.last().map_or(0, Record::ms)
    }

    /// Walk, fall, lie still, with a GN-talker GPS fix every second
    pub fn demo() -> Self {
        const TICK_MS: u64 = 20;
        const END_MS: u64 = 9000;

        let mut records = Vec::new();
        let mut stability = None;
        let mut t = 0;

        while t <= END_MS {
            let (g, class) = match t {
                // Walking: gait bounce
                0..=1999 => (0.6 + 0.3 * ((t / TICK_MS) % 4) as f32, StabilityClass::Motion),
                // 600 ms of freefall
                2000..=2599 => (0.08, StabilityClass::Motion),
                2600 => (4.1, StabilityClass::Motion),
                2620..=2699 => (1.6, StabilityClass::Motion),
                // Lying on the ground
                _ => (0.03, StabilityClass::Stable),
            };

            if stability != Some(class) {
                records.push(Record::Stability { ms: t, class });
                stability = Some(class);
            }
            records.push(Record::Imu {
                ms: t,
                accel: [0.0, 0.0, g * G],
            });

            if t % 1000 == 0 {
                let secs = 51 + t / 1000;
                records.push(Record::Gps {
                    ms: t,
                    text: demo_sentence(&format!(
                        "GNGGA,0649{:02}.000,2307.1256,N,12016.4438,E,1,8,0.95,39.9,M,17.8,M,,",
                        secs % 60
                    )),
                });
                records.push(Record::Gps {
                    ms: t,
                    text: demo_sentence(&format!(
                        "GNRMC,0649{:02}.000,A,2307.1256,N,12016.4438,E,0.03,165.48,150125,,,A",
                        secs % 60
                    )),
                });
            }
            t += TICK_MS;
        }

        Self { records }
    }
}

fn demo_sentence(body: &str) -> String {
    format!("${}*{:02X}", body, nmea_checksum(body))
}

fn parse_record(raw: &str, line: usize) -> Result<Option<Record>, SessionError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return Ok(None);
    }

    let mut parts = raw.splitn(3, ',');
    let kind = parts.next().unwrap_or_default();
    let ms = parse_field(parts.next(), "ms", line)?;
    let rest = parts.next();

    let record = match kind {
        "I" => {
            let mut axes = rest.unwrap_or_default().split(',');
            let ax = parse_field(axes.next(), "ax", line)?;
            let ay = parse_field(axes.next(), "ay", line)?;
            let az = parse_field(axes.next(), "az", line)?;
            Record::Imu {
                ms,
                accel: [ax, ay, az],
            }
        }
        "S" => {
            let code: u8 = parse_field(rest, "class", line)?;
            Record::Stability {
                ms,
                class: StabilityClass::from_u8(code),
            }
        }
        "G" => Record::Gps {
            ms,
            text: rest
                .ok_or(SessionError::MissingField { line, field: "nmea" })?
                .to_string(),
        },
        other => {
            return Err(SessionError::UnknownRecord {
                line,
                kind: other.to_string(),
            })
        }
    };

    Ok(Some(record))
}

fn parse_field<T: std::str::FromStr>(
    value: Option<&str>,
    field: &'static str,
    line: usize,
) -> Result<T, SessionError> {
    let value = value.ok_or(SessionError::MissingField { line, field })?;
    value.trim().parse().map_err(|_| SessionError::BadValue {
        line,
        field,
        value: value.to_string(),
    })
}
