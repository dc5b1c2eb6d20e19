//! Host-side collaborators backed by session records

use std::collections::VecDeque;

use pa1010d::Pa1010d;
use safety_monitor::gps::{DecoderStats, FixSnapshot, NmeaDecoder};
use safety_monitor::publish::{BatteryGauge, PublishError, Publisher};
use safety_monitor::sensors::{GpsByteSource, ImuReport, ImuSource, SensorError};

/// IMU fed from recorded reports; always ready
#[derive(Default)]
pub struct ReplayImu {
    pending: VecDeque<ImuReport>,
}

impl ReplayImu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, report: ImuReport) {
        self.pending.push_back(report);
    }
}

impl ImuSource for ReplayImu {
    fn is_ready(&self) -> bool {
        true
    }

    fn next_report(&mut self) -> Option<ImuReport> {
        self.pending.pop_front()
    }
}

/// GPS byte stream fed from recorded sentences
#[derive(Default)]
pub struct ReplayGps {
    bytes: VecDeque<u8>,
}

impl ReplayGps {
    pub fn push_line(&mut self, text: &str) {
        self.bytes.extend(text.bytes());
        self.bytes.extend(*b"\r\n");
    }

    pub fn pending(&self) -> usize {
        self.bytes.len()
    }
}

impl GpsByteSource for ReplayGps {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, SensorError> {
        let n = buf.len().min(self.bytes.len());
        for (slot, byte) in buf.iter_mut().zip(self.bytes.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

/// PA1010D decoder behind the monitor's decoder trait
#[derive(Default)]
pub struct Pa1010dDecoder(Pa1010d);

impl Pa1010dDecoder {
    pub fn new() -> Self {
        Self(Pa1010d::new())
    }
}

impl NmeaDecoder for Pa1010dDecoder {
    fn encode(&mut self, byte: u8, now_ms: u64) -> bool {
        self.0.encode(byte, now_ms)
    }

    fn fix(&self, now_ms: u64) -> Option<FixSnapshot> {
        let fix = self.0.fix();
        if !fix.location_valid {
            return None;
        }
        Some(FixSnapshot {
            latitude: fix.lat,
            longitude: fix.lon,
            altitude_m: fix.altitude_m,
            hdop: fix.hdop,
            speed_kmph: fix.speed_kmph,
            satellites: fix.satellites.unwrap_or(0),
            age_ms: fix.age_ms(now_ms).unwrap_or(0),
            utc_unix_secs: fix.utc_unix_secs(),
        })
    }

    fn stats(&self) -> DecoderStats {
        let stats = self.0.stats();
        DecoderStats {
            chars_processed: stats.chars_processed,
            sentences_with_fix: stats.sentences_with_fix,
            passed_checksum: stats.passed_checksum,
            failed_checksum: stats.failed_checksum,
        }
    }
}

/// Prints every publish and keeps a copy for the summary
#[derive(Default)]
pub struct ConsolePublisher {
    pub published: Vec<(String, String)>,
    pub offline: bool,
}

impl Publisher for ConsolePublisher {
    fn is_connected(&self) -> bool {
        !self.offline
    }

    fn publish(&mut self, topic: &str, payload: &str, ack: bool) -> Result<(), PublishError> {
        println!(
            ">> {:<26} {}{}",
            topic,
            payload,
            if ack { "  [ack]" } else { "" }
        );
        self.published.push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

/// Constant battery level
pub struct FixedBattery(pub f32);

impl BatteryGauge for FixedBattery {
    fn state_of_charge(&mut self) -> Option<f32> {
        Some(self.0)
    }
}
