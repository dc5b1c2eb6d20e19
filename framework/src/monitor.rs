//! Safety monitor control loop
//!
//! Single-threaded, cooperative, fixed-cadence. Each `poll` drains the GPS
//! byte source through the sanitizer into the decoder, drains the IMU,
//! ticks the detection engine once, and handles the slower periodic
//! publish and diagnostics digest. Time is read once by the caller and
//! passed in.
use log::{debug, info};

use crate::config::{ConfigError, PositionFormat, SystemConfig};
use crate::detection::{AlertEvent, DetectionEngine, DetectionSignal};
use crate::diagnostics::{DiagnosticsDigest, GpsHealth, ImuHealth, SystemHealth};
use crate::gps::NmeaDecoder;
use crate::nmea::NmeaSanitizer;
use crate::payload;
use crate::publish::{BatteryGauge, Publisher, TelemetryPublisher};
use crate::sensors::{GpsByteSource, ImuSource, ImuState};

/// Upper bound on IMU reports drained per iteration
const MAX_IMU_REPORTS_PER_POLL: usize = 64;

/// What one loop iteration did
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoopReport {
    pub alert: Option<AlertEvent>,
    pub suppressed: Option<AlertEvent>,
    pub signal: Option<DetectionSignal>,
    /// Sentences forwarded to the decoder
    pub sentences: usize,
    pub position_published: bool,
    pub publish_failures: u32,
}

pub struct SafetyMonitor<I, G, D, P, B> {
    config: SystemConfig,
    imu: I,
    gps: G,
    decoder: D,
    publisher: TelemetryPublisher<P>,
    battery: B,
    sanitizer: NmeaSanitizer,
    engine: DetectionEngine,
    imu_state: ImuState,
    chunk: Vec<u8>,
    started_ms: Option<u64>,
    last_publish_ms: Option<u64>,
    last_digest_ms: Option<u64>,
    alerts_sent: u32,
    alerts_suppressed: u32,
}

impl<I, G, D, P, B> SafetyMonitor<I, G, D, P, B>
where
    I: ImuSource,
    G: GpsByteSource,
    D: NmeaDecoder,
    P: Publisher,
    B: BatteryGauge,
{
    pub fn new(
        config: SystemConfig,
        imu: I,
        gps: G,
        decoder: D,
        publisher: P,
        battery: B,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            "Safety monitor: impact {:.1}g, freefall {:.2}g, cooldown {}ms, publish every {}ms",
            config.detection.impact_threshold_g,
            config.detection.freefall_threshold_g,
            config.detection.alert_cooldown_ms,
            config.publish.interval_ms
        );

        Ok(Self {
            sanitizer: NmeaSanitizer::with_max_len(config.gps.max_sentence_len),
            engine: DetectionEngine::new(config.detection),
            chunk: vec![0; config.gps.chunk_bytes],
            config,
            imu,
            gps,
            decoder,
            publisher: TelemetryPublisher::new(publisher),
            battery,
            imu_state: ImuState::new(),
            started_ms: None,
            last_publish_ms: None,
            last_digest_ms: None,
            alerts_sent: 0,
            alerts_suppressed: 0,
        })
    }

    /// Run one loop iteration at `now_ms`
    pub fn poll(&mut self, now_ms: u64) -> LoopReport {
        let start = *self.started_ms.get_or_insert(now_ms);
        let failures_before = self.publisher.failed();
        let mut report = LoopReport {
            sentences: self.poll_gps(now_ms),
            ..Default::default()
        };

        let imu_ready = self.imu.is_ready();
        if imu_ready {
            for _ in 0..MAX_IMU_REPORTS_PER_POLL {
                match self.imu.next_report() {
                    Some(r) => self.imu_state.apply(r),
                    None => break,
                }
            }
        }

        // A not-ready IMU is never ticked
        if let Some(sample) = self.imu_state.sample().filter(|_| imu_ready) {
            let outcome = self.engine.step(sample, now_ms);

            if let Some(signal) = outcome.signal {
                self.publish_signal(&signal);
            }
            if let Some(alert) = outcome.alert {
                let alert = alert.with_fix(self.decoder.fix(now_ms));
                self.publish_alert(&alert);
                report.alert = Some(alert);
            }
            if outcome.suppressed.is_some() {
                self.alerts_suppressed += 1;
            }
            report.suppressed = outcome.suppressed;
            report.signal = outcome.signal;
        }

        let last_publish = *self.last_publish_ms.get_or_insert(start);
        if now_ms.saturating_sub(last_publish) >= self.config.publish.interval_ms {
            self.last_publish_ms = Some(now_ms);
            report.position_published = self.publish_position(now_ms);
        }

        let diag = self.config.diagnostics;
        if diag.debug_gps || diag.debug_imu {
            let due = self
                .last_digest_ms
                .map_or(true, |last| now_ms.saturating_sub(last) >= diag.digest_interval_ms);
            if due {
                self.last_digest_ms = Some(now_ms);
                info!("\n{}", self.digest(now_ms));
            }
        }

        report.publish_failures = self.publisher.failed() - failures_before;
        report
    }

    /// Drain a bounded burst from the GPS source; returns sentences forwarded
    fn poll_gps(&mut self, now_ms: u64) -> usize {
        let mut sentences = 0;
        for _ in 0..self.config.gps.burst_chunks {
            let n = match self.gps.read_chunk(&mut self.chunk) {
                Ok(0) => break,
                Ok(n) => n.min(self.chunk.len()),
                Err(e) => {
                    // Bytes were lost, so any partial line is corrupt
                    debug!("GPS read failed: {}", e);
                    self.sanitizer.reset();
                    break;
                }
            };

            let decoder = &mut self.decoder;
            sentences += self.sanitizer.feed(&self.chunk[..n], |sentence| {
                for b in sentence.wire_bytes() {
                    decoder.encode(b, now_ms);
                }
            });
        }
        sentences
    }

    fn publish_alert(&mut self, alert: &AlertEvent) {
        let body = payload::alert_payload(alert);
        info!("ALERT: {} (peak {:.2}g)", alert.kind.as_str(), alert.peak_g);
        if self
            .publisher
            .send(self.config.publish.alert_topic, &body, true)
        {
            self.alerts_sent += 1;
        }

        if self.config.publish.format == PositionFormat::Legacy {
            let battery = self.battery.state_of_charge().unwrap_or(0.0);
            let body = payload::legacy_alert_payload(alert, battery);
            self.publisher
                .send(self.config.publish.legacy_alert_topic, &body, true);
        }
    }

    fn publish_signal(&mut self, signal: &DetectionSignal) {
        let topic = match signal {
            DetectionSignal::ImpactDetected { .. } => self.config.publish.impact_topic,
            DetectionSignal::FreefallDetected { .. } => self.config.publish.freefall_topic,
            _ => return,
        };
        let threshold = self.config.detection.impact_threshold_g;
        if let Some(body) = payload::signal_payload(signal, threshold) {
            self.publisher.send(topic, &body.to_string(), false);
        }
    }

    fn publish_position(&mut self, now_ms: u64) -> bool {
        let fix = self.decoder.fix(now_ms);
        match self.config.publish.format {
            PositionFormat::Position => {
                let body = payload::position_payload(fix.as_ref());
                self.publisher
                    .send(self.config.publish.position_topic, &body, true)
            }
            PositionFormat::Legacy => {
                let battery = self.battery.state_of_charge().unwrap_or(0.0);
                let body = payload::legacy_location_payload(fix.as_ref(), battery);
                self.publisher
                    .send(self.config.publish.legacy_topic, &body, true)
            }
        }
    }

    /// Snapshot for the serial digest; sections follow the debug flags
    pub fn digest(&self, now_ms: u64) -> DiagnosticsDigest {
        let diag = self.config.diagnostics;
        let gps = diag.debug_gps.then(|| GpsHealth {
            last_gga: self.sanitizer.last_gga().map(str::to_string),
            last_rmc: self.sanitizer.last_rmc().map(str::to_string),
            fix: self.decoder.fix(now_ms),
            decoder: self.decoder.stats(),
            sanitizer: self.sanitizer.stats(),
        });
        let imu = diag.debug_imu.then(|| ImuHealth {
            ready: self.imu.is_ready(),
            linear_accel: self.imu_state.linear_accel,
            magnitude_g: self.imu_state.magnitude_g,
            stability: self.imu_state.stability,
            state: self.engine.state(),
            impact_threshold_g: self.config.detection.impact_threshold_g,
        });

        DiagnosticsDigest {
            gps,
            imu,
            system: SystemHealth {
                uptime_ms: now_ms.saturating_sub(self.started_ms.unwrap_or(now_ms)),
                publish_sent: self.publisher.sent(),
                publish_failed: self.publisher.failed(),
                alerts_sent: self.alerts_sent,
                alerts_suppressed: self.alerts_suppressed,
            },
        }
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    pub fn sanitizer(&self) -> &NmeaSanitizer {
        &self.sanitizer
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn publisher(&self) -> &TelemetryPublisher<P> {
        &self.publisher
    }

    pub fn imu_mut(&mut self) -> &mut I {
        &mut self.imu
    }

    pub fn gps_mut(&mut self) -> &mut G {
        &mut self.gps
    }

    pub fn alerts_sent(&self) -> u32 {
        self.alerts_sent
    }

    pub fn alerts_suppressed(&self) -> u32 {
        self.alerts_suppressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{AlertKind, DetectionState};
    use crate::gps::FixSnapshot;
    use crate::publish::PublishError;
    use crate::sensors::{ImuReport, SensorError, StabilityClass, G};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedImu {
        ready: bool,
        reports: VecDeque<ImuReport>,
    }

    impl ScriptedImu {
        fn push(&mut self, g: f32, stability: StabilityClass) {
            self.reports.push_back(ImuReport::Stability(stability));
            self.reports.push_back(ImuReport::LinearAcceleration {
                x: 0.0,
                y: 0.0,
                z: g * G,
            });
        }
    }

    impl ImuSource for ScriptedImu {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn next_report(&mut self) -> Option<ImuReport> {
            self.reports.pop_front()
        }
    }

    #[derive(Default)]
    struct ScriptedGps {
        bytes: VecDeque<u8>,
        fail: bool,
    }

    impl GpsByteSource for ScriptedGps {
        fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, SensorError> {
            if self.fail {
                return Err(SensorError::Bus);
            }
            let n = buf.len().min(self.bytes.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.bytes.pop_front().unwrap_or(0xFF);
            }
            Ok(n)
        }
    }

    /// Records wire bytes; reports a fix once a GPGGA line is seen
    #[derive(Default)]
    struct LineDecoder {
        text: String,
        has_fix: bool,
    }

    impl NmeaDecoder for LineDecoder {
        fn encode(&mut self, byte: u8, _now_ms: u64) -> bool {
            self.text.push(byte as char);
            if byte == b'\n' {
                self.has_fix |= self.text.lines().last().is_some_and(|l| l.starts_with("$GPGGA"));
                return true;
            }
            false
        }

        fn fix(&self, _now_ms: u64) -> Option<FixSnapshot> {
            self.has_fix.then_some(FixSnapshot {
                latitude: 48.1173,
                longitude: 11.516_666_7,
                altitude_m: Some(545.4),
                satellites: 8,
                ..Default::default()
            })
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Vec<(String, String, bool)>,
        reject: bool,
    }

    impl Publisher for RecordingPublisher {
        fn is_connected(&self) -> bool {
            true
        }

        fn publish(&mut self, topic: &str, payload: &str, ack: bool) -> Result<(), PublishError> {
            if self.reject {
                return Err(PublishError::Timeout);
            }
            self.sent.push((topic.to_string(), payload.to_string(), ack));
            Ok(())
        }
    }

    struct FixedBattery(f32);

    impl BatteryGauge for FixedBattery {
        fn state_of_charge(&mut self) -> Option<f32> {
            Some(self.0)
        }
    }

    type TestMonitor =
        SafetyMonitor<ScriptedImu, ScriptedGps, LineDecoder, RecordingPublisher, FixedBattery>;

    fn monitor(config: SystemConfig) -> TestMonitor {
        let imu = ScriptedImu {
            ready: true,
            ..Default::default()
        };
        SafetyMonitor::new(
            config,
            imu,
            ScriptedGps::default(),
            LineDecoder::default(),
            RecordingPublisher::default(),
            FixedBattery(76.5),
        )
        .unwrap()
    }

    fn topics(m: &TestMonitor) -> Vec<&str> {
        m.publisher()
            .inner()
            .sent
            .iter()
            .map(|(t, _, _)| t.as_str())
            .collect()
    }

    const GNGGA: &str = "$GNGGA,064951.000,2307.1256,N,12016.4438,E,1,8,0.95,39.9,M,17.8,M,,*65\r\n";

    #[test]
    fn test_impact_then_still_publishes_fall_alert_with_fix() {
        let mut m = monitor(SystemConfig::default());
        m.gps_mut().bytes.extend(GNGGA.bytes());

        m.imu_mut().push(4.2, StabilityClass::Motion);
        let report = m.poll(0);
        assert_eq!(report.sentences, 1);
        match report.signal {
            Some(DetectionSignal::ImpactDetected { g }) => assert!((g - 4.2).abs() < 1e-4),
            other => panic!("unexpected signal {:?}", other),
        }

        m.imu_mut().push(1.0, StabilityClass::Stable);
        m.poll(20);
        assert_eq!(m.engine().state(), DetectionState::PostImpact { since_ms: 20 });

        let report = m.poll(2020);
        let alert = report.alert.unwrap();
        assert_eq!(alert.kind, AlertKind::Fall);
        assert!(alert.fix.is_some());

        let sent = &m.publisher().inner().sent;
        assert_eq!(sent[0].0, "safety/impact_detected");
        assert!(!sent[0].2);
        let (topic, body, ack) = &sent[1];
        assert_eq!(topic, "safety/alert");
        assert!(*ack);
        assert!(body.starts_with(r#"{"alert":"fall","g":4.2,"lat":48.117300,"#));
        assert_eq!(m.alerts_sent(), 1);
    }

    #[test]
    fn test_remapped_sentence_reaches_decoder() {
        let mut m = monitor(SystemConfig::default());
        m.gps_mut().bytes.extend(GNGGA.bytes());
        m.poll(0);
        let text = &m.decoder().text;
        assert!(text.starts_with("$GPGGA,064951.000,"));
        assert!(text.ends_with("\r\n"));
        assert_eq!(m.sanitizer().stats().remapped, 1);
    }

    #[test]
    fn test_gps_burst_is_bounded() {
        let mut m = monitor(SystemConfig::default());
        m.gps_mut().bytes.extend(std::iter::repeat(b'x').take(1000));
        m.poll(0);
        assert_eq!(m.gps_mut().bytes.len(), 1000 - 320);
    }

    #[test]
    fn test_gps_read_error_skips_burst() {
        let mut m = monitor(SystemConfig::default());
        m.gps_mut().fail = true;
        let report = m.poll(0);
        assert_eq!(report.sentences, 0);
    }

    #[test]
    fn test_gps_read_error_drops_partial_line() {
        let mut m = monitor(SystemConfig::default());
        m.gps_mut().bytes.extend(GNGGA[..20].bytes());
        m.poll(0);
        assert_eq!(m.sanitizer().pending_len(), 20);

        m.gps_mut().fail = true;
        m.poll(20);
        assert_eq!(m.sanitizer().pending_len(), 0);

        m.gps_mut().fail = false;
        m.gps_mut().bytes.extend(GNGGA.bytes());
        assert_eq!(m.poll(40).sentences, 1);
        assert!(m.decoder().text.starts_with("$GPGGA,064951.000,2307.1256,"));
    }

    #[test]
    fn test_not_ready_imu_never_ticks() {
        let mut m = monitor(SystemConfig::default());
        m.imu_mut().ready = false;
        m.imu_mut().push(5.0, StabilityClass::Motion);
        let report = m.poll(0);
        assert!(report.signal.is_none());
        assert!(m.engine().state().is_idle());
        // Reports stay queued in the driver
        assert_eq!(m.imu_mut().reports.len(), 2);
    }

    #[test]
    fn test_no_tick_before_first_sample() {
        let mut m = monitor(SystemConfig::default());
        m.imu_mut()
            .reports
            .push_back(ImuReport::Stability(StabilityClass::Motion));
        let report = m.poll(0);
        assert_eq!(report, LoopReport::default());
    }

    #[test]
    fn test_publish_failure_counted_and_loop_continues() {
        let mut m = monitor(SystemConfig::default());
        m.publisher.inner_mut().reject = true;

        m.imu_mut().push(3.5, StabilityClass::Motion);
        let report = m.poll(0);
        assert_eq!(report.publish_failures, 1);

        m.imu_mut().push(1.0, StabilityClass::Motion);
        m.poll(20);
        let report = m.poll(520);
        assert_eq!(report.alert.map(|a| a.kind), Some(AlertKind::Impact));
        assert_eq!(report.publish_failures, 1);
        assert_eq!(m.alerts_sent(), 0);
        assert_eq!(m.publisher().failed(), 2);
    }

    #[test]
    fn test_periodic_position_publish() {
        let mut m = monitor(SystemConfig::default());
        assert!(!m.poll(0).position_published);
        assert!(!m.poll(29_999).position_published);
        assert!(m.poll(30_000).position_published);
        assert!(!m.poll(30_020).position_published);
        assert!(m.poll(60_000).position_published);

        let sent = &m.publisher().inner().sent;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "gps/position");
        assert_eq!(sent[0].1, r#"{"fix":false}"#);
        assert!(sent[0].2);
    }

    #[test]
    fn test_legacy_location_includes_battery() {
        let mut config = SystemConfig::default();
        config.publish.format = PositionFormat::Legacy;
        config.publish.interval_ms = 1000;
        let mut m = monitor(config);
        m.gps_mut().bytes.extend(GNGGA.bytes());

        m.poll(0);
        assert!(m.poll(1000).position_published);
        assert_eq!(topics(&m), vec!["safeneck/location"]);
        let body = &m.publisher().inner().sent[0].1;
        assert!(body.contains(r#""fix":true"#));
        assert!(body.contains(r#""bat":76.5"#));
    }

    #[test]
    fn test_legacy_alert_companion_event() {
        let mut config = SystemConfig::default();
        config.publish.format = PositionFormat::Legacy;
        let mut m = monitor(config);

        m.imu_mut().push(4.0, StabilityClass::Motion);
        m.poll(0);
        m.imu_mut().push(1.0, StabilityClass::Stable);
        m.poll(20);
        assert!(m.poll(2020).alert.is_some());

        assert_eq!(
            topics(&m),
            vec!["safety/impact_detected", "safety/alert", "safeneck/fall"]
        );
        let (_, body, ack) = &m.publisher().inner().sent[2];
        assert!(*ack);
        assert_eq!(
            body,
            r#"{"lat":0.000000,"lon":0.000000,"bat":76.5,"type":"fall","ts":0}"#
        );
        assert_eq!(m.alerts_sent(), 1);
    }

    #[test]
    fn test_cooldown_suppression_reported() {
        let mut m = monitor(SystemConfig::default());
        let episode = |m: &mut TestMonitor, t: u64| {
            m.imu_mut().push(4.0, StabilityClass::Motion);
            m.poll(t);
            m.imu_mut().push(1.0, StabilityClass::Stable);
            m.poll(t + 20);
            m.poll(t + 2020)
        };

        assert!(episode(&mut m, 0).alert.is_some());
        let report = episode(&mut m, 5000);
        assert!(report.alert.is_none());
        assert_eq!(report.suppressed.map(|a| a.kind), Some(AlertKind::Fall));
        assert_eq!(m.alerts_suppressed(), 1);
        assert_eq!(
            topics(&m),
            vec!["safety/impact_detected", "safety/alert", "safety/impact_detected"]
        );
    }

    #[test]
    fn test_digest_follows_debug_flags() {
        let mut config = SystemConfig::default();
        config.diagnostics.debug_imu = true;
        let mut m = monitor(config);
        m.imu_mut().push(1.0, StabilityClass::Stationary);
        m.poll(0);

        let digest = m.digest(1500);
        assert!(digest.gps.is_none());
        let imu = digest.imu.unwrap();
        assert!(imu.ready);
        assert_eq!(imu.stability, StabilityClass::Stationary);
        assert_eq!(digest.system.uptime_ms, 1500);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SystemConfig::default();
        config.publish.interval_ms = 0;
        let result = SafetyMonitor::new(
            config,
            ScriptedImu::default(),
            ScriptedGps::default(),
            LineDecoder::default(),
            RecordingPublisher::default(),
            FixedBattery(0.0),
        );
        assert!(result.is_err());
    }
}
