//! SafeNeck Session Replay
//!
//! Drives the safety monitor on a host at 50 Hz from a recorded session
//! (or a synthetic fall scenario) and prints every publish. Useful for
//! tuning thresholds against real recordings without flashing a device.
//!
//! ```text
//! safeneck-replay --demo
//! safeneck-replay [--verbose] [--legacy] [--json] session.log
//! RUST_LOG=debug safeneck-replay --demo
//! ```
//!
//! Thresholds follow the firmware configuration, including the
//! compile-time `IMPACT_THRESHOLD_G` style overrides.

mod adapters;
mod session;

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use adapters::{ConsolePublisher, FixedBattery, Pa1010dDecoder, ReplayGps, ReplayImu};
use clap::Parser;
use log::LevelFilter;
use safety_monitor::config::{ConfigError, PositionFormat, SystemConfig};
use safety_monitor::detection::AlertEvent;
use safety_monitor::monitor::SafetyMonitor;
use safety_monitor::sensors::ImuReport;
use session::{Record, Session};

/// Control loop period (50 Hz)
const LOOP_PERIOD_MS: u64 = 20;

/// Keep polling after the last record so pending windows can close
const TAIL_MS: u64 = 5000;

const REPLAY_BATTERY_PCT: f32 = 100.0;

#[derive(Parser, Debug)]
#[command(name = "safeneck-replay", about = "Replay a recorded session through the safety monitor")]
struct Options {
    /// Run the built-in walk, fall, lie-still scenario
    #[arg(long, conflicts_with = "path")]
    demo: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Publish the legacy location payload instead of gps/position
    #[arg(long)]
    legacy: bool,

    /// Print delivered alerts as JSON after the summary
    #[arg(long)]
    json: bool,

    /// Session recording (I/S/G records)
    #[arg(value_name = "SESSION", required_unless_present = "demo")]
    path: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct ReplaySummary {
    alerts: Vec<AlertEvent>,
    suppressed: Vec<AlertEvent>,
    sentences: usize,
    polls: u64,
    published: Vec<(String, String)>,
    publish_failures: u32,
    /// GPS bytes still queued when the replay ended
    gps_backlog: usize,
}

fn replay(session: &Session, config: SystemConfig) -> Result<ReplaySummary, ConfigError> {
    let mut monitor = SafetyMonitor::new(
        config,
        ReplayImu::new(),
        ReplayGps::default(),
        Pa1010dDecoder::new(),
        ConsolePublisher::default(),
        FixedBattery(REPLAY_BATTERY_PCT),
    )?;

    let records = session.records();
    let end_ms = session.end_ms() + TAIL_MS;
    let mut summary = ReplaySummary::default();
    let mut next = 0;
    let mut now_ms = 0;

    while now_ms <= end_ms {
        while let Some(record) = records.get(next).filter(|r| r.ms() <= now_ms) {
            match record {
                Record::Imu { accel: [x, y, z], .. } => {
                    monitor.imu_mut().push(ImuReport::LinearAcceleration {
                        x: *x,
                        y: *y,
                        z: *z,
                    })
                }
                Record::Stability { class, .. } => {
                    monitor.imu_mut().push(ImuReport::Stability(*class))
                }
                Record::Gps { text, .. } => monitor.gps_mut().push_line(text),
            }
            next += 1;
        }

        let report = monitor.poll(now_ms);
        summary.sentences += report.sentences;
        summary.publish_failures += report.publish_failures;
        if let Some(alert) = report.alert {
            println!("[{:>7} ms] ALERT {} peak {:.2}g", now_ms, alert.kind.as_str(), alert.peak_g);
            summary.alerts.push(alert);
        }
        if let Some(alert) = report.suppressed {
            println!("[{:>7} ms] suppressed {} (cooldown)", now_ms, alert.kind.as_str());
            summary.suppressed.push(alert);
        }

        summary.polls += 1;
        now_ms += LOOP_PERIOD_MS;
    }

    summary.published = monitor.publisher().inner().published.clone();
    summary.gps_backlog = monitor.gps_mut().pending();
    Ok(summary)
}

fn main() -> Result<(), Box<dyn Error>> {
    let opts = Options::parse();

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let session = match &opts.path {
        Some(path) => Session::parse(&fs::read_to_string(path)?)?,
        None => Session::demo(),
    };

    let mut config = SystemConfig::from_env()?;
    if opts.legacy {
        config.publish.format = PositionFormat::Legacy;
    }

    println!("============================================================");
    println!("  SafeNeck replay: {} records, {} ms", session.records().len(), session.end_ms());
    println!(
        "  impact > {:.1}g, freefall < {:.2}g, cooldown {} ms",
        config.detection.impact_threshold_g,
        config.detection.freefall_threshold_g,
        config.detection.alert_cooldown_ms
    );
    println!("============================================================");

    let summary = replay(&session, config)?;

    println!("------------------------------------------------------------");
    println!(
        "  polls={} sentences={} gps_backlog={} publishes={} failures={}",
        summary.polls,
        summary.sentences,
        summary.gps_backlog,
        summary.published.len(),
        summary.publish_failures
    );
    println!(
        "  alerts={} suppressed={}",
        summary.alerts.len(),
        summary.suppressed.len()
    );
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&summary.alerts)?);
    }

    Ok(())
}
