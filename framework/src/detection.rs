/// Fall/impact detection engine
/// Classifies IDLE, FREEFALL, IMPACT and POST_IMPACT from a continuous
/// acceleration-magnitude + stability stream
///
/// ## Patterns
///
/// 1. **Fall**: sustained freefall (while moving) ends in a hard impact,
///    followed by stillness
/// 2. **Impact**: a hard impact (push, shove, collision) with or without
///    freefall; if the wearer resumes moving it is reported as an impact
///
/// The engine is a pure function of (state, sample, now). Time is passed in
/// by the caller once per loop iteration; nothing here reads a clock.
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::DetectionConfig;
use crate::freefall::FreefallTracker;
use crate::gps::FixSnapshot;
use crate::sensors::AccelSample;

/// Detection state; each active state carries its entry time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionState {
    /// Normal monitoring
    #[default]
    Idle,
    /// Freefall confirmed, waiting for impact
    Freefall { since_ms: u64 },
    /// Impact detected, moving to post-impact monitoring on the next tick
    Impact { since_ms: u64 },
    /// Watching for stillness after an impact
    PostImpact { since_ms: u64 },
}

impl DetectionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, DetectionState::Idle)
    }

    /// Entry time of the current episode phase
    pub fn since_ms(&self) -> Option<u64> {
        match *self {
            DetectionState::Idle => None,
            DetectionState::Freefall { since_ms }
            | DetectionState::Impact { since_ms }
            | DetectionState::PostImpact { since_ms } => Some(since_ms),
        }
    }

    /// Get state as string for display
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionState::Idle => "idle",
            DetectionState::Freefall { .. } => "freefall",
            DetectionState::Impact { .. } => "impact",
            DetectionState::PostImpact { .. } => "post_impact",
        }
    }
}

/// Running maximum magnitude of the current episode
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeakTracker {
    peak_g: f32,
}

impl PeakTracker {
    pub fn observe(&mut self, magnitude_g: f32) {
        if magnitude_g > self.peak_g {
            self.peak_g = magnitude_g;
        }
    }

    pub fn set(&mut self, magnitude_g: f32) {
        self.peak_g = magnitude_g;
    }

    pub fn reset(&mut self) {
        self.peak_g = 0.0;
    }

    pub fn value(&self) -> f32 {
        self.peak_g
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Impact followed by stillness
    Fall,
    /// Impact after which the wearer kept moving
    Impact,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::Fall => "fall",
            AlertKind::Impact => "impact",
        }
    }
}

/// User-facing alert, built once per qualifying outcome
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    /// Peak magnitude of the episode (g)
    pub peak_g: f32,
    pub at_ms: u64,
    /// Last known location, attached by the caller
    pub fix: Option<FixSnapshot>,
}

impl AlertEvent {
    pub fn with_fix(mut self, fix: Option<FixSnapshot>) -> Self {
        self.fix = fix;
        self
    }
}

/// Informational transitions, published or logged but never user alerts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectionSignal {
    /// Idle -> Impact
    ImpactDetected { g: f32 },
    /// Idle -> Freefall after the confirm window
    FreefallDetected { g: f32, sustained_ms: u64 },
    /// Freefall -> PostImpact, the classic fall pattern
    FallPattern { g: f32 },
    /// Freefall ended without impact (benign deceleration or timeout)
    FreefallCancelled,
    /// Post-impact window expired without a verdict
    EpisodeAbandoned,
}

/// Everything one tick produced
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickOutcome {
    /// Alert to hand to the publish collaborator
    pub alert: Option<AlertEvent>,
    /// Alert swallowed by the cooldown; never delivered
    pub suppressed: Option<AlertEvent>,
    pub signal: Option<DetectionSignal>,
}

/// Fall/impact classifier with alert cooldown
pub struct DetectionEngine {
    config: DetectionConfig,
    state: DetectionState,
    freefall: FreefallTracker,
    peak: PeakTracker,
    last_alert_ms: Option<u64>,
}

impl DetectionEngine {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            state: DetectionState::Idle,
            freefall: FreefallTracker::new(),
            peak: PeakTracker::default(),
            last_alert_ms: None,
        }
    }

    /// Run one sensor tick; returns the alert to deliver, if any
    pub fn tick(&mut self, sample: AccelSample, now_ms: u64) -> Option<AlertEvent> {
        self.step(sample, now_ms).alert
    }

    /// Run one sensor tick and report everything it produced
    pub fn step(&mut self, sample: AccelSample, now_ms: u64) -> TickOutcome {
        let cfg = self.config;
        let g = sample.magnitude_g;
        let mut outcome = TickOutcome::default();

        if !self.state.is_idle() {
            self.peak.observe(g);
        }

        self.freefall
            .update(&sample, now_ms, cfg.freefall_threshold_g, cfg.freefall_confirm_ms);

        match self.state {
            DetectionState::Idle => {
                if g > cfg.impact_threshold_g {
                    self.peak.set(g);
                    self.state = DetectionState::Impact { since_ms: now_ms };
                    info!(
                        "IMPACT detected: {:.2}g (threshold: {:.1}g)",
                        g, cfg.impact_threshold_g
                    );
                    outcome.signal = Some(DetectionSignal::ImpactDetected { g });
                } else if self.freefall.is_confirmed() {
                    self.peak.reset();
                    self.state = DetectionState::Freefall { since_ms: now_ms };
                    info!(
                        "FREEFALL confirmed: {:.2}g (sustained {}ms)",
                        g, cfg.freefall_confirm_ms
                    );
                    outcome.signal = Some(DetectionSignal::FreefallDetected {
                        g,
                        sustained_ms: cfg.freefall_confirm_ms,
                    });
                }
            }
            DetectionState::Freefall { since_ms } => {
                let elapsed = now_ms.saturating_sub(since_ms);
                if g > cfg.impact_threshold_g {
                    if elapsed >= cfg.freefall_min_ms {
                        info!("FALL PATTERN: freefall->impact ({:.2}g)", g);
                        self.state = DetectionState::PostImpact { since_ms: now_ms };
                        outcome.signal = Some(DetectionSignal::FallPattern { g });
                    } else {
                        // Too short to be a real freefall
                        debug!("Freefall {}ms too short, treating as impact", elapsed);
                        self.peak.set(g);
                        self.state = DetectionState::Impact { since_ms: now_ms };
                    }
                    self.freefall.reset();
                } else if g >= cfg.freefall_threshold_g {
                    debug!("Freefall ended without impact ({:.2}g)", g);
                    self.end_episode();
                    outcome.signal = Some(DetectionSignal::FreefallCancelled);
                } else if elapsed > cfg.freefall_timeout_ms {
                    debug!("Freefall timeout after {}ms", elapsed);
                    self.end_episode();
                    outcome.signal = Some(DetectionSignal::FreefallCancelled);
                }
            }
            DetectionState::Impact { .. } => {
                info!("Monitoring post-impact activity...");
                self.state = DetectionState::PostImpact { since_ms: now_ms };
            }
            DetectionState::PostImpact { since_ms } => {
                let elapsed = now_ms.saturating_sub(since_ms);
                let window_done = elapsed >= cfg.post_impact_still_ms;

                if window_done && sample.stability.is_still() {
                    self.raise(AlertKind::Fall, now_ms, &mut outcome);
                } else if sample.stability.is_motion() && elapsed >= cfg.post_impact_motion_ms {
                    // Moving again: a bump or shove, still alerted as an impact
                    self.raise(AlertKind::Impact, now_ms, &mut outcome);
                } else if elapsed
                    > cfg
                        .post_impact_still_ms
                        .saturating_add(cfg.post_impact_grace_ms)
                {
                    info!("Post-impact timeout, returning to idle");
                    self.end_episode();
                    outcome.signal = Some(DetectionSignal::EpisodeAbandoned);
                }
            }
        }

        outcome
    }

    /// Build an alert, apply the cooldown, and close the episode
    fn raise(&mut self, kind: AlertKind, now_ms: u64, outcome: &mut TickOutcome) {
        let alert = AlertEvent {
            kind,
            peak_g: self.peak.value(),
            at_ms: now_ms,
            fix: None,
        };

        let cooling_down = self
            .last_alert_ms
            .is_some_and(|last| now_ms.saturating_sub(last) < self.config.alert_cooldown_ms);

        if cooling_down {
            info!("Alert suppressed (cooldown): {}", kind.as_str());
            outcome.suppressed = Some(alert);
        } else {
            self.last_alert_ms = Some(now_ms);
            outcome.alert = Some(alert);
        }

        self.peak.reset();
        self.state = DetectionState::Idle;
    }

    fn end_episode(&mut self) {
        self.peak.reset();
        self.freefall.reset();
        self.state = DetectionState::Idle;
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn freefall(&self) -> &FreefallTracker {
        &self.freefall
    }

    /// Peak of the current episode (0 when idle)
    pub fn peak_g(&self) -> f32 {
        self.peak.value()
    }

    pub fn last_alert_ms(&self) -> Option<u64> {
        self.last_alert_ms
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}
