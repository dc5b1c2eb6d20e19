/// Outbound collaborators: event publisher and battery gauge
///
/// Delivery is best-effort. A failed publish is logged and counted, never
/// retried, and never stops the control loop.
use log::{info, warn};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("transport not connected")]
    NotConnected,
    #[error("publish rejected: {0}")]
    Rejected(String),
    #[error("publish timed out")]
    Timeout,
}

/// Cloud event transport (Particle cloud, MQTT, console)
pub trait Publisher {
    fn is_connected(&self) -> bool;

    /// Send one event. `ack` requests acknowledged delivery where supported.
    fn publish(&mut self, topic: &str, payload: &str, ack: bool) -> Result<(), PublishError>;
}

/// Battery fuel gauge
pub trait BatteryGauge {
    /// State of charge in percent (0-100), None when the gauge is unreadable
    fn state_of_charge(&mut self) -> Option<f32>;
}

/// Counts and logs every publish attempt
pub struct TelemetryPublisher<P> {
    inner: P,
    sent: u32,
    failed: u32,
}

impl<P: Publisher> TelemetryPublisher<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            sent: 0,
            failed: 0,
        }
    }

    /// Publish, logging the outcome; returns whether the transport accepted it
    pub fn send(&mut self, topic: &str, payload: &str, ack: bool) -> bool {
        if !self.inner.is_connected() {
            self.failed += 1;
            warn!("Publish to {} skipped: {}", topic, PublishError::NotConnected);
            return false;
        }

        match self.inner.publish(topic, payload, ack) {
            Ok(()) => {
                self.sent += 1;
                info!("Published {}: {}", topic, payload);
                true
            }
            Err(e) => {
                self.failed += 1;
                warn!("Publish to {} failed: {}", topic, e);
                false
            }
        }
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn failed(&self) -> u32 {
        self.failed
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}
