//! Metrics collection and registry.

use crate::capture::CaptureBackend;
use crate::sampling::FingerPresence;
use crate::session::CaptureSession;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of session state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Whether the session is delivering frames.
    pub running: bool,
    /// Finger decision of the last processed frame.
    pub finger_detected: bool,
    /// Red mean of the last processed frame.
    pub red_mean: Option<f64>,
    /// Frames that updated the flag.
    pub frames_processed: u64,
    /// Frames with nothing to sample.
    pub frames_skipped: u64,
    /// Frames evicted from the delivery slot.
    pub frames_dropped: u64,
}

impl MetricsSnapshot {
    /// Reads the published presence state.
    pub fn from_presence(presence: &FingerPresence) -> Self {
        Self {
            running: false,
            finger_detected: presence.finger_detected(),
            red_mean: presence.last_mean(),
            frames_processed: presence.frames_processed(),
            frames_skipped: presence.frames_skipped(),
            frames_dropped: 0,
        }
    }

    /// Reads the current state of a session.
    pub fn from_session<B: CaptureBackend>(session: &CaptureSession<B>) -> Self {
        Self {
            running: session.is_running(),
            frames_dropped: session.frames_dropped(),
            ..Self::from_presence(&session.presence())
        }
    }
}

/// Prometheus metrics registry for finger-presence monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    session_running: IntGauge,
    finger_detected: IntGauge,
    red_mean: Gauge,

    frames_processed: IntCounter,
    frames_skipped: IntCounter,
    frames_dropped: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new registry with all metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let session_running = IntGauge::new(
            "finger_presence_session_running",
            "Capture session state (1=running, 0=idle)",
        )?;
        let finger_detected = IntGauge::new(
            "finger_presence_detected",
            "Finger decision of the last processed frame (1=present)",
        )?;
        let red_mean = Gauge::new(
            "finger_presence_red_mean",
            "Mean red-channel value of the last processed frame (0-255)",
        )?;

        let frames_processed = IntCounter::new(
            "finger_presence_frames_processed_total",
            "Frames that updated the finger flag",
        )?;
        let frames_skipped = IntCounter::new(
            "finger_presence_frames_skipped_total",
            "Frames skipped for a degenerate region or malformed buffer",
        )?;
        let frames_dropped = IntCounter::new(
            "finger_presence_frames_dropped_total",
            "Frames replaced in the delivery slot before sampling",
        )?;

        registry.register(Box::new(session_running.clone()))?;
        registry.register(Box::new(finger_detected.clone()))?;
        registry.register(Box::new(red_mean.clone()))?;
        registry.register(Box::new(frames_processed.clone()))?;
        registry.register(Box::new(frames_skipped.clone()))?;
        registry.register(Box::new(frames_dropped.clone()))?;

        Ok(Self {
            registry,
            session_running,
            finger_detected,
            red_mean,
            frames_processed,
            frames_skipped,
            frames_dropped,
        })
    }

    /// Updates all metrics from a snapshot.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.session_running.set(i64::from(snapshot.running));
        self.finger_detected.set(i64::from(snapshot.finger_detected));
        if let Some(mean) = snapshot.red_mean {
            self.red_mean.set(mean);
        }

        // Counters only move forward; apply the difference
        advance(&self.frames_processed, snapshot.frames_processed);
        advance(&self.frames_skipped, snapshot.frames_skipped);
        advance(&self.frames_dropped, snapshot.frames_dropped);
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}
