//! Prometheus metrics exporter for finger-presence monitoring.
//!
//! # Metrics Exposed
//!
//! - `finger_presence_session_running` - Session state (1=running, 0=idle)
//! - `finger_presence_detected` - Finger decision of the last processed frame
//! - `finger_presence_red_mean` - Red-channel mean of the last processed frame
//! - `finger_presence_frames_processed_total` - Frames that updated the flag
//! - `finger_presence_frames_skipped_total` - Frames with nothing to sample
//! - `finger_presence_frames_dropped_total` - Frames replaced before sampling
//!
//! The HTTP exporter is behind the `metrics` feature.
//!
//! # Example
//!
//! ```no_run
//! use finger_presence::capture::MockBackend;
//! use finger_presence::metrics::{MetricsRegistry, MetricsSnapshot};
//! use finger_presence::session::CaptureSession;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! let (backend, _feed, _probe) = MockBackend::create();
//! let mut session = CaptureSession::new(backend);
//! session.start();
//!
//! registry.update(&MetricsSnapshot::from_session(&session));
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
