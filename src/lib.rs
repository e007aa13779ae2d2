//! Finger Presence Detection Library
//!
//! Samples camera frames continuously and decides, frame by frame,
//! whether a finger is pressed against the lens. A downstream
//! photoplethysmography (PPG) heart-rate estimator uses the flag to
//! decide when the incoming intensity signal can be trusted; the
//! per-frame intensity is available to it as a stream.
//!
//! # Architecture
//!
//! ```text
//! session (lifecycle) → capture (acquire + tune device) → frame delivery
//!                                                              ↓
//!                         FingerPresence ← sampling (per frame)
//! ```
//!
//! # Design Principles
//!
//! - **Steady optics**: torch at fixed intensity, focus and exposure held,
//!   so brightness changes follow blood volume
//! - **Bounded per-frame work**: a fixed subsampling grid over the central
//!   third of the frame, independent of resolution
//! - **Newest frame wins**: a single delivery slot, never a backlog
//! - **Lamp never left on**: the device handle switches the torch off on
//!   every stop path, including unwinding
//!
//! # Example
//!
//! ```no_run
//! use finger_presence::{CaptureSession, MockBackend};
//!
//! let (backend, feed, _probe) = MockBackend::create();
//! let mut session = CaptureSession::new(backend);
//! session.start();
//!
//! // A bright red frame, as seen through a lit fingertip
//! feed.push_solid(640, 480, 210);
//!
//! if session.finger_detected() {
//!     println!("finger on lens");
//! }
//! session.stop();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod metrics;
pub mod sampling;
pub mod session;

// Re-export commonly used types at crate root
pub use capture::{
    Capability, CaptureBackend, CaptureConfig, CaptureDevice, CaptureError, Frame, MockBackend,
    SamplerConfig,
};
pub use sampling::{FingerPresence, FrameSampler, IntensitySample};
pub use session::{CaptureSession, SessionState};

#[cfg(feature = "camera")]
pub use capture::NokhwaBackend;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
