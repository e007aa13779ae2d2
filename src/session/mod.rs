//! Capture session lifecycle.
//!
//! A [`CaptureSession`] wires a capture backend to the frame sampler:
//!
//! ```text
//! start(): acquire device → tune → attach sink → start delivery
//!
//!   capture thread ──push──▶ [ single slot ] ──▶ sampler worker ──▶ FingerPresence
//!
//! stop():  halt delivery → join worker → torch off → detach
//! ```

mod delivery;
mod lifecycle;
mod worker;

pub use delivery::{frame_channel, FrameSink, FrameSource};
pub use lifecycle::{CaptureSession, SessionState};
pub use worker::SamplerWorker;
