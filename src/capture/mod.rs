//! Camera devices, frames and capture configuration.
//!
//! This module covers everything on the hardware side of the sampler:
//! selecting and tuning a device for PPG sensing, the frame layout it
//! delivers, and the capture subsystems (mock and native) that push
//! frames towards a session.

#[cfg(feature = "camera")]
mod camera;
mod config;
pub mod configurator;
mod device;
mod frame;
pub mod mock;

#[cfg(feature = "camera")]
pub use camera::{NokhwaBackend, NokhwaDevice};
pub use config::{
    CaptureConfig, ConfigError, FileConfig, OutputConfig, SamplerConfig, DEFAULT_FINGER_THRESHOLD,
    DEFAULT_SAMPLE_STRIDE,
};
pub use configurator::{DeviceGuard, TuneReport};
pub use device::{Capability, CaptureBackend, CaptureDevice, CaptureError, DeviceError};
pub use frame::{Frame, BYTES_PER_PIXEL, RED_CHANNEL};
pub use mock::{MockBackend, MockDevice, MockDeviceSpec, MockFeed, MockProbe};
