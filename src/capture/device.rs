//! Device and capture-subsystem abstractions.
//!
//! A [`CaptureBackend`] stands for the platform capture subsystem: it
//! hands out the default video device, builds an input from it and
//! delivers frames into a [`FrameSink`] from its own thread. A
//! [`CaptureDevice`] is the physical camera; its tuning knobs are
//! individually optional and callers ask [`CaptureDevice::supports`]
//! before touching them.

use crate::session::FrameSink;
use thiserror::Error;

/// Optional hardware features relevant to PPG sensing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// An illumination source (torch/lamp) next to the lens.
    Torch,
    /// A focus mode that can be held at its current setting.
    LockedFocus,
    /// An exposure mode that can be held at its current setting.
    LockedExposure,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::Torch => "torch",
            Capability::LockedFocus => "locked focus",
            Capability::LockedExposure => "locked exposure",
        };
        f.write_str(name)
    }
}

/// Errors that abort a capture start.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    /// The platform has no camera.
    #[error("no video capture device available")]
    NoDeviceAvailable,
    /// The camera is busy or access was denied.
    #[error("failed to create input from device: {0}")]
    InputCreationFailed(String),
    /// The input or the frame output could not be added.
    #[error("failed to attach to capture session: {0}")]
    AttachFailed(String),
    /// Delivery could not be started or stopped.
    #[error("frame delivery failed: {0}")]
    Delivery(String),
    /// The sampler thread could not be spawned.
    #[error("failed to spawn sampler worker: {0}")]
    Worker(String),
}

/// Errors from individual device tuning requests.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// The device lacks the capability.
    #[error("device does not support {0}")]
    Unsupported(Capability),
    /// The device refused the request.
    #[error("{capability} request rejected: {reason}")]
    Rejected {
        /// Capability that was requested.
        capability: Capability,
        /// Reason given by the device.
        reason: String,
    },
}

/// A physical camera that can be tuned for PPG capture.
pub trait CaptureDevice {
    /// Human-readable device name, for logs.
    fn name(&self) -> &str;

    /// Returns true if the device offers the capability.
    fn supports(&self, capability: Capability) -> bool;

    /// Turns the illumination source on at `level` in `(0.0, 1.0]`.
    fn set_torch(&mut self, level: f32) -> Result<(), DeviceError>;

    /// Turns the illumination source off.
    fn torch_off(&mut self) -> Result<(), DeviceError>;

    /// Holds focus at its current setting.
    fn lock_focus(&mut self) -> Result<(), DeviceError>;

    /// Holds exposure at its current setting.
    fn lock_exposure(&mut self) -> Result<(), DeviceError>;
}

/// The platform capture subsystem.
///
/// Calls arrive from a single control context in the order
/// `default_device`, `open_input`, `attach`, `start_delivery`, and on the
/// way down `stop_delivery`, `detach`. `detach` must be safe to call
/// after a partial start.
pub trait CaptureBackend {
    /// Device type handed out by this backend.
    type Device: CaptureDevice;

    /// Selects the platform's default video device.
    fn default_device(&mut self) -> Result<Self::Device, CaptureError>;

    /// Builds an input stream from the device.
    fn open_input(&mut self, device: &mut Self::Device) -> Result<(), CaptureError>;

    /// Adds the input and a frame output delivering into `sink`.
    fn attach(&mut self, sink: FrameSink) -> Result<(), CaptureError>;

    /// Begins frame delivery.
    fn start_delivery(&mut self) -> Result<(), CaptureError>;

    /// Halts frame delivery. No frame is pushed into the sink afterwards.
    fn stop_delivery(&mut self) -> Result<(), CaptureError>;

    /// Removes the input and output, dropping the sink.
    fn detach(&mut self) -> Result<(), CaptureError>;
}
