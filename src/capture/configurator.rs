//! Device acquisition, tuning and release.

use super::device::{Capability, CaptureBackend, CaptureDevice, CaptureError, DeviceError};
use super::CaptureConfig;

/// Outcome of a best-effort tuning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TuneReport {
    /// Torch was switched on.
    pub torch_on: bool,
    /// Focus is held.
    pub focus_locked: bool,
    /// Exposure is held.
    pub exposure_locked: bool,
}

/// Exclusive handle on an acquired device.
///
/// Tracks whether the torch may still be lit. Dropping the guard in that
/// state switches it off, so the lamp follows the guard's scope even when
/// a start sequence unwinds halfway.
pub struct DeviceGuard<D: CaptureDevice> {
    device: D,
    torch_on: bool,
}

impl<D: CaptureDevice> DeviceGuard<D> {
    fn new(device: D) -> Self {
        Self {
            device,
            torch_on: false,
        }
    }

    fn switch_torch_off(&mut self) -> Result<(), DeviceError> {
        match self.device.torch_off() {
            Ok(()) => {
                self.torch_on = false;
                Ok(())
            }
            Err(e) => {
                self.torch_on = true;
                Err(e)
            }
        }
    }
}

impl<D: CaptureDevice> Drop for DeviceGuard<D> {
    fn drop(&mut self) {
        if !self.torch_on {
            return;
        }
        if let Err(e) = self.switch_torch_off() {
            tracing::warn!(device = self.device.name(), error = %e, "Torch left on at drop");
        }
    }
}

impl<D: CaptureDevice> std::fmt::Debug for DeviceGuard<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceGuard")
            .field("device", &self.device.name())
            .field("torch_on", &self.torch_on)
            .finish()
    }
}

/// Selects the default device and opens an input stream on it.
pub fn acquire<B: CaptureBackend>(backend: &mut B) -> Result<DeviceGuard<B::Device>, CaptureError> {
    let mut device = backend.default_device()?;
    backend.open_input(&mut device)?;
    tracing::debug!(device = device.name(), "Device acquired");
    Ok(DeviceGuard::new(device))
}

/// Prepares the device for PPG sensing.
///
/// Each step runs only when the device supports it, and a rejected step
/// is skipped; tuning never fails as a whole.
pub fn tune<D: CaptureDevice>(guard: &mut DeviceGuard<D>, config: &CaptureConfig) -> TuneReport {
    let mut report = TuneReport::default();

    if guard.device.supports(Capability::Torch) {
        // A rejected request may still have lit the lamp
        guard.torch_on = true;
        match guard.device.set_torch(config.torch_level) {
            Ok(()) => report.torch_on = true,
            Err(e) => tracing::debug!(error = %e, "Skipping torch"),
        }
    }

    if guard.device.supports(Capability::LockedFocus) {
        match guard.device.lock_focus() {
            Ok(()) => report.focus_locked = true,
            Err(e) => tracing::debug!(error = %e, "Skipping focus lock"),
        }
    }

    if guard.device.supports(Capability::LockedExposure) {
        match guard.device.lock_exposure() {
            Ok(()) => report.exposure_locked = true,
            Err(e) => tracing::debug!(error = %e, "Skipping exposure lock"),
        }
    }

    tracing::debug!(device = guard.device.name(), ?report, "Device tuned");
    report
}

/// Releases the device, switching the torch off whenever it has one.
///
/// The torch is switched off even if tuning reported it as rejected, since
/// the hardware may have lit anyway. Focus and exposure are left as they
/// are. If switching the torch off fails here, the guard's drop tries once
/// more.
pub fn release<D: CaptureDevice>(mut guard: DeviceGuard<D>) -> Result<(), DeviceError> {
    if !guard.device.supports(Capability::Torch) {
        return Ok(());
    }
    guard.switch_torch_off()
}
