//! Scripted capture subsystem for tests and the demo runner.
//!
//! [`MockBackend`] behaves like a platform capture stack with one
//! camera. Frames are pushed in from any thread through a [`MockFeed`];
//! hardware side effects (torch, locks, attached handles) are observed
//! through a [`MockProbe`].

use super::device::{Capability, CaptureBackend, CaptureDevice, CaptureError, DeviceError};
use super::frame::{Frame, BYTES_PER_PIXEL, RED_CHANNEL};
use crate::session::FrameSink;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Builds a tightly packed frame whose every pixel has red channel `red`.
pub fn solid_frame(width: u32, height: u32, red: u8, sequence: u64) -> Frame {
    let mut pixels = vec![0u8; width as usize * height as usize * BYTES_PER_PIXEL];
    for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
        px[0] = 40;
        px[1] = 40;
        px[RED_CHANNEL] = red;
        px[3] = 255;
    }
    Frame::packed(pixels, width, height, sequence)
}

/// Capabilities and scripted failures of the mock camera.
#[derive(Debug, Clone)]
pub struct MockDeviceSpec {
    /// Device name reported in logs.
    pub name: String,
    /// Has a torch.
    pub torch: bool,
    /// Supports holding focus.
    pub locked_focus: bool,
    /// Supports holding exposure.
    pub locked_exposure: bool,
    /// Torch requests are refused.
    pub reject_torch: bool,
    /// Focus lock requests are refused.
    pub reject_focus_lock: bool,
    /// Exposure lock requests are refused.
    pub reject_exposure_lock: bool,
    /// A rejected torch request still lights the lamp.
    pub torch_lit_on_reject: bool,
    /// Number of `torch_off` calls that fail before one succeeds.
    pub torch_off_failures: u32,
}

impl Default for MockDeviceSpec {
    fn default() -> Self {
        Self {
            name: "mock-camera".to_string(),
            torch: true,
            locked_focus: true,
            locked_exposure: true,
            reject_torch: false,
            reject_focus_lock: false,
            reject_exposure_lock: false,
            torch_lit_on_reject: false,
            torch_off_failures: 0,
        }
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    torch_on: AtomicBool,
    torch_level_bits: AtomicU32,
    torch_requests: AtomicUsize,
    torch_off_requests: AtomicUsize,
    focus_locked: AtomicBool,
    exposure_locked: AtomicBool,
    devices_acquired: AtomicUsize,
    active_devices: AtomicUsize,
    input_attached: AtomicBool,
    output_attached: AtomicBool,
    delivering: AtomicBool,
}

/// Read-only view of the mock hardware state.
#[derive(Debug, Clone)]
pub struct MockProbe(Arc<ProbeState>);

impl MockProbe {
    /// Whether the torch is lit.
    pub fn torch_on(&self) -> bool {
        self.0.torch_on.load(Ordering::SeqCst)
    }

    /// Level of the last successful torch request.
    pub fn torch_level(&self) -> f32 {
        f32::from_bits(self.0.torch_level_bits.load(Ordering::SeqCst))
    }

    /// Number of times the torch was asked to switch on.
    pub fn torch_requests(&self) -> usize {
        self.0.torch_requests.load(Ordering::SeqCst)
    }

    /// Number of times the torch was asked to switch off.
    pub fn torch_off_requests(&self) -> usize {
        self.0.torch_off_requests.load(Ordering::SeqCst)
    }

    /// Whether focus is held.
    pub fn focus_locked(&self) -> bool {
        self.0.focus_locked.load(Ordering::SeqCst)
    }

    /// Whether exposure is held.
    pub fn exposure_locked(&self) -> bool {
        self.0.exposure_locked.load(Ordering::SeqCst)
    }

    /// Total devices handed out since creation.
    pub fn devices_acquired(&self) -> usize {
        self.0.devices_acquired.load(Ordering::SeqCst)
    }

    /// Devices handed out and not yet dropped.
    pub fn active_devices(&self) -> usize {
        self.0.active_devices.load(Ordering::SeqCst)
    }

    /// Whether an input is attached to the session.
    pub fn input_attached(&self) -> bool {
        self.0.input_attached.load(Ordering::SeqCst)
    }

    /// Whether a frame output is attached to the session.
    pub fn output_attached(&self) -> bool {
        self.0.output_attached.load(Ordering::SeqCst)
    }

    /// Whether frames are being delivered.
    pub fn delivering(&self) -> bool {
        self.0.delivering.load(Ordering::SeqCst)
    }
}

/// The mock camera.
#[derive(Debug)]
pub struct MockDevice {
    spec: MockDeviceSpec,
    torch_off_failures: u32,
    state: Arc<ProbeState>,
}

impl MockDevice {
    fn new(spec: MockDeviceSpec, state: Arc<ProbeState>) -> Self {
        state.devices_acquired.fetch_add(1, Ordering::SeqCst);
        state.active_devices.fetch_add(1, Ordering::SeqCst);
        Self {
            torch_off_failures: spec.torch_off_failures,
            spec,
            state,
        }
    }

    fn check(&self, capability: Capability, reject: bool) -> Result<(), DeviceError> {
        if !self.supports(capability) {
            return Err(DeviceError::Unsupported(capability));
        }
        if reject {
            return Err(DeviceError::Rejected {
                capability,
                reason: "configuration lock unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.state.active_devices.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CaptureDevice for MockDevice {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Torch => self.spec.torch,
            Capability::LockedFocus => self.spec.locked_focus,
            Capability::LockedExposure => self.spec.locked_exposure,
        }
    }

    fn set_torch(&mut self, level: f32) -> Result<(), DeviceError> {
        self.state.torch_requests.fetch_add(1, Ordering::SeqCst);
        if self.spec.reject_torch && self.spec.torch_lit_on_reject && self.spec.torch {
            self.state.torch_on.store(true, Ordering::SeqCst);
        }
        self.check(Capability::Torch, self.spec.reject_torch)?;
        self.state
            .torch_level_bits
            .store(level.to_bits(), Ordering::SeqCst);
        self.state.torch_on.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn torch_off(&mut self) -> Result<(), DeviceError> {
        self.state.torch_off_requests.fetch_add(1, Ordering::SeqCst);
        self.check(Capability::Torch, false)?;
        if self.torch_off_failures > 0 {
            self.torch_off_failures -= 1;
            return Err(DeviceError::Rejected {
                capability: Capability::Torch,
                reason: "device busy".to_string(),
            });
        }
        self.state.torch_on.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn lock_focus(&mut self) -> Result<(), DeviceError> {
        self.check(Capability::LockedFocus, self.spec.reject_focus_lock)?;
        self.state.focus_locked.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn lock_exposure(&mut self) -> Result<(), DeviceError> {
        self.check(Capability::LockedExposure, self.spec.reject_exposure_lock)?;
        self.state.exposure_locked.store(true, Ordering::SeqCst);
        Ok(())
    }
}

type SharedSink = Arc<Mutex<Option<FrameSink>>>;

fn lock_sink(sink: &SharedSink) -> MutexGuard<'_, Option<FrameSink>> {
    sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Pushes frames into the mock capture subsystem.
#[derive(Debug, Clone)]
pub struct MockFeed {
    sink: SharedSink,
    state: Arc<ProbeState>,
    sequence: Arc<AtomicU64>,
}

impl MockFeed {
    /// Delivers a frame. Returns false if delivery is not running.
    pub fn push(&self, frame: Frame) -> bool {
        let sink = lock_sink(&self.sink);
        if !self.state.delivering.load(Ordering::SeqCst) {
            return false;
        }
        match sink.as_ref() {
            Some(sink) => sink.push(frame),
            None => false,
        }
    }

    /// Delivers a uniform frame with the next sequence number.
    pub fn push_solid(&self, width: u32, height: u32, red: u8) -> bool {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.push(solid_frame(width, height, red, sequence))
    }
}

/// Builder for [`MockBackend`] with scripted failures.
#[derive(Debug, Default)]
pub struct MockBackendBuilder {
    device: Option<MockDeviceSpec>,
    no_device: bool,
    fail_input: bool,
    fail_attach: bool,
    fail_start: bool,
}

impl MockBackendBuilder {
    /// Replaces the default camera.
    pub fn device(mut self, spec: MockDeviceSpec) -> Self {
        self.device = Some(spec);
        self
    }

    /// Leaves the platform without a camera.
    pub fn no_device(mut self) -> Self {
        self.no_device = true;
        self
    }

    /// Makes opening an input fail.
    pub fn fail_input(mut self) -> Self {
        self.fail_input = true;
        self
    }

    /// Makes attaching the frame output fail.
    pub fn fail_attach(mut self) -> Self {
        self.fail_attach = true;
        self
    }

    /// Makes starting delivery fail.
    pub fn fail_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Returns the backend with its feed and probe.
    pub fn build(self) -> (MockBackend, MockFeed, MockProbe) {
        let state = Arc::new(ProbeState::default());
        let sink: SharedSink = Arc::new(Mutex::new(None));
        let device = if self.no_device {
            None
        } else {
            Some(self.device.unwrap_or_default())
        };

        let backend = MockBackend {
            device,
            fail_input: self.fail_input,
            fail_attach: self.fail_attach,
            fail_start: self.fail_start,
            sink: Arc::clone(&sink),
            state: Arc::clone(&state),
        };
        let feed = MockFeed {
            sink,
            state: Arc::clone(&state),
            sequence: Arc::new(AtomicU64::new(0)),
        };
        (backend, feed, MockProbe(state))
    }
}

/// Mock capture subsystem with a single camera.
#[derive(Debug)]
pub struct MockBackend {
    device: Option<MockDeviceSpec>,
    fail_input: bool,
    fail_attach: bool,
    fail_start: bool,
    sink: SharedSink,
    state: Arc<ProbeState>,
}

impl MockBackend {
    /// A backend with one fully capable camera.
    pub fn create() -> (Self, MockFeed, MockProbe) {
        Self::builder().build()
    }

    /// A backend with no camera at all.
    pub fn without_device() -> (Self, MockFeed, MockProbe) {
        Self::builder().no_device().build()
    }

    /// Starts a scripted backend.
    pub fn builder() -> MockBackendBuilder {
        MockBackendBuilder::default()
    }
}

impl CaptureBackend for MockBackend {
    type Device = MockDevice;

    fn default_device(&mut self) -> Result<MockDevice, CaptureError> {
        let spec = self.device.clone().ok_or(CaptureError::NoDeviceAvailable)?;
        Ok(MockDevice::new(spec, Arc::clone(&self.state)))
    }

    fn open_input(&mut self, device: &mut MockDevice) -> Result<(), CaptureError> {
        if self.fail_input {
            return Err(CaptureError::InputCreationFailed(format!(
                "{} is busy",
                device.name()
            )));
        }
        Ok(())
    }

    fn attach(&mut self, sink: FrameSink) -> Result<(), CaptureError> {
        if self.fail_attach {
            return Err(CaptureError::AttachFailed(
                "session cannot add output".to_string(),
            ));
        }
        *lock_sink(&self.sink) = Some(sink);
        self.state.input_attached.store(true, Ordering::SeqCst);
        self.state.output_attached.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn start_delivery(&mut self) -> Result<(), CaptureError> {
        if self.fail_start {
            return Err(CaptureError::Delivery("stream refused to start".to_string()));
        }
        self.state.delivering.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_delivery(&mut self) -> Result<(), CaptureError> {
        // Taken so that no push is mid-flight once this returns
        let _sink = lock_sink(&self.sink);
        self.state.delivering.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn detach(&mut self) -> Result<(), CaptureError> {
        *lock_sink(&self.sink) = None;
        self.state.input_attached.store(false, Ordering::SeqCst);
        self.state.output_attached.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::frame_channel;

    #[test]
    fn test_solid_frame_layout() {
        let frame = solid_frame(4, 2, 200, 7);
        assert!(frame.is_valid());
        assert_eq!(frame.sequence(), 7);
        assert_eq!(frame.pixels()[RED_CHANNEL], 200);
        assert_eq!(frame.pixels()[BYTES_PER_PIXEL + RED_CHANNEL], 200);
    }

    #[test]
    fn test_device_counts() {
        let (mut backend, _feed, probe) = MockBackend::create();
        let device = backend.default_device().unwrap();
        assert_eq!(probe.active_devices(), 1);
        drop(device);
        assert_eq!(probe.active_devices(), 0);
        assert_eq!(probe.devices_acquired(), 1);
    }

    #[test]
    fn test_feed_requires_delivery() {
        let (mut backend, feed, probe) = MockBackend::create();
        let (sink, source) = frame_channel();

        assert!(!feed.push_solid(8, 8, 10));

        backend.attach(sink).unwrap();
        assert!(probe.input_attached());
        assert!(!feed.push_solid(8, 8, 10));

        backend.start_delivery().unwrap();
        assert!(feed.push_solid(8, 8, 10));
        assert_eq!(source.try_recv().map(|f| f.sequence()), Some(3));

        backend.stop_delivery().unwrap();
        backend.detach().unwrap();
        assert!(!probe.output_attached());
        assert!(!feed.push_solid(8, 8, 10));
    }

    #[test]
    fn test_unsupported_torch() {
        let spec = MockDeviceSpec {
            torch: false,
            ..Default::default()
        };
        let (mut backend, _feed, _probe) = MockBackend::builder().device(spec).build();
        let mut device = backend.default_device().unwrap();
        assert!(matches!(
            device.set_torch(1.0),
            Err(DeviceError::Unsupported(Capability::Torch))
        ));
    }
}
