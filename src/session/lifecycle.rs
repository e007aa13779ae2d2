//! Capture session state machine.

use super::delivery::frame_channel;
use super::worker::SamplerWorker;
use crate::capture::configurator::{self, DeviceGuard, TuneReport};
use crate::capture::{CaptureBackend, CaptureConfig, CaptureDevice, CaptureError, SamplerConfig};
use crate::sampling::{FingerPresence, FrameSampler, IntensitySample};
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lifecycle state of a [`CaptureSession`].
///
/// `Starting` and `Stopping` only exist while `start`/`stop` run; between
/// calls a session is either `Idle` or `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// No device held.
    Idle,
    /// Acquiring and tuning the device.
    Starting,
    /// Frames are being sampled.
    Running,
    /// Releasing the device.
    Stopping,
}

/// Resources held while running.
struct Active<D: CaptureDevice> {
    device: DeviceGuard<D>,
    worker: SamplerWorker,
    tune: TuneReport,
}

/// Owns one capture pipeline: device, frame delivery and sampler.
///
/// `start` and `stop` must be called from a single control context.
/// [`finger_detected`](Self::finger_detected) and the [`FingerPresence`]
/// handle may be read from anywhere.
pub struct CaptureSession<B: CaptureBackend> {
    backend: B,
    capture_config: CaptureConfig,
    sampler_config: SamplerConfig,
    presence: Arc<FingerPresence>,
    state: SessionState,
    active: Option<Active<B::Device>>,
    dropped: Arc<AtomicU64>,
    last_error: Option<CaptureError>,
}

impl<B: CaptureBackend> CaptureSession<B> {
    /// Creates an idle session with default capture and sampler settings.
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, CaptureConfig::default(), SamplerConfig::default())
    }

    /// Creates an idle session with explicit settings.
    pub fn with_config(backend: B, capture: CaptureConfig, sampler: SamplerConfig) -> Self {
        Self {
            backend,
            capture_config: capture,
            sampler_config: sampler,
            presence: Arc::new(FingerPresence::new()),
            state: SessionState::Idle,
            active: None,
            dropped: Arc::new(AtomicU64::new(0)),
            last_error: None,
        }
    }

    /// Begins capture. Does nothing if already running.
    ///
    /// Failure is silent: the session stays idle and the reason is kept
    /// in [`last_error`](Self::last_error). Call again to retry.
    pub fn start(&mut self) {
        // Outcome already recorded in last_error
        let _ = self.try_start();
    }

    /// Begins capture, reporting why the session could not reach `Running`.
    pub fn try_start(&mut self) -> Result<(), CaptureError> {
        if self.state == SessionState::Running {
            return Ok(());
        }

        self.state = SessionState::Starting;
        match self.bring_up() {
            Ok(active) => {
                tracing::info!(
                    torch = active.tune.torch_on,
                    focus_locked = active.tune.focus_locked,
                    exposure_locked = active.tune.exposure_locked,
                    "Capture session running"
                );
                self.active = Some(active);
                self.state = SessionState::Running;
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                tracing::debug!(error = %e, "Capture start aborted");
                self.state = SessionState::Idle;
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    fn bring_up(&mut self) -> Result<Active<B::Device>, CaptureError> {
        let mut device = configurator::acquire(&mut self.backend)?;
        let tune = configurator::tune(&mut device, &self.capture_config);

        let (sink, source) = frame_channel();
        let dropped = source.dropped_counter();
        let sampler = FrameSampler::new(self.sampler_config.clone(), Arc::clone(&self.presence));
        let worker = SamplerWorker::spawn(source, sampler)
            .map_err(|e| CaptureError::Worker(e.to_string()))?;

        let attached = self.backend.attach(sink);
        let started = attached.and_then(|()| self.backend.start_delivery());
        if let Err(e) = started {
            self.halt_delivery();
            self.detach_backend();
            worker.shutdown();
            if let Err(release_err) = configurator::release(device) {
                tracing::warn!(error = %release_err, "Failed to release device");
            }
            return Err(e);
        }

        self.dropped = dropped;
        Ok(Active {
            device,
            worker,
            tune,
        })
    }

    /// Ends capture and releases the hardware. Does nothing if idle.
    ///
    /// Every teardown step runs even if an earlier one fails. Focus and
    /// exposure locks are left in place.
    pub fn stop(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        self.state = SessionState::Stopping;

        self.halt_delivery();
        if let Some(Active { device, worker, .. }) = self.active.take() {
            worker.shutdown();
            if let Err(e) = configurator::release(device) {
                tracing::warn!(error = %e, "Failed to switch torch off");
            }
        }
        self.detach_backend();

        self.state = SessionState::Idle;
        tracing::info!(
            frames_processed = self.presence.frames_processed(),
            frames_dropped = self.frames_dropped(),
            "Capture session stopped"
        );
    }

    fn halt_delivery(&mut self) {
        if let Err(e) = self.backend.stop_delivery() {
            tracing::warn!(error = %e, "Failed to halt frame delivery");
        }
    }

    fn detach_backend(&mut self) {
        if let Err(e) = self.backend.detach() {
            tracing::warn!(error = %e, "Failed to detach capture input/output");
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true while frames are being sampled.
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Finger decision of the last processed frame; false before any.
    pub fn finger_detected(&self) -> bool {
        self.presence.finger_detected()
    }

    /// Shared handle on the published flag and counters.
    pub fn presence(&self) -> Arc<FingerPresence> {
        Arc::clone(&self.presence)
    }

    /// Opens a per-frame intensity stream.
    pub fn subscribe(&self) -> Receiver<IntensitySample> {
        self.presence.subscribe()
    }

    /// Why the most recent start attempt did not reach `Running`.
    pub fn last_error(&self) -> Option<&CaptureError> {
        self.last_error.as_ref()
    }

    /// Tuning outcome of the running device.
    pub fn tune_report(&self) -> Option<TuneReport> {
        self.active.as_ref().map(|active| active.tune)
    }

    /// Frames evicted from the delivery slot during the latest run.
    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<B: CaptureBackend> Drop for CaptureSession<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mock::{MockBackend, MockDeviceSpec, MockFeed, MockProbe};
    use std::time::{Duration, Instant};

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    fn session() -> (CaptureSession<MockBackend>, MockFeed, MockProbe) {
        let (backend, feed, probe) = MockBackend::create();
        (CaptureSession::new(backend), feed, probe)
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let (mut session, _feed, probe) = session();
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(probe.devices_acquired(), 0);
    }

    #[test]
    fn test_start_runs_and_tunes_device() {
        let (mut session, _feed, probe) = session();
        assert!(!session.finger_detected());

        session.start();

        assert_eq!(session.state(), SessionState::Running);
        assert!(probe.torch_on());
        assert!(probe.focus_locked());
        assert!(probe.exposure_locked());
        assert!(probe.input_attached());
        assert!(probe.output_attached());
        assert!(probe.delivering());
        assert!(!session.finger_detected());
        assert_eq!(
            session.tune_report(),
            Some(TuneReport {
                torch_on: true,
                focus_locked: true,
                exposure_locked: true,
            })
        );
    }

    #[test]
    fn test_double_start_keeps_one_device() {
        let (mut session, _feed, probe) = session();
        session.start();
        session.start();

        assert!(session.is_running());
        assert_eq!(probe.devices_acquired(), 1);
        assert_eq!(probe.active_devices(), 1);
        assert_eq!(probe.torch_requests(), 1);
    }

    #[test]
    fn test_stop_turns_torch_off_and_detaches() {
        let (mut session, feed, probe) = session();
        session.start();
        session.stop();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(!probe.torch_on());
        assert!(!probe.input_attached());
        assert!(!probe.output_attached());
        assert!(!probe.delivering());
        assert_eq!(probe.active_devices(), 0);
        // Locks are not reverted on stop
        assert!(probe.focus_locked());
        assert!(probe.exposure_locked());
        assert!(!feed.push_solid(64, 64, 200));
    }

    #[test]
    fn test_frames_drive_finger_flag() {
        let (mut session, feed, _probe) = session();
        let presence = session.presence();
        session.start();

        assert!(feed.push_solid(640, 480, 200));
        assert!(wait_until(|| presence.frames_processed() == 1));
        assert!(session.finger_detected());
        assert_eq!(presence.last_mean(), Some(200.0));

        assert!(feed.push_solid(640, 480, 50));
        assert!(wait_until(|| presence.frames_processed() == 2));
        assert!(!session.finger_detected());

        session.stop();
    }

    #[test]
    fn test_flag_survives_stop_and_restart() {
        let (mut session, feed, probe) = session();
        let presence = session.presence();
        session.start();
        feed.push_solid(64, 64, 250);
        assert!(wait_until(|| presence.frames_processed() == 1));
        session.stop();

        assert!(session.finger_detected());

        session.start();
        assert!(session.is_running());
        assert_eq!(probe.devices_acquired(), 2);
        assert!(probe.torch_on());
    }

    #[test]
    fn test_subscriber_sees_intensity_stream() {
        let (mut session, feed, _probe) = session();
        let samples = session.subscribe();
        session.start();

        feed.push_solid(64, 64, 90);
        let sample = samples.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(sample.red_mean, 90.0);
        assert!(!sample.finger_detected);
    }

    #[test]
    fn test_no_device_stays_idle() {
        let (backend, _feed, _probe) = MockBackend::without_device();
        let mut session = CaptureSession::new(backend);

        session.start();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(matches!(
            session.last_error(),
            Some(CaptureError::NoDeviceAvailable)
        ));
        assert!(matches!(
            session.try_start(),
            Err(CaptureError::NoDeviceAvailable)
        ));
    }

    #[test]
    fn test_input_failure_releases_device() {
        let (backend, _feed, probe) = MockBackend::builder().fail_input().build();
        let mut session = CaptureSession::new(backend);

        assert!(matches!(
            session.try_start(),
            Err(CaptureError::InputCreationFailed(_))
        ));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(probe.active_devices(), 0);
        assert!(!probe.torch_on());
    }

    #[test]
    fn test_attach_failure_turns_torch_back_off() {
        let (backend, _feed, probe) = MockBackend::builder().fail_attach().build();
        let mut session = CaptureSession::new(backend);

        assert!(matches!(
            session.try_start(),
            Err(CaptureError::AttachFailed(_))
        ));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(probe.torch_requests(), 1);
        assert!(!probe.torch_on());
        assert_eq!(probe.active_devices(), 0);
        assert!(!probe.output_attached());
    }

    #[test]
    fn test_delivery_failure_detaches() {
        let (backend, _feed, probe) = MockBackend::builder().fail_start().build();
        let mut session = CaptureSession::new(backend);

        assert!(matches!(session.try_start(), Err(CaptureError::Delivery(_))));
        assert!(!probe.input_attached());
        assert!(!probe.torch_on());
        assert_eq!(probe.active_devices(), 0);
    }

    #[test]
    fn test_stop_with_failing_torch_off_still_releases() {
        let spec = MockDeviceSpec {
            torch_off_failures: 1,
            ..Default::default()
        };
        let (backend, _feed, probe) = MockBackend::builder().device(spec).build();
        let mut session = CaptureSession::new(backend);
        session.start();

        session.stop();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(!probe.torch_on());
        assert!(!probe.input_attached());
    }

    #[test]
    fn test_stop_turns_off_torch_lit_despite_rejection() {
        let spec = MockDeviceSpec {
            reject_torch: true,
            torch_lit_on_reject: true,
            ..Default::default()
        };
        let (backend, _feed, probe) = MockBackend::builder().device(spec).build();
        let mut session = CaptureSession::new(backend);
        session.start();
        assert_eq!(session.tune_report().map(|r| r.torch_on), Some(false));
        assert!(probe.torch_on());

        session.stop();

        assert!(!probe.torch_on());
        assert_eq!(probe.torch_off_requests(), 1);
    }

    #[test]
    fn test_device_without_torch_runs() {
        let spec = MockDeviceSpec {
            torch: false,
            locked_focus: false,
            ..Default::default()
        };
        let (backend, _feed, probe) = MockBackend::builder().device(spec).build();
        let mut session = CaptureSession::new(backend);

        session.start();

        assert!(session.is_running());
        assert!(!probe.torch_on());
        assert!(!probe.focus_locked());
        assert!(probe.exposure_locked());
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_dropping_session_releases_hardware() {
        let (mut session, _feed, probe) = session();
        session.start();
        drop(session);

        assert!(!probe.torch_on());
        assert!(!probe.input_attached());
        assert_eq!(probe.active_devices(), 0);
    }

    #[test]
    fn test_frames_dropped_counter() {
        let (mut session, feed, _probe) = session();
        session.start();
        for _ in 0..50 {
            feed.push_solid(640, 480, 10);
        }
        session.stop();

        // At most one frame is lost to shutdown
        let accounted = session.presence().frames_processed() + session.frames_dropped();
        assert!(accounted == 49 || accounted == 50, "accounted {accounted}");
    }
}
