//! Native camera backend built on `nokhwa`.
//!
//! `nokhwa::Camera` is not `Send` on every platform, so one camera thread
//! creates it, receives control commands and pulls frames while
//! delivery runs. Decoded RGBA pixels are reordered in place to the
//! B, G, R, A layout the sampler reads.

use super::device::{Capability, CaptureBackend, CaptureDevice, CaptureError, DeviceError};
use super::{CaptureConfig, Frame};
use crate::session::FrameSink;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, KnownCameraControl, RequestedFormat,
    RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use std::thread::JoinHandle;

type Reply<T> = Sender<Result<T, String>>;

enum Command {
    Open(Reply<Vec<KnownCameraControl>>),
    Lock(KnownCameraControl, Reply<()>),
    Attach(FrameSink),
    Start(Reply<()>),
    Stop(Reply<()>),
    Shutdown,
}

fn request<T>(
    commands: &Sender<Command>,
    build: impl FnOnce(Reply<T>) -> Command,
) -> Result<T, String> {
    let (reply, response) = bounded(1);
    commands
        .send(build(reply))
        .map_err(|_| "camera thread exited".to_string())?;
    response
        .recv()
        .map_err(|_| "camera thread exited".to_string())?
}

/// A camera found by `nokhwa::query`.
pub struct NokhwaDevice {
    name: String,
    index: CameraIndex,
    commands: Option<Sender<Command>>,
    controls: Vec<KnownCameraControl>,
}

impl NokhwaDevice {
    fn lock(
        &mut self,
        capability: Capability,
        control: KnownCameraControl,
    ) -> Result<(), DeviceError> {
        if !self.supports(capability) {
            return Err(DeviceError::Unsupported(capability));
        }
        let commands = self
            .commands
            .as_ref()
            .ok_or(DeviceError::Unsupported(capability))?;
        request(commands, |reply| Command::Lock(control, reply))
            .map_err(|reason| DeviceError::Rejected { capability, reason })
    }
}

impl CaptureDevice for NokhwaDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            // UVC webcams expose no illumination control
            Capability::Torch => false,
            Capability::LockedFocus => self.controls.contains(&KnownCameraControl::Focus),
            Capability::LockedExposure => self.controls.contains(&KnownCameraControl::Exposure),
        }
    }

    fn set_torch(&mut self, _level: f32) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(Capability::Torch))
    }

    fn torch_off(&mut self) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(Capability::Torch))
    }

    fn lock_focus(&mut self) -> Result<(), DeviceError> {
        self.lock(Capability::LockedFocus, KnownCameraControl::Focus)
    }

    fn lock_exposure(&mut self) -> Result<(), DeviceError> {
        self.lock(Capability::LockedExposure, KnownCameraControl::Exposure)
    }
}

struct CameraThread {
    commands: Sender<Command>,
    handle: JoinHandle<()>,
}

/// Capture subsystem backed by the platform's native camera API.
pub struct NokhwaBackend {
    config: CaptureConfig,
    thread: Option<CameraThread>,
}

impl NokhwaBackend {
    /// Creates a backend for the camera selected by `config.device_id`.
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            thread: None,
        }
    }

    fn commands(&self) -> Result<&Sender<Command>, CaptureError> {
        self.thread
            .as_ref()
            .map(|t| &t.commands)
            .ok_or_else(|| CaptureError::AttachFailed("no input opened".to_string()))
    }

    fn shutdown_thread(&mut self) {
        if let Some(thread) = self.thread.take() {
            // A send failure means the thread already exited
            let _ = thread.commands.send(Command::Shutdown);
            if thread.handle.join().is_err() {
                tracing::warn!("Camera thread panicked");
            }
        }
    }
}

impl Drop for NokhwaBackend {
    fn drop(&mut self) {
        self.shutdown_thread();
    }
}

impl CaptureBackend for NokhwaBackend {
    type Device = NokhwaDevice;

    fn default_device(&mut self) -> Result<NokhwaDevice, CaptureError> {
        let cameras = nokhwa::query(ApiBackend::Auto).map_err(|e| {
            tracing::debug!(error = %e, "Camera query failed");
            CaptureError::NoDeviceAvailable
        })?;
        let wanted = CameraIndex::Index(self.config.device_id);
        let info = cameras
            .iter()
            .find(|info| *info.index() == wanted)
            .or_else(|| cameras.first())
            .ok_or(CaptureError::NoDeviceAvailable)?;

        Ok(NokhwaDevice {
            name: info.human_name(),
            index: info.index().clone(),
            commands: None,
            controls: Vec::new(),
        })
    }

    fn open_input(&mut self, device: &mut NokhwaDevice) -> Result<(), CaptureError> {
        self.shutdown_thread();

        let (commands, inbox) = bounded(4);
        let index = device.index.clone();
        let config = self.config.clone();
        let handle = std::thread::Builder::new()
            .name("camera".to_string())
            .spawn(move || run_camera(index, config, inbox))
            .map_err(|e| CaptureError::InputCreationFailed(e.to_string()))?;
        self.thread = Some(CameraThread { commands, handle });

        let controls = request(self.commands()?, Command::Open)
            .map_err(CaptureError::InputCreationFailed);
        let controls = match controls {
            Ok(controls) => controls,
            Err(e) => {
                self.shutdown_thread();
                return Err(e);
            }
        };
        device.controls = controls;
        device.commands = Some(self.commands()?.clone());
        Ok(())
    }

    fn attach(&mut self, sink: FrameSink) -> Result<(), CaptureError> {
        self.commands()?
            .send(Command::Attach(sink))
            .map_err(|_| CaptureError::AttachFailed("camera thread exited".to_string()))
    }

    fn start_delivery(&mut self) -> Result<(), CaptureError> {
        request(self.commands()?, Command::Start).map_err(CaptureError::Delivery)
    }

    fn stop_delivery(&mut self) -> Result<(), CaptureError> {
        request(self.commands()?, Command::Stop).map_err(CaptureError::Delivery)
    }

    fn detach(&mut self) -> Result<(), CaptureError> {
        self.shutdown_thread();
        Ok(())
    }
}

fn open_camera(index: CameraIndex, config: &CaptureConfig) -> Result<Camera, String> {
    let format = CameraFormat::new(
        Resolution::new(config.width, config.height),
        FrameFormat::MJPEG,
        config.fps,
    );
    let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(format));
    Camera::new(index, requested).map_err(|e| e.to_string())
}

fn run_camera(index: CameraIndex, config: CaptureConfig, inbox: Receiver<Command>) {
    let mut camera: Option<Camera> = None;
    let mut sink: Option<FrameSink> = None;
    let mut streaming = false;
    let mut sequence = 0u64;

    loop {
        let command = if streaming {
            match inbox.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match inbox.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            }
        };

        match command {
            Some(Command::Open(reply)) => {
                let result = open_camera(index.clone(), &config).and_then(|cam| {
                    let controls = cam
                        .camera_controls()
                        .map(|all| all.iter().map(|c| c.control()).collect())
                        .unwrap_or_default();
                    camera = Some(cam);
                    Ok(controls)
                });
                let _ = reply.send(result);
            }
            Some(Command::Lock(control, reply)) => {
                let result = match camera.as_mut() {
                    Some(cam) => pin_control(cam, control),
                    None => Err("camera not open".to_string()),
                };
                let _ = reply.send(result);
            }
            Some(Command::Attach(new_sink)) => sink = Some(new_sink),
            Some(Command::Start(reply)) => {
                let result = match camera.as_mut() {
                    Some(cam) => cam.open_stream().map_err(|e| e.to_string()),
                    None => Err("camera not open".to_string()),
                };
                streaming = result.is_ok();
                let _ = reply.send(result);
            }
            Some(Command::Stop(reply)) => {
                let result = match camera.as_mut() {
                    Some(cam) if streaming => cam.stop_stream().map_err(|e| e.to_string()),
                    _ => Ok(()),
                };
                streaming = false;
                let _ = reply.send(result);
            }
            Some(Command::Shutdown) => break,
            None => {
                // frame() blocks until the device produces the next buffer
                if let Some(cam) = camera.as_mut() {
                    sequence += 1;
                    match grab_frame(cam, sequence) {
                        Ok(frame) => {
                            if let Some(sink) = sink.as_ref() {
                                sink.push(frame);
                            }
                        }
                        Err(e) => tracing::trace!(error = %e, "Dropped camera frame"),
                    }
                }
            }
        }
    }

    if let Some(mut cam) = camera {
        if streaming {
            let _ = cam.stop_stream();
        }
    }
}

/// Holds a control at its current value, switching it to manual mode.
fn pin_control(camera: &mut Camera, control: KnownCameraControl) -> Result<(), String> {
    let current = camera.camera_control(control).map_err(|e| e.to_string())?;
    camera
        .set_camera_control(control, current.value())
        .map_err(|e| e.to_string())
}

fn grab_frame(camera: &mut Camera, sequence: u64) -> Result<Frame, String> {
    let buffer = camera.frame().map_err(|e| e.to_string())?;
    let image = buffer
        .decode_image::<RgbAFormat>()
        .map_err(|e| e.to_string())?;
    let (width, height) = (image.width(), image.height());
    let mut pixels = image.into_raw();
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    Ok(Frame::packed(pixels, width, height, sequence))
}
