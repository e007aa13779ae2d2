//! Finger Presence CLI
//!
//! Runs a capture session and logs finger on/off transitions. Without a
//! camera it drives the mock capture subsystem with a synthetic
//! fingertip signal.

use clap::{Parser, ValueEnum};
use finger_presence::{
    capture::{CaptureBackend, FileConfig, MockBackend, MockFeed},
    metrics::{MetricsRegistry, MetricsSnapshot},
    session::CaptureSession,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Synthetic scene fed to the mock camera.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Pattern {
    /// Finger over a lit lens the whole time.
    Covered,
    /// Uncovered lens showing a dim room.
    Ambient,
    /// Finger placed and lifted every three seconds.
    Alternate,
}

#[derive(Debug, Parser)]
#[command(name = "finger-presence", version, about = "Camera finger-presence detector")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scene fed to the mock camera.
    #[arg(long, value_enum, default_value_t = Pattern::Alternate)]
    pattern: Pattern,

    /// Number of frames to run for (overrides the config file).
    #[arg(long)]
    frames: Option<u32>,

    /// Run until interrupted.
    #[arg(long)]
    continuous: bool,

    /// Use the system camera instead of the mock.
    #[cfg(feature = "camera")]
    #[arg(long)]
    camera: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Finger Presence v{}", finger_presence::VERSION);

    let mut config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };
    if let Some(frames) = args.frames {
        config.output.frame_count = frames;
    }
    config.output.continuous |= args.continuous;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || running.store(false, Ordering::SeqCst)) {
            warn!("Failed to install Ctrl-C handler: {}", e);
        }
    }

    let registry = match MetricsRegistry::new() {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            eprintln!("Failed to create metrics registry: {}", e);
            std::process::exit(1);
        }
    };
    #[cfg(feature = "metrics")]
    spawn_metrics_server(config.output.metrics_port, Arc::clone(&registry));

    #[cfg(feature = "camera")]
    if args.camera {
        let backend = finger_presence::NokhwaBackend::new(config.capture.clone());
        let mut session =
            CaptureSession::with_config(backend, config.capture.clone(), config.sampler.clone());
        run(&mut session, &config, &running, &registry, None);
        return;
    }

    let (backend, feed, _probe) = MockBackend::create();
    let mut session =
        CaptureSession::with_config(backend, config.capture.clone(), config.sampler.clone());
    info!(pattern = ?args.pattern, "Using mock camera input");
    let feeder = Feeder {
        feed,
        pattern: args.pattern,
        width: config.capture.width,
        height: config.capture.height,
        fps: config.capture.fps,
    };
    run(&mut session, &config, &running, &registry, Some(feeder));
}

/// Runs the session until the frame budget is spent or Ctrl-C.
fn run<B: CaptureBackend>(
    session: &mut CaptureSession<B>,
    config: &FileConfig,
    running: &AtomicBool,
    registry: &MetricsRegistry,
    feeder: Option<Feeder>,
) {
    if let Err(e) = session.try_start() {
        eprintln!("Capture did not start: {}", e);
        std::process::exit(1);
    }

    let samples = session.subscribe();
    let presence = session.presence();
    let frame_budget = (!config.output.continuous).then_some(u64::from(config.output.frame_count));
    let mut frame_index = 0u64;
    let mut last_detected = presence.finger_detected();
    let started = Instant::now();

    while running.load(Ordering::SeqCst) {
        if let Some(feeder) = feeder.as_ref() {
            if frame_budget.is_some_and(|budget| frame_index >= budget) {
                break;
            }
            feeder.push(frame_index);
            frame_index += 1;
        } else if frame_budget.is_some_and(|budget| presence.frames_processed() >= budget) {
            break;
        }

        while let Ok(sample) = samples.try_recv() {
            if sample.finger_detected != last_detected {
                last_detected = sample.finger_detected;
                info!(
                    sequence = sample.sequence,
                    red_mean = sample.red_mean,
                    "Finger {}",
                    if last_detected { "detected" } else { "removed" }
                );
            }
        }
        registry.update(&MetricsSnapshot::from_session(session));

        let frame_period = Duration::from_secs(1) / config.capture.fps.max(1);
        std::thread::sleep(frame_period);
    }

    session.stop();
    registry.update(&MetricsSnapshot::from_session(session));

    info!(
        "Ran {:.1}s: {} frames processed, {} skipped, {} dropped",
        started.elapsed().as_secs_f64(),
        presence.frames_processed(),
        presence.frames_skipped(),
        session.frames_dropped()
    );
    println!(
        "finger_detected={} last_red_mean={}",
        presence.finger_detected(),
        presence
            .last_mean()
            .map(|m| format!("{:.1}", m))
            .unwrap_or_else(|| "n/a".to_string())
    );
}

/// Synthesizes frames for the mock camera.
struct Feeder {
    feed: MockFeed,
    pattern: Pattern,
    width: u32,
    height: u32,
    fps: u32,
}

impl Feeder {
    /// Pulse rate of the synthetic fingertip, in beats per second.
    const PULSE_HZ: f64 = 1.2;

    fn push(&self, frame_index: u64) {
        let fps = f64::from(self.fps.max(1));
        let t = frame_index as f64 / fps;
        let covered = match self.pattern {
            Pattern::Covered => true,
            Pattern::Ambient => false,
            Pattern::Alternate => (t / 3.0) as u64 % 2 == 0,
        };
        let red = if covered {
            // Saturated red with a small pulsatile component
            190.0 + 8.0 * (2.0 * std::f64::consts::PI * Self::PULSE_HZ * t).sin()
        } else {
            60.0
        };
        self.feed.push_solid(self.width, self.height, red as u8);
    }
}

#[cfg(feature = "metrics")]
fn spawn_metrics_server(port: u16, registry: Arc<MetricsRegistry>) {
    use finger_presence::metrics::{MetricsServer, MetricsServerConfig};

    if port == 0 {
        return;
    }
    let spawned = std::thread::Builder::new()
        .name("metrics".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Failed to start metrics runtime: {}", e);
                    return;
                }
            };
            let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
            if let Err(e) = runtime.block_on(server.run()) {
                warn!("Metrics server stopped: {}", e);
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to spawn metrics thread: {}", e);
    }
}
