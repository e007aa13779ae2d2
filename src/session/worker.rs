//! Dedicated sequential processing context for the sampler.

use super::delivery::FrameSource;
use crate::sampling::FrameSampler;
use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;

/// Thread that feeds delivered frames to a [`FrameSampler`], one at a time.
///
/// Shutting down waits for the frame in progress, if any, but does not
/// start on a frame still waiting in the slot.
pub struct SamplerWorker {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SamplerWorker {
    /// Starts the worker on its own thread.
    pub fn spawn(source: FrameSource, sampler: FrameSampler) -> std::io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = bounded(0);
        let handle = std::thread::Builder::new()
            .name("ppg-sampler".to_string())
            .spawn(move || run(source, sampler, shutdown_rx))?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Stops the thread and waits for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Disconnecting the shutdown channel wakes the select below
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Sampler worker panicked");
            }
        }
    }
}

impl Drop for SamplerWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(source: FrameSource, sampler: FrameSampler, shutdown: Receiver<()>) {
    let frames = source.receiver();
    tracing::debug!("Sampler worker started");

    loop {
        select! {
            recv(frames) -> frame => match frame {
                Ok(frame) => {
                    // Both arms may be ready at once; shutdown wins
                    if is_shut_down(&shutdown) {
                        break;
                    }
                    sampler.on_frame(&frame);
                }
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        }
    }

    tracing::debug!("Sampler worker stopped");
}

fn is_shut_down(shutdown: &Receiver<()>) -> bool {
    matches!(shutdown.try_recv(), Err(TryRecvError::Disconnected))
}
