//! Single-slot frame hand-off between capture and sampler.
//!
//! The slot holds at most one frame. A frame arriving while the slot is
//! still full replaces the waiting one, so the sampler always sees the
//! newest frame and the capture side never blocks.

use crate::capture::Frame;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Creates a connected sink/source pair.
pub fn frame_channel() -> (FrameSink, FrameSource) {
    let (tx, rx) = bounded(1);
    let dropped = Arc::new(AtomicU64::new(0));
    let closed = Arc::new(AtomicBool::new(false));
    let sink = FrameSink {
        tx,
        evict: rx.clone(),
        dropped: Arc::clone(&dropped),
        closed: Arc::clone(&closed),
    };
    let source = FrameSource {
        rx,
        dropped,
        closed,
    };
    (sink, source)
}

/// Capture side of the slot.
#[derive(Debug, Clone)]
pub struct FrameSink {
    tx: Sender<Frame>,
    // Lets the producer evict a stale frame itself
    evict: Receiver<Frame>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl FrameSink {
    /// Offers a frame, evicting the waiting one if the slot is full.
    ///
    /// Returns false if the source has been dropped.
    pub fn push(&self, frame: Frame) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let mut frame = frame;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return true,
                Err(TrySendError::Full(rejected)) => {
                    if self.evict.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    frame = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    /// Frames evicted from the slot so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Sampler side of the slot.
#[derive(Debug)]
pub struct FrameSource {
    rx: Receiver<Frame>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl FrameSource {
    /// Takes the waiting frame, if any.
    pub fn try_recv(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Frames evicted from the slot so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn receiver(&self) -> &Receiver<Frame> {
        &self.rx
    }

    pub(crate) fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }
}
