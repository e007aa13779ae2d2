//! Published finger-presence state.
//!
//! One writer (the sampler) and any number of readers. Every field is a
//! single atomic so readers never observe a torn value; the flag and the
//! mean are each last-writer-wins.

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Capacity of each intensity subscriber's queue.
pub const SUBSCRIBER_CAPACITY: usize = 256;

/// Per-frame output for consumers that analyze the waveform themselves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntensitySample {
    /// Sequence number of the source frame.
    pub sequence: u64,
    /// Mean of the sampled red-equivalent bytes, 0.0 to 255.0.
    pub red_mean: f64,
    /// Finger decision for this frame.
    pub finger_detected: bool,
    /// Wall-clock time the frame finished processing.
    pub processed_at: DateTime<Utc>,
}

/// Finger-presence flag plus per-frame counters.
#[derive(Debug)]
pub struct FingerPresence {
    detected: AtomicBool,
    last_mean_bits: AtomicU64,
    frames_processed: AtomicU64,
    frames_skipped: AtomicU64,
    subscribers: Mutex<Vec<Sender<IntensitySample>>>,
}

impl Default for FingerPresence {
    fn default() -> Self {
        Self {
            detected: AtomicBool::new(false),
            last_mean_bits: AtomicU64::new(f64::NAN.to_bits()),
            frames_processed: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl FingerPresence {
    /// Creates a cleared flag with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Finger decision of the last fully processed frame; false before any.
    #[inline]
    pub fn finger_detected(&self) -> bool {
        self.detected.load(Ordering::Acquire)
    }

    /// Red mean of the last fully processed frame.
    pub fn last_mean(&self) -> Option<f64> {
        let mean = f64::from_bits(self.last_mean_bits.load(Ordering::Acquire));
        (!mean.is_nan()).then_some(mean)
    }

    /// Frames that updated the flag.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Frames left unprocessed (degenerate region or malformed buffer).
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped.load(Ordering::Relaxed)
    }

    /// Opens an intensity stream.
    ///
    /// Samples are queued up to [`SUBSCRIBER_CAPACITY`]; when a subscriber
    /// falls behind, new samples for it are dropped. The stream ends when
    /// the receiver is dropped.
    pub fn subscribe(&self) -> Receiver<IntensitySample> {
        let (tx, rx) = bounded(SUBSCRIBER_CAPACITY);
        self.lock_subscribers().push(tx);
        rx
    }

    pub(crate) fn publish(&self, sequence: u64, red_mean: f64, finger_detected: bool) {
        self.last_mean_bits
            .store(red_mean.to_bits(), Ordering::Release);
        self.detected.store(finger_detected, Ordering::Release);
        self.frames_processed.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.lock_subscribers();
        if subscribers.is_empty() {
            return;
        }
        let sample = IntensitySample {
            sequence,
            red_mean,
            finger_detected,
            processed_at: Utc::now(),
        };
        subscribers.retain(|tx| match tx.try_send(sample) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub(crate) fn record_skip(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<Sender<IntensitySample>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let presence = FingerPresence::new();
        assert!(!presence.finger_detected());
        assert_eq!(presence.last_mean(), None);
        assert_eq!(presence.frames_processed(), 0);
    }

    #[test]
    fn test_last_writer_wins() {
        let presence = FingerPresence::new();
        presence.publish(1, 200.0, true);
        presence.publish(2, 40.0, false);

        assert!(!presence.finger_detected());
        assert_eq!(presence.last_mean(), Some(40.0));
        assert_eq!(presence.frames_processed(), 2);
    }

    #[test]
    fn test_subscriber_receives_samples() {
        let presence = FingerPresence::new();
        let rx = presence.subscribe();

        presence.publish(7, 180.0, true);

        let sample = rx.try_recv().unwrap();
        assert_eq!(sample.sequence, 7);
        assert_eq!(sample.red_mean, 180.0);
        assert!(sample.finger_detected);
    }

    #[test]
    fn test_slow_subscriber_drops_newest() {
        let presence = FingerPresence::new();
        let rx = presence.subscribe();

        for seq in 0..(SUBSCRIBER_CAPACITY as u64 + 10) {
            presence.publish(seq, 100.0, false);
        }

        assert_eq!(rx.len(), SUBSCRIBER_CAPACITY);
        assert_eq!(rx.try_recv().unwrap().sequence, 0);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let presence = FingerPresence::new();
        drop(presence.subscribe());
        presence.publish(1, 100.0, false);
        assert!(presence.lock_subscribers().is_empty());
    }
}
