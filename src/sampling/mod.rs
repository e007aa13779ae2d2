//! Per-frame signal extraction and finger detection.
//!
//! Each frame is reduced to one number, the mean red-equivalent byte over
//! a subsampled central region, and that number is compared against a
//! fixed threshold. Work per frame is bounded by the subsampling grid,
//! not by the frame resolution.

mod presence;
mod roi;

pub use presence::{FingerPresence, IntensitySample, SUBSCRIBER_CAPACITY};
pub use roi::{accumulate_red, sample_red_mean, RedChannelStats, Roi};

use crate::capture::{Frame, SamplerConfig};
use std::sync::Arc;

/// Turns frames into finger-presence updates.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    config: SamplerConfig,
    presence: Arc<FingerPresence>,
}

impl FrameSampler {
    /// Creates a sampler publishing into `presence`.
    pub fn new(config: SamplerConfig, presence: Arc<FingerPresence>) -> Self {
        Self { config, presence }
    }

    /// Processes one delivered frame.
    ///
    /// Returns the red mean that was published, or `None` if the frame
    /// had nothing to sample (the flag is left as it was).
    pub fn on_frame(&self, frame: &Frame) -> Option<f64> {
        let Some(mean) = sample_red_mean(frame, self.config.stride) else {
            self.presence.record_skip();
            tracing::trace!(?frame, "Frame skipped");
            return None;
        };

        let detected = self.config.classify(mean);
        self.presence.publish(frame.sequence(), mean, detected);
        tracing::trace!(sequence = frame.sequence(), mean, detected, "Frame sampled");
        Some(mean)
    }

    /// Returns the published state.
    pub fn presence(&self) -> &Arc<FingerPresence> {
        &self.presence
    }
}
