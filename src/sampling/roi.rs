//! Region-of-interest subsampling of the red-equivalent channel.

use crate::capture::{Frame, BYTES_PER_PIXEL, RED_CHANNEL};

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    /// First column.
    pub x0: u32,
    /// One past the last column.
    pub x1: u32,
    /// First row.
    pub y0: u32,
    /// One past the last row.
    pub y1: u32,
}

impl Roi {
    /// The central third of the frame along both axes.
    pub fn central_third(width: u32, height: u32) -> Self {
        Self {
            x0: width / 3,
            x1: two_thirds(width),
            y0: height / 3,
            y1: two_thirds(height),
        }
    }

    /// Returns true if the rectangle covers no pixel.
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }
}

fn two_thirds(n: u32) -> u32 {
    // Widened so 2 * n cannot overflow
    (2 * u64::from(n) / 3) as u32
}

/// Running sum of sampled red bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedChannelStats {
    /// Sum of sampled bytes.
    pub sum: u64,
    /// Number of sampled pixels.
    pub count: u64,
}

impl RedChannelStats {
    /// Mean of the samples, or `None` if nothing was sampled.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum as f64 / self.count as f64)
    }
}

/// Sums the red channel over every `stride`-th row and column of `roi`.
///
/// Returns `None` if any visited byte lies outside the buffer; the
/// caller must then discard the frame rather than use a partial sum.
pub fn accumulate_red(frame: &Frame, roi: Roi, stride: usize) -> Option<RedChannelStats> {
    let stride = stride.max(1);
    let mut stats = RedChannelStats::default();

    for y in (roi.y0..roi.y1.min(frame.height())).step_by(stride) {
        let row = frame.row(y)?;
        for x in (roi.x0..roi.x1.min(frame.width())).step_by(stride) {
            let red = *row.get(x as usize * BYTES_PER_PIXEL + RED_CHANNEL)?;
            stats.sum += u64::from(red);
            stats.count += 1;
        }
    }

    Some(stats)
}

/// Red-channel mean over the central third, or `None` for a degenerate
/// region or a malformed buffer.
pub fn sample_red_mean(frame: &Frame, stride: usize) -> Option<f64> {
    if !frame.is_valid() {
        return None;
    }
    let roi = Roi::central_third(frame.width(), frame.height());
    if roi.is_empty() {
        return None;
    }
    accumulate_red(frame, roi, stride)?.mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mock::solid_frame;
    use proptest::prelude::*;

    /// Frame with padded rows; every red byte inside the frame is `red`,
    /// every padding byte is 0xFF so stray reads would skew the mean.
    fn padded_frame(width: u32, height: u32, padding: usize, red: u8) -> Frame {
        let row_stride = width as usize * BYTES_PER_PIXEL + padding;
        let mut pixels = vec![0xFFu8; row_stride * height as usize];
        for y in 0..height as usize {
            for x in 0..width as usize {
                let base = y * row_stride + x * BYTES_PER_PIXEL;
                pixels[base..base + BYTES_PER_PIXEL].copy_from_slice(&[0, 0, red, 0]);
            }
        }
        Frame::new(pixels, width, height, row_stride, 1)
    }

    #[test]
    fn test_central_third_bounds() {
        let roi = Roi::central_third(640, 480);
        assert_eq!(
            roi,
            Roi {
                x0: 213,
                x1: 426,
                y0: 160,
                y1: 320,
            }
        );
    }

    #[test]
    fn test_central_third_matches_integer_division() {
        for n in 0..50u32 {
            let roi = Roi::central_third(n, n);
            assert_eq!(roi.x0, n / 3);
            assert_eq!(roi.x1, 2 * n / 3);
        }
    }

    #[test]
    fn test_tiny_frames_have_empty_roi() {
        assert!(Roi::central_third(1, 1).is_empty());
        assert!(Roi::central_third(0, 480).is_empty());
        assert!(Roi::central_third(640, 1).is_empty());
        assert_eq!(
            Roi::central_third(2, 2),
            Roi {
                x0: 0,
                x1: 1,
                y0: 0,
                y1: 1,
            }
        );
    }

    #[test]
    fn test_sample_count_uses_stride() {
        let frame = solid_frame(640, 480, 100, 1);
        let roi = Roi::central_third(640, 480);
        let stats = accumulate_red(&frame, roi, 8).unwrap();

        // x: 213..426 step 8 -> 27 columns, y: 160..320 step 8 -> 20 rows
        assert_eq!(stats.count, 27 * 20);
        assert_eq!(stats.mean(), Some(100.0));
    }

    #[test]
    fn test_only_red_channel_is_read() {
        let mut frame_pixels = vec![0u8; 30 * 30 * 4];
        for px in frame_pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&[255, 255, 10, 255]);
        }
        let frame = Frame::packed(frame_pixels, 30, 30, 1);
        assert_eq!(sample_red_mean(&frame, 8), Some(10.0));
    }

    #[test]
    fn test_padding_is_never_sampled() {
        let frame = padded_frame(64, 48, 36, 20);
        assert_eq!(sample_red_mean(&frame, 8), Some(20.0));
    }

    #[test]
    fn test_degenerate_roi_returns_none() {
        let frame = solid_frame(1, 1, 200, 1);
        assert_eq!(sample_red_mean(&frame, 8), None);
    }

    #[test]
    fn test_truncated_buffer_returns_none() {
        let mut pixels = solid_frame(64, 64, 200, 1).pixels().to_vec();
        pixels.truncate(pixels.len() / 2);
        let frame = Frame::packed(pixels, 64, 64, 1);
        assert_eq!(sample_red_mean(&frame, 8), None);
    }

    #[test]
    fn test_mean_is_real_valued() {
        // ROI columns 16..32 sampled at x = 16 and x = 24, row y = 1
        let width = 48u32;
        let height = 3u32;
        let mut pixels = vec![0u8; (width * height * 4) as usize];
        let row = width as usize * 4;
        pixels[row + 16 * 4 + RED_CHANNEL] = 121;
        pixels[row + 24 * 4 + RED_CHANNEL] = 120;
        let frame = Frame::packed(pixels, width, height, 1);

        assert_eq!(sample_red_mean(&frame, 8), Some(120.5));
    }

    proptest! {
        #[test]
        fn prop_sampling_stays_in_bounds(
            width in 0u32..200,
            height in 0u32..200,
            padding in 0usize..16,
            stride in 1usize..20,
            red in any::<u8>(),
        ) {
            let frame = padded_frame(width, height, padding, red);
            // Trim trailing padding so the last row ends at the buffer end
            let mut pixels = frame.pixels().to_vec();
            pixels.truncate(pixels.len().saturating_sub(padding));
            let frame = Frame::new(pixels, width, height, frame.row_stride(), 1);

            match sample_red_mean(&frame, stride) {
                Some(mean) => prop_assert_eq!(mean, f64::from(red)),
                None => prop_assert!(Roi::central_third(width, height).is_empty()),
            }
        }
    }
}
