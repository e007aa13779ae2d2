//! Frame type representing one delivered pixel buffer.

/// Bytes per pixel in the delivered layout (B, G, R, A).
pub const BYTES_PER_PIXEL: usize = 4;

/// Byte offset of the red-equivalent channel within a pixel.
pub const RED_CHANNEL: usize = 2;

/// A single frame handed over by the capture subsystem.
///
/// Pixels are row-major, four bytes per pixel, with an explicit row
/// stride in bytes. The stride may exceed `width * 4` (row padding), so
/// every reader must go through [`Frame::row`] or the stride accessor
/// rather than assuming a packed buffer.
#[derive(Clone)]
pub struct Frame {
    /// Raw pixel bytes.
    pixels: Vec<u8>,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    /// Bytes per row, including padding.
    row_stride: usize,
    /// Monotonic sequence number assigned by the capture subsystem.
    sequence: u64,
}

impl Frame {
    /// Creates a new frame with an explicit row stride.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, row_stride: usize, sequence: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            row_stride,
            sequence,
        }
    }

    /// Creates a frame whose rows are tightly packed (`stride = width * 4`).
    pub fn packed(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        let row_stride = width as usize * BYTES_PER_PIXEL;
        Self::new(pixels, width, height, row_stride, sequence)
    }

    /// Returns a reference to the raw pixel data.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the number of bytes between the starts of consecutive rows.
    #[inline]
    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Number of meaningful bytes in one row (`width * 4`).
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Validates that the stride covers a row and the buffer covers every row.
    pub fn is_valid(&self) -> bool {
        if self.row_stride < self.row_bytes() {
            return false;
        }
        match self.height as usize {
            0 => true,
            h => (h - 1)
                .checked_mul(self.row_stride)
                .and_then(|last_row| last_row.checked_add(self.row_bytes()))
                .is_some_and(|needed| self.pixels.len() >= needed),
        }
    }

    /// Returns the meaningful bytes of row `y`, without padding.
    ///
    /// Returns `None` when `y` is outside the frame or the buffer is too
    /// short to hold the row.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = (y as usize).checked_mul(self.row_stride)?;
        let end = start.checked_add(self.row_bytes())?;
        self.pixels.get(start..end)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("row_stride", &self.row_stride)
            .field("sequence", &self.sequence)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}
