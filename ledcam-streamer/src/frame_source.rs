//! Producers of square RGB frames

use anyhow::Result;
use ledcam_matrix_lib::{PixelGrid, RGB8};

/// Anything that can hand the frame loop a new image
pub trait FrameSource {
    /// Produce the next frame. Every frame from one source has the same size.
    fn next_frame(&mut self) -> Result<PixelGrid>;
}

/// Synthetic scrolling diagonal gradient, for running without a camera
pub struct TestPattern {
    side: usize,
    tick: usize,
}

impl TestPattern {
    pub fn new(side: usize) -> Self {
        Self { side, tick: 0 }
    }

    pub fn side(&self) -> usize {
        self.side
    }
}

impl FrameSource for TestPattern {
    fn next_frame(&mut self) -> Result<PixelGrid> {
        let side = self.side.max(1);
        let tick = self.tick;
        self.tick = self.tick.wrapping_add(1);

        Ok(PixelGrid::from_fn(self.side, self.side, |x, y| {
            let diagonal = (x + y + tick) % (2 * side);
            // Both scaled values are below 256
            #[allow(clippy::cast_possible_truncation)]
            let level = (diagonal * 255 / (2 * side - 1)) as u8;
            #[allow(clippy::cast_possible_truncation)]
            let blue = (y * 255 / side) as u8;
            RGB8::new(level, 255 - level, blue)
        }))
    }
}
