//! Per-frame image effects
//!
//! Every effect is a transform of the pixel grid. They run in this order:
//! mirror, gamma, knob effects, rotation, ring light.
//!
//! The knob effects work together: knob 1 scatters a random noise mask over
//! the frame, and knob 2 picks the color painted onto the lit noise pixels.
//! Cleared noise pixels go black and the rest keep the camera image.

use std::time::Duration;

use ledcam_knob_lib::NormalizedReading;
use ledcam_matrix_lib::{PixelGrid, RGB8};
use rand::Rng;
use smart_leds::gamma;

use crate::config::EffectsConfig;

/// Knob 1 at or above this lights every pixel
const ALL_LIT_THRESHOLD: f32 = 0.83;

/// Knob 2 below this paints lit pixels white
const HUE_THRESHOLD: f32 = 0.1;

/// Knob 2 above this cycles through the rainbow
const RAINBOW_THRESHOLD: f32 = 0.9;

/// Seconds for one full rainbow cycle
const RAINBOW_CYCLE_SECS: f32 = 10.0;

const WHITE: RGB8 = RGB8::new(255, 255, 255);

/// What the noise mask does to one pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Noise {
    /// Forced to black
    Cleared,
    /// Keeps its camera color
    Untouched,
    /// Painted with the knob 2 color
    Lit,
}

/// Apply all enabled effects in place.
///
/// `elapsed` is the time since streaming started and drives the rainbow cycle.
pub fn apply(
    grid: &mut PixelGrid,
    config: &EffectsConfig,
    knobs: Option<NormalizedReading>,
    elapsed: Duration,
    rng: &mut impl Rng,
) {
    if config.mirror {
        mirror(grid);
    }
    if config.gamma {
        correct_gamma(grid);
    }
    if config.knob_effects {
        if let Some(knobs) = knobs {
            let mask = noise_effect(grid.width(), grid.height(), knobs.a, rng);
            hue_effect(grid, &mask, knobs.b, elapsed);
        }
    }
    rotate(grid, config.orientation);
    if config.ring_light {
        ring_light(grid, config.ring_width, config.ring_brightness);
    }
}

/// Flip left to right
pub fn mirror(grid: &mut PixelGrid) {
    let width = grid.width();
    if width == 0 {
        return;
    }
    for row in grid.pixels_mut().chunks_mut(width) {
        row.reverse();
    }
}

pub fn correct_gamma(grid: &mut PixelGrid) {
    let corrected: Vec<RGB8> = gamma(grid.pixels().iter().copied()).collect();
    grid.pixels_mut().copy_from_slice(&corrected);
}

/// Random row-major mask: each pixel is cleared with probability `prob`, lit
/// with probability `prob`, and untouched otherwise
pub fn noise_mask(width: usize, height: usize, prob: f32, rng: &mut impl Rng) -> Vec<Noise> {
    let threshold = 1.0 - prob;
    (0..width * height)
        .map(|_| {
            let roll: f32 = rng.gen();
            if roll < prob {
                Noise::Cleared
            } else if roll > threshold {
                Noise::Lit
            } else {
                Noise::Untouched
            }
        })
        .collect()
}

/// Noise mask for a knob 1 `value` in `[0.0, 1.0]`
pub fn noise_effect(width: usize, height: usize, value: f32, rng: &mut impl Rng) -> Vec<Noise> {
    if value < ALL_LIT_THRESHOLD {
        noise_mask(width, height, value / 3.0, rng)
    } else {
        vec![Noise::Lit; width * height]
    }
}

/// Color painted onto lit noise pixels for a knob 2 `value`
pub fn highlight_color(value: f32, elapsed: Duration) -> RGB8 {
    if value < HUE_THRESHOLD {
        WHITE
    } else if value < RAINBOW_THRESHOLD {
        hue_to_rgb((value - HUE_THRESHOLD) / (RAINBOW_THRESHOLD - HUE_THRESHOLD))
    } else {
        hue_to_rgb((elapsed.as_secs_f32() / RAINBOW_CYCLE_SECS).fract())
    }
}

/// Blacken cleared pixels and paint lit ones with the knob 2 color
pub fn hue_effect(grid: &mut PixelGrid, mask: &[Noise], value: f32, elapsed: Duration) {
    let high = highlight_color(value, elapsed);
    for (pixel, noise) in grid.pixels_mut().iter_mut().zip(mask) {
        match noise {
            Noise::Cleared => *pixel = RGB8::default(),
            Noise::Lit => *pixel = high,
            Noise::Untouched => {}
        }
    }
}

/// Fully saturated color for `hue` in `[0.0, 1.0)`
pub fn hue_to_rgb(hue: f32) -> RGB8 {
    let h = hue.rem_euclid(1.0) * 6.0;
    // h is in [0, 6), so the sector index fits in u8
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let sector = h.floor() as u8;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rising = ((h - h.floor()) * 255.0).round() as u8;
    let falling = 255 - rising;

    match sector {
        0 => RGB8::new(255, rising, 0),
        1 => RGB8::new(falling, 255, 0),
        2 => RGB8::new(0, 255, rising),
        3 => RGB8::new(0, falling, 255),
        4 => RGB8::new(rising, 0, 255),
        _ => RGB8::new(255, 0, falling),
    }
}

/// Rotate a square grid counter-clockwise by `quarter_turns` × 90°
pub fn rotate(grid: &mut PixelGrid, quarter_turns: u8) {
    let side = grid.width();
    if side != grid.height() {
        return;
    }
    for _ in 0..quarter_turns % 4 {
        let src = grid.clone();
        for y in 0..side {
            for x in 0..side {
                if let Some(color) = src.get(side - 1 - y, x) {
                    grid.set(x, y, color);
                }
            }
        }
    }
}

/// Paint a solid gray border `width` pixels thick
pub fn ring_light(grid: &mut PixelGrid, width: usize, level: u8) {
    let color = RGB8::new(level, level, level);
    let (w, h) = (grid.width(), grid.height());
    for y in 0..h {
        for x in 0..w {
            if x < width || y < width || x + width >= w || y + width >= h {
                grid.set(x, y, color);
            }
        }
    }
}
