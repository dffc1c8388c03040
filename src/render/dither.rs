//! # Monochrome Conversion
//!
//! Converts grayscale images to the 1-bit rasters the print head needs.
//!
//! ## Polarity
//!
//! Source images are dark-on-light. The printer burns a dot wherever the
//! source is dark, so luma is inverted into an *ink intensity*:
//!
//! ```text
//! intensity = 1.0 - luma / 255
//!
//! white (255) → 0.0 → no dot
//! black (0)   → 1.0 → dot
//! ```
//!
//! ## Algorithms
//!
//! | Method | Speed | Quality | Artifacts |
//! |--------|-------|---------|-----------|
//! | Threshold | Fastest | Poor on photos | Banding |
//! | Floyd-Steinberg | Slow | Best | Noise, worms |
//! | Bayer | Fast | Good | Regular pattern |
//!
//! Floyd-Steinberg is the default; it matches what most imaging tools do
//! for a plain 1-bit conversion.
//!
//! ## Usage Example
//!
//! ```
//! use niimbot::render::dither::pack_row;
//!
//! let row: Vec<bool> = vec![true, true, false, false, true, false, true, false];
//! assert_eq!(pack_row(&row), vec![0b11001010]); // 0xCA
//! ```

/// Bayer 8x8 dithering matrix
///
/// Values range from 0-63. Low values activate first at low intensities.
pub const BAYER8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// Dithering algorithm used for grayscale → 1-bit conversion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DitheringAlgorithm {
    /// Fixed 50% threshold
    Threshold,
    /// Error diffusion (7/16, 3/16, 5/16, 1/16)
    #[default]
    FloydSteinberg,
    /// Ordered 8x8 Bayer matrix
    Bayer,
}

impl DitheringAlgorithm {
    /// Parse a CLI name.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "none" | "threshold" => Ok(Self::Threshold),
            "floyd-steinberg" | "floyd_steinberg" | "fs" => Ok(Self::FloydSteinberg),
            "bayer" | "ordered" => Ok(Self::Bayer),
            other => Err(format!(
                "Unknown dithering '{}'. Use 'threshold', 'floyd-steinberg' or 'bayer'",
                other
            )),
        }
    }
}

/// Bayer threshold for a pixel position, in (0, 1).
///
/// `(matrix_value + 0.5) / 64` so that full ink always prints and no ink
/// never does.
#[inline]
pub fn bayer_threshold(x: usize, y: usize) -> f32 {
    let matrix_value = BAYER8[y & 7][x & 7];
    (matrix_value as f32 + 0.5) / 64.0
}

/// Convert an ink-intensity buffer (row-major, 0.0 = no ink, 1.0 = full ink)
/// to one bool per pixel, `true` = dot.
pub fn dither(
    intensity: &[f32],
    width: usize,
    height: usize,
    algorithm: DitheringAlgorithm,
) -> Vec<bool> {
    debug_assert_eq!(intensity.len(), width * height);

    match algorithm {
        DitheringAlgorithm::Threshold => intensity.iter().map(|&v| v >= 0.5).collect(),
        DitheringAlgorithm::Bayer => intensity
            .iter()
            .enumerate()
            .map(|(i, &v)| v > bayer_threshold(i % width, i / width))
            .collect(),
        DitheringAlgorithm::FloydSteinberg => floyd_steinberg(intensity, width, height),
    }
}

fn floyd_steinberg(intensity: &[f32], width: usize, height: usize) -> Vec<bool> {
    let mut buf = intensity.to_vec();
    let mut out = vec![false; buf.len()];

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let old = buf[idx];
            let on = old >= 0.5;
            out[idx] = on;
            let err = old - if on { 1.0 } else { 0.0 };

            if x + 1 < width {
                buf[idx + 1] += err * 7.0 / 16.0;
            }
            if y + 1 < height {
                if x > 0 {
                    buf[idx + width - 1] += err * 3.0 / 16.0;
                }
                buf[idx + width] += err * 5.0 / 16.0;
                if x + 1 < width {
                    buf[idx + width + 1] += err * 1.0 / 16.0;
                }
            }
        }
    }

    out
}

/// Pack a row of boolean pixel values into bytes.
///
/// - Bit 7 (MSB) = leftmost pixel
/// - 1 = ink, 0 = blank
/// - The last byte is right-padded with zeros
///
/// ```
/// use niimbot::render::dither::pack_row;
///
/// let row = vec![true; 12];
/// assert_eq!(pack_row(&row), vec![0xFF, 0xF0]);
/// ```
pub fn pack_row(pixels: &[bool]) -> Vec<u8> {
    let num_bytes = pixels.len().div_ceil(8);
    let mut bytes = vec![0u8; num_bytes];

    for (i, &pixel) in pixels.iter().enumerate() {
        if pixel {
            let byte_idx = i / 8;
            let bit_idx = 7 - (i % 8); // MSB first
            bytes[byte_idx] |= 1 << bit_idx;
        }
    }

    bytes
}

// ============================================================================
// TESTS
// ============================================================================
