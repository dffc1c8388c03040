//! # Row Encoding
//!
//! Turns a monochrome raster into the per-row print commands streamed during
//! a print job.
//!
//! ## Row Commands
//!
//! Each raster row becomes exactly one command, in ascending row order:
//!
//! | Row content | Command | Payload |
//! |-------------|---------|---------|
//! | no ink at all | PRINT_EMPTY_ROW (0x84) | row(2) repeat(1) |
//! | any ink | PRINT_BITMAP_ROW (0x85) | row(2) 00 00 00 repeat(1) bits |
//!
//! The repeat count is always 1; consecutive blank rows are not coalesced.
//! The printer rebuilds the label by row index and expects them to arrive
//! strictly increasing with no gaps.
//!
//! ## Example
//!
//! ```
//! use niimbot::render::{MonoImage, RowCommand, RowEncoder};
//!
//! let image = MonoImage::from_fn(8, 2, |x, y| y == 1 && x % 2 == 0);
//! let encoder = RowEncoder::new(&image).unwrap();
//! let rows: Vec<RowCommand> = encoder.rows().collect();
//!
//! assert_eq!(rows[0], RowCommand::Empty { row: 0, repeat: 1 });
//! assert_eq!(rows[1], RowCommand::Bitmap { row: 1, repeat: 1, bits: vec![0xAA] });
//! ```

use image::DynamicImage;

use super::dither::{self, DitheringAlgorithm};
use crate::error::{NiimbotError, Result};
use crate::protocol::commands::{self, RequestCode};
use crate::protocol::packet::{MAX_PAYLOAD, Packet};

/// Bytes in a bitmap row payload before the packed bits
const BITMAP_ROW_HEADER: usize = 6;

/// Widest row whose bitmap payload still fits in one frame
pub const MAX_ROW_WIDTH: usize = (MAX_PAYLOAD - BITMAP_ROW_HEADER) * 8;

/// Largest height the 16-bit SET_DIMENSION field can describe
pub const MAX_ROWS: usize = u16::MAX as usize;

/// Pixel access contract for anything that can be printed.
///
/// `is_ink` answers the foreground/background question: `true` means the
/// printer should burn a dot at `(x, y)`.
pub trait Raster {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn is_ink(&self, x: usize, y: usize) -> bool;
}

impl<R: Raster + ?Sized> Raster for &R {
    fn width(&self) -> usize {
        (**self).width()
    }

    fn height(&self) -> usize {
        (**self).height()
    }

    fn is_ink(&self, x: usize, y: usize) -> bool {
        (**self).is_ink(x, y)
    }
}

// ============================================================================
// MONO IMAGE
// ============================================================================

/// An owned 1-bit raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonoImage {
    width: usize,
    height: usize,
    pixels: Vec<bool>,
}

impl MonoImage {
    /// Blank (all background) image
    pub fn blank(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![false; width * height],
        }
    }

    /// Build from a per-pixel function, `true` = ink.
    pub fn from_fn<F>(width: usize, height: usize, f: F) -> Self
    where
        F: Fn(usize, usize) -> bool,
    {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Convert a decoded image: grayscale, invert (dark = ink), dither.
    ///
    /// Transparent pixels are treated as white.
    pub fn from_image(image: &DynamicImage, algorithm: DitheringAlgorithm) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = (rgba.width() as usize, rgba.height() as usize);

        let intensity: Vec<f32> = rgba
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                // ITU-R 601-2 luma, composited over white
                let luma = (r as f32 * 299.0 + g as f32 * 587.0 + b as f32 * 114.0) / 1000.0;
                let alpha = a as f32 / 255.0;
                let over_white = luma * alpha + 255.0 * (1.0 - alpha);
                1.0 - over_white / 255.0
            })
            .collect();

        Self {
            width,
            height,
            pixels: dither::dither(&intensity, width, height, algorithm),
        }
    }

    /// Set a single pixel
    pub fn set(&mut self, x: usize, y: usize, ink: bool) {
        self.pixels[y * self.width + x] = ink;
    }
}

impl Raster for MonoImage {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn is_ink(&self, x: usize, y: usize) -> bool {
        self.pixels[y * self.width + x]
    }
}

// ============================================================================
// ROW COMMANDS
// ============================================================================

/// One horizontal line of the print raster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowCommand {
    /// Row with no ink
    Empty { row: u16, repeat: u8 },
    /// Row with at least one dot, MSB-first packed
    Bitmap { row: u16, repeat: u8, bits: Vec<u8> },
}

impl RowCommand {
    /// Row index
    pub fn row(&self) -> u16 {
        match self {
            Self::Empty { row, .. } | Self::Bitmap { row, .. } => *row,
        }
    }

    /// Request code used on the wire
    pub fn request(&self) -> RequestCode {
        match self {
            Self::Empty { .. } => RequestCode::PrintEmptyRow,
            Self::Bitmap { .. } => RequestCode::PrintBitmapRow,
        }
    }

    /// Frame this row command.
    pub fn to_packet(&self) -> Result<Packet> {
        let payload = match self {
            Self::Empty { row, repeat } => commands::empty_row(*row, *repeat),
            Self::Bitmap { row, repeat, bits } => commands::bitmap_row(*row, *repeat, bits),
        };
        Packet::new(self.request().code(), payload)
    }
}

/// Encodes a raster into row commands.
///
/// Dimensions are validated once up front; [`RowEncoder::rows`] can then be
/// called any number of times and always yields the same sequence.
pub struct RowEncoder<R> {
    raster: R,
}

impl<R: Raster> RowEncoder<R> {
    /// Wrap a raster, checking it fits the row command format.
    pub fn new(raster: R) -> Result<Self> {
        let (width, height) = (raster.width(), raster.height());
        if width == 0 || height == 0 {
            return Err(NiimbotError::InvalidArgument(format!(
                "Image must not be empty ({}x{})",
                width, height
            )));
        }
        if width > MAX_ROW_WIDTH {
            return Err(NiimbotError::InvalidArgument(format!(
                "Image width {} exceeds the {} pixel row limit",
                width, MAX_ROW_WIDTH
            )));
        }
        if height > MAX_ROWS {
            return Err(NiimbotError::InvalidArgument(format!(
                "Image height {} exceeds the {} row limit",
                height, MAX_ROWS
            )));
        }
        Ok(Self { raster })
    }

    pub fn width(&self) -> usize {
        self.raster.width()
    }

    pub fn height(&self) -> usize {
        self.raster.height()
    }

    /// Lazily encode every row, top to bottom.
    pub fn rows(&self) -> Rows<'_, R> {
        Rows {
            raster: &self.raster,
            next: 0,
        }
    }

    /// Encode a single row.
    pub fn encode_row(&self, y: usize) -> RowCommand {
        encode_row(&self.raster, y)
    }
}

impl<'a, R: Raster> IntoIterator for &'a RowEncoder<R> {
    type Item = RowCommand;
    type IntoIter = Rows<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows()
    }
}

/// Iterator over the row commands of a raster
pub struct Rows<'a, R> {
    raster: &'a R,
    next: usize,
}

impl<R: Raster> Iterator for Rows<'_, R> {
    type Item = RowCommand;

    fn next(&mut self) -> Option<RowCommand> {
        if self.next >= self.raster.height() {
            return None;
        }
        let cmd = encode_row(self.raster, self.next);
        self.next += 1;
        Some(cmd)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.raster.height().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl<R: Raster> ExactSizeIterator for Rows<'_, R> {}

fn encode_row<R: Raster + ?Sized>(raster: &R, y: usize) -> RowCommand {
    let line: Vec<bool> = (0..raster.width()).map(|x| raster.is_ink(x, y)).collect();
    // Height is bounded by MAX_ROWS in RowEncoder::new
    let row = y as u16;

    if line.iter().any(|&ink| ink) {
        RowCommand::Bitmap {
            row,
            repeat: 1,
            bits: dither::pack_row(&line),
        }
    } else {
        RowCommand::Empty { row, repeat: 1 }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_blank_row_width_96() {
        let image = MonoImage::blank(96, 3);
        let encoder = RowEncoder::new(&image).unwrap();
        let cmd = encoder.encode_row(2);
        assert_eq!(cmd, RowCommand::Empty { row: 2, repeat: 1 });

        let pkt = cmd.to_packet().unwrap();
        assert_eq!(pkt.command(), 0x84);
        assert_eq!(pkt.payload(), &[0x00, 0x02, 0x01]);
    }

    #[test]
    fn test_alternating_row_packs_to_aa() {
        let image = MonoImage::from_fn(8, 1, |x, _| x % 2 == 0);
        let encoder = RowEncoder::new(&image).unwrap();
        let cmd = encoder.encode_row(0);
        assert_eq!(
            cmd,
            RowCommand::Bitmap {
                row: 0,
                repeat: 1,
                bits: vec![0xAA]
            }
        );

        let pkt = cmd.to_packet().unwrap();
        assert_eq!(pkt.command(), 0x85);
        assert_eq!(pkt.payload(), &[0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xAA]);
    }

    #[test]
    fn test_bits_right_padded() {
        let image = MonoImage::from_fn(10, 1, |_, _| true);
        let encoder = RowEncoder::new(&image).unwrap();
        match encoder.encode_row(0) {
            RowCommand::Bitmap { bits, .. } => assert_eq!(bits, vec![0xFF, 0xC0]),
            other => panic!("expected bitmap row, got {:?}", other),
        }
    }

    #[test]
    fn test_rows_are_restartable_and_ordered() {
        let image = MonoImage::from_fn(16, 37, |x, y| (x + y) % 5 == 0 && y % 3 != 0);
        let encoder = RowEncoder::new(&image).unwrap();

        let first: Vec<RowCommand> = encoder.rows().collect();
        let second: Vec<RowCommand> = (&encoder).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 37);
        for (i, cmd) in first.iter().enumerate() {
            assert_eq!(cmd.row() as usize, i);
        }
    }

    #[test]
    fn test_rows_size_hint() {
        let image = MonoImage::blank(8, 5);
        let encoder = RowEncoder::new(&image).unwrap();
        let mut rows = encoder.rows();
        assert_eq!(rows.len(), 5);
        rows.next();
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn test_dimension_limits() {
        assert!(RowEncoder::new(MonoImage::blank(0, 4)).is_err());
        assert!(RowEncoder::new(MonoImage::blank(8, 0)).is_err());
        assert!(RowEncoder::new(MonoImage::blank(MAX_ROW_WIDTH + 1, 1)).is_err());
        assert!(RowEncoder::new(MonoImage::blank(MAX_ROW_WIDTH, 1)).is_ok());
    }

    #[test]
    fn test_widest_row_fits_one_frame() {
        let image = MonoImage::from_fn(MAX_ROW_WIDTH, 1, |_, _| true);
        let encoder = RowEncoder::new(&image).unwrap();
        let pkt = encoder.encode_row(0).to_packet().unwrap();
        assert_eq!(pkt.payload().len(), MAX_PAYLOAD);
    }

    #[test]
    fn test_from_image_inverts_polarity() {
        let mut gray = GrayImage::from_pixel(8, 2, Luma([255]));
        for x in 0..8 {
            gray.put_pixel(x, 1, Luma([0]));
        }
        let image = MonoImage::from_image(
            &DynamicImage::ImageLuma8(gray),
            DitheringAlgorithm::Threshold,
        );

        assert!((0..8).all(|x| !image.is_ink(x, 0)));
        assert!((0..8).all(|x| image.is_ink(x, 1)));
    }

    #[test]
    fn test_from_image_transparent_is_blank() {
        let rgba = image::RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 0]));
        let image = MonoImage::from_image(
            &DynamicImage::ImageRgba8(rgba),
            DitheringAlgorithm::FloydSteinberg,
        );
        let encoder = RowEncoder::new(&image).unwrap();
        assert!(
            encoder
                .rows()
                .all(|cmd| matches!(cmd, RowCommand::Empty { .. }))
        );
    }
}
