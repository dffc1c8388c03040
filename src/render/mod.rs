//! # Rendering Module
//!
//! Turns images into the row commands a label printer consumes.
//!
//! ## Modules
//!
//! - [`dither`]: Grayscale → 1-bit conversion and bit packing
//! - [`rows`]: Raster access contract and row command encoding
//!
//! ## Usage Example
//!
//! ```
//! use niimbot::render::{MonoImage, RowEncoder};
//!
//! // 96 dots wide (D11 print head), 4 rows, one diagonal dot per row
//! let image = MonoImage::from_fn(96, 4, |x, y| x == y);
//! let encoder = RowEncoder::new(&image).unwrap();
//!
//! for cmd in encoder.rows() {
//!     let packet = cmd.to_packet().unwrap();
//!     assert_eq!(packet.command(), 0x85);
//! }
//! ```

pub mod dither;
pub mod rows;

pub use dither::DitheringAlgorithm;
pub use rows::{MonoImage, Raster, RowCommand, RowEncoder};
