//! # niimbot - Thermal Label Printer Library
//!
//! niimbot is a Rust library for printing on NIIMBOT thermal label printers
//! over USB, Bluetooth and BLE. It provides:
//!
//! - **Protocol implementation**: frame codec, command codes, response decoding
//! - **Transports**: USB serial, RFCOMM socket, RFCOMM TTY and BLE backends
//! - **Client**: request/response correlation with bounded retries
//! - **Rendering**: dithering and image-to-row command encoding
//! - **Print jobs**: the full label lifecycle with batched row streaming
//!
//! ## Quick Start
//!
//! ```no_run
//! use niimbot::{
//!     printer::{PrintOptions, PrinterClient, PrinterModel, print_image},
//!     render::{DitheringAlgorithm, MonoImage},
//!     transport::{self, ConnectionKind},
//! };
//!
//! // Open a connection to the printer
//! let transport = transport::open(ConnectionKind::Ble, Some("26:03:03:C3:F9:11"))?;
//! let mut client = PrinterClient::new(transport);
//!
//! // Load and dither an image
//! let image = image::open("label.png").map_err(|e| niimbot::NiimbotError::Image(e.to_string()))?;
//! let label = MonoImage::from_image(&image, DitheringAlgorithm::FloydSteinberg);
//!
//! // Print it
//! let config = PrinterModel::D110.config();
//! print_image(&mut client, &label, &config, &PrintOptions::default())?;
//! client.close()?;
//!
//! # Ok::<(), niimbot::NiimbotError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | Frame codec and command builders |
//! | [`transport`] | Communication backends |
//! | [`printer`] | Models, client and print jobs |
//! | [`render`] | Dithering and row encoding |
//! | [`error`] | Error types |
//!
//! ## Supported Printers
//!
//! B1, B18, B21 (384 dots) and D11, D110 (96 dots).

pub mod error;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod transport;

// Re-exports for convenience
pub use error::NiimbotError;
pub use printer::{PrinterClient, PrinterConfig};
pub use transport::Transport;
