//! # Printer Module
//!
//! Device profiles, the protocol client and the print job orchestrator.
//!
//! ## Modules
//!
//! - [`config`]: Printer hardware specifications
//! - [`client`]: Request/response engine with retries
//! - [`job`]: Label print lifecycle

pub mod client;
pub mod config;
pub mod job;

pub use client::{PrinterClient, TransceiveOptions};
pub use config::{PrinterConfig, PrinterModel};
pub use job::{PrintOptions, print_image};
