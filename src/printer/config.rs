//! # Printer Configuration
//!
//! This module defines hardware specifications for supported label printers.
//!
//! ## Supported Printers
//!
//! | Model | Width (dots) | Max density | Print clear | Quantity |
//! |-------|--------------|-------------|-------------|----------|
//! | B1 | 384 | 5 | no | no |
//! | B18 | 384 | 3 | no | no |
//! | B21 | 384 | 5 | no | no |
//! | D11 | 96 | 3 | no | no |
//! | D110 | 96 | 3 | no | no |
//!
//! ALLOW_PRINT_CLEAR and SET_QUANTITY are answered with frames current
//! firmware does not decode consistently, so no built-in profile enables
//! them. A custom [`PrinterConfig`] can opt in.
//!
//! ## Usage
//!
//! ```
//! use niimbot::printer::{PrinterConfig, PrinterModel};
//!
//! let config = PrinterModel::parse("d110")?.config();
//! assert_eq!(config.max_width, 96);
//! assert_eq!(config.clamp_density(5), 3);
//! # Ok::<(), niimbot::NiimbotError>(())
//! ```

use std::fmt;

use tracing::warn;

use crate::error::{NiimbotError, Result};

/// Lowest density accepted by SET_LABEL_DENSITY
pub const MIN_DENSITY: u8 = 1;

/// # Printer Configuration
///
/// Defines the hardware characteristics of a label printer.
///
/// - **max_width**: Widest image the print head accepts, in dots
/// - **max_density**: Highest supported SET_LABEL_DENSITY value
/// - **allow_print_clear**: Send ALLOW_PRINT_CLEAR during a job
/// - **set_quantity**: Send SET_QUANTITY during a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrinterConfig {
    /// Printer model name
    pub name: &'static str,

    /// Maximum print width in dots (pixels)
    pub max_width: u16,

    /// Highest density level
    pub max_density: u8,

    /// Device handles ALLOW_PRINT_CLEAR
    pub allow_print_clear: bool,

    /// Device handles SET_QUANTITY
    pub set_quantity: bool,
}

impl PrinterConfig {
    /// 50mm head, 203 DPI
    pub const B1: Self = Self::wide("B1", 5);

    /// 50mm head, limited density range
    pub const B18: Self = Self::wide("B18", 3);

    /// 50mm head, 203 DPI
    pub const B21: Self = Self::wide("B21", 5);

    /// 12mm head
    pub const D11: Self = Self::narrow("D11");

    /// 12mm head
    pub const D110: Self = Self::narrow("D110");

    const fn wide(name: &'static str, max_density: u8) -> Self {
        Self {
            name,
            max_width: 384,
            max_density,
            allow_print_clear: false,
            set_quantity: false,
        }
    }

    const fn narrow(name: &'static str) -> Self {
        Self {
            name,
            max_width: 96,
            max_density: 3,
            allow_print_clear: false,
            set_quantity: false,
        }
    }

    /// Clamp a requested density into this model's range.
    ///
    /// Logs a warning when the value changes.
    pub fn clamp_density(&self, density: u8) -> u8 {
        let clamped = density.clamp(MIN_DENSITY, self.max_density);
        if clamped != density {
            warn!(
                "{} supports density {}..={}, using {} instead of {}",
                self.name, MIN_DENSITY, self.max_density, clamped, density
            );
        }
        clamped
    }

    /// Check an image width against the print head.
    pub fn validate_width(&self, width: usize) -> Result<()> {
        if width > self.max_width as usize {
            return Err(NiimbotError::InvalidArgument(format!(
                "Image width {}px exceeds the {} limit of {}px",
                width, self.name, self.max_width
            )));
        }
        Ok(())
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self::D11
    }
}

// ============================================================================
// PRINTER MODEL
// ============================================================================

/// Built-in printer models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrinterModel {
    B1,
    B18,
    B21,
    #[default]
    D11,
    D110,
}

impl PrinterModel {
    pub const ALL: [PrinterModel; 5] = [Self::B1, Self::B18, Self::B21, Self::D11, Self::D110];

    /// Parse a model name, ignoring case.
    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.config().name.eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|m| m.config().name).collect();
                NiimbotError::InvalidArgument(format!(
                    "Unknown model '{}'. Use one of: {}",
                    s,
                    names.join(", ")
                ))
            })
    }

    /// Hardware profile for this model
    pub const fn config(self) -> PrinterConfig {
        match self {
            Self::B1 => PrinterConfig::B1,
            Self::B18 => PrinterConfig::B18,
            Self::B21 => PrinterConfig::B21,
            Self::D11 => PrinterConfig::D11,
            Self::D110 => PrinterConfig::D110,
        }
    }
}

impl fmt::Display for PrinterModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config().name)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_table() {
        assert_eq!(PrinterConfig::B1.max_width, 384);
        assert_eq!(PrinterConfig::B18.max_width, 384);
        assert_eq!(PrinterConfig::B21.max_width, 384);
        assert_eq!(PrinterConfig::D11.max_width, 96);
        assert_eq!(PrinterConfig::D110.max_width, 96);

        assert_eq!(PrinterConfig::B1.max_density, 5);
        assert_eq!(PrinterConfig::B21.max_density, 5);
        assert_eq!(PrinterConfig::B18.max_density, 3);
        assert_eq!(PrinterConfig::D11.max_density, 3);
        assert_eq!(PrinterConfig::D110.max_density, 3);
    }

    #[test]
    fn test_optional_steps_disabled_everywhere() {
        for model in PrinterModel::ALL {
            let config = model.config();
            assert!(!config.allow_print_clear, "{}", model);
            assert!(!config.set_quantity, "{}", model);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(PrinterModel::parse("b21").unwrap(), PrinterModel::B21);
        assert_eq!(PrinterModel::parse("D110").unwrap(), PrinterModel::D110);
        assert!(PrinterModel::parse("d12").is_err());
    }

    #[test]
    fn test_clamp_density() {
        let config = PrinterConfig::D11;
        assert_eq!(config.clamp_density(0), 1);
        assert_eq!(config.clamp_density(2), 2);
        assert_eq!(config.clamp_density(5), 3);
        assert_eq!(PrinterConfig::B21.clamp_density(5), 5);
    }

    #[test]
    fn test_validate_width() {
        assert!(PrinterConfig::D11.validate_width(96).is_ok());
        assert!(PrinterConfig::D11.validate_width(97).is_err());
        assert!(PrinterConfig::B1.validate_width(384).is_ok());
    }

    #[test]
    fn test_default_is_d11() {
        assert_eq!(PrinterConfig::default(), PrinterConfig::D11);
        assert_eq!(PrinterModel::default().config(), PrinterConfig::D11);
    }
}
