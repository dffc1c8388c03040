//! # Error Types
//!
//! This module defines error types used throughout the niimbot library.
//!
//! Device-level errors carry the request code that triggered them so a
//! failed print job can be traced back to the exact protocol step.

use thiserror::Error;

/// Main error type for niimbot operations
#[derive(Debug, Error)]
pub enum NiimbotError {
    /// Packet payload does not fit the one-byte length field
    #[error("Encoding error: payload is {len} bytes (max 255)")]
    Encoding { len: usize },

    /// Frame checksum mismatch.
    ///
    /// Non-fatal: `consumed` is the full frame length so the reader can
    /// skip past it and stay aligned.
    #[error(
        "Corrupt frame for command {command:#04x}: checksum {actual:#04x}, expected {expected:#04x}"
    )]
    CorruptFrame {
        command: u8,
        expected: u8,
        actual: u8,
        consumed: usize,
    },

    /// Device answered with its error code (0xDB)
    #[error("Device rejected command {command:#04x}")]
    DeviceRejected { command: u8 },

    /// Device answered with its "unsupported" code (0x00)
    #[error("Device does not support command {command:#04x}")]
    UnsupportedCommand { command: u8 },

    /// No response to a command whose result is required
    #[error("No response to command {command:#04x}")]
    NoResponse { command: u8 },

    /// Response payload is shorter than its documented layout
    #[error("Malformed response to command {command:#04x}: {reason}")]
    MalformedResponse { command: u8, reason: String },

    /// A print job step reported failure
    #[error("Print step '{step}' failed")]
    StepFailed { step: &'static str },

    /// Transport read/write timed out with no data
    #[error("Transport timeout: {0}")]
    Timeout(String),

    /// Transport-level errors (connection, I/O)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Bluetooth peer is powered off or out of range
    #[error("Bluetooth device {address} is down or out of range (is it switched on?)")]
    HostDown { address: String },

    /// Bluetooth peer refused the RFCOMM connection
    #[error("Bluetooth device {address} refused the connection (is it paired and idle?)")]
    ConnectionRefused { address: String },

    /// Serial auto-detection found more than one port
    #[error("Too many serial ports, please select a specific one:\n{}", format_candidates(.candidates))]
    AmbiguousPort { candidates: Vec<String> },

    /// Serial auto-detection found no port at all
    #[error("No serial ports detected")]
    NoPort,

    /// Transport was closed
    #[error("Connection closed")]
    Closed,

    /// Out-of-range command parameter
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Image processing error
    #[error("Image error: {0}")]
    Image(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_candidates(candidates: &[String]) -> String {
    candidates
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, NiimbotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_command_code() {
        let err = NiimbotError::DeviceRejected { command: 0x21 };
        assert_eq!(err.to_string(), "Device rejected command 0x21");

        let err = NiimbotError::UnsupportedCommand { command: 0xf3 };
        assert!(err.to_string().contains("0xf3"));
    }

    #[test]
    fn test_ambiguous_port_lists_candidates() {
        let err = NiimbotError::AmbiguousPort {
            candidates: vec!["/dev/ttyACM0".into(), "/dev/ttyUSB0".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("- /dev/ttyACM0"));
        assert!(msg.contains("- /dev/ttyUSB0"));
    }
}
