//! # Printer Transport Layer
//!
//! This module provides the byte channels that connect the client to a
//! printer. Every backend implements [`Transport`]: a blocking
//! `read`/`write`/`close` contract with no message boundaries. Framing is
//! the client's job.
//!
//! ## Available Transports
//!
//! | Kind | Backend | Address |
//! |------|---------|---------|
//! | USB | [`serial::SerialTransport`] | serial port path or `auto` |
//! | Bluetooth | [`bluetooth::BluetoothTransport`] | `XX:XX:XX:XX:XX:XX` |
//! | Native Bluetooth | [`platform::PlatformBluetoothTransport`] | `XX:XX:XX:XX:XX:XX` |
//! | BLE | [`ble::BleTransport`] | MAC or platform UUID |
//!
//! [`mock::MockTransport`] is an in-memory stand-in for tests.
//!
//! ## Read Contract
//!
//! `read(max_len)` blocks for at most a backend-defined timeout and returns
//! whatever arrived, possibly nothing. Callers retry at a higher layer.
//! Backends that cannot distinguish "quiet" from "broken" fail with
//! [`NiimbotError::Timeout`] instead.
//!
//! ## Example
//!
//! ```no_run
//! use niimbot::transport::{self, ConnectionKind};
//!
//! let mut transport = transport::open(ConnectionKind::Serial, None)?;
//! transport.write(&[0x55, 0x55, 0xDC, 0x01, 0x01, 0xDC, 0xAA, 0xAA])?;
//! let reply = transport.read(1024)?;
//! # Ok::<(), niimbot::NiimbotError>(())
//! ```

pub mod ble;
pub mod bluetooth;
pub mod mock;
pub mod platform;
pub mod rfcomm;
pub mod serial;

pub use ble::BleTransport;
pub use bluetooth::BluetoothTransport;
pub use mock::MockTransport;
pub use platform::PlatformBluetoothTransport;
pub use serial::SerialTransport;

use crate::error::{NiimbotError, Result};

/// Blocking byte channel to a printer.
pub trait Transport: Send {
    /// Read up to `max_len` bytes. May return fewer, or none on timeout.
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>>;

    /// Write all of `data`, returning the number of bytes submitted.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Release the underlying resources. Calling it twice is harmless.
    fn close(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        (**self).read(max_len)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Which backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// USB serial
    Serial,
    /// Classic Bluetooth RFCOMM socket
    Bluetooth,
    /// OS-managed Bluetooth channel
    PlatformBluetooth,
    /// Bluetooth Low Energy
    Ble,
}

impl ConnectionKind {
    /// Parse a connection name.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "usb" | "serial" => Ok(Self::Serial),
            "bluetooth" | "bt" => Ok(Self::Bluetooth),
            "bluetooth-native" | "native" => Ok(Self::PlatformBluetooth),
            "ble" => Ok(Self::Ble),
            other => Err(NiimbotError::InvalidArgument(format!(
                "Unknown connection '{}'. Use 'usb', 'bluetooth', 'bluetooth-native' or 'ble'",
                other
            ))),
        }
    }

    /// Validate and normalize an address for this connection kind.
    ///
    /// Bluetooth addresses are upper-cased. Serial accepts any path, or
    /// `None`/`"auto"` for auto-detection.
    pub fn normalize_address(self, address: Option<&str>) -> Result<Option<String>> {
        match self {
            Self::Serial => Ok(address
                .filter(|a| !a.eq_ignore_ascii_case("auto"))
                .map(str::to_string)),
            Self::Bluetooth | Self::PlatformBluetooth => {
                let addr = require_address(self, address)?.to_uppercase();
                if !rfcomm::is_valid_mac(&addr) {
                    return Err(NiimbotError::InvalidArgument(format!(
                        "Bad MAC address '{}'",
                        addr
                    )));
                }
                Ok(Some(addr))
            }
            Self::Ble => {
                let addr = require_address(self, address)?.to_uppercase();
                if !rfcomm::is_valid_mac(&addr) && uuid::Uuid::parse_str(&addr).is_err() {
                    return Err(NiimbotError::InvalidArgument(format!(
                        "Bad BLE address '{}' (expected MAC address or UUID)",
                        addr
                    )));
                }
                Ok(Some(addr))
            }
        }
    }
}

fn require_address(kind: ConnectionKind, address: Option<&str>) -> Result<&str> {
    address.ok_or_else(|| {
        NiimbotError::InvalidArgument(format!("An address is required for {:?} connections", kind))
    })
}

/// Open a transport of the given kind.
///
/// The backend is chosen once here; the returned transport never switches.
pub fn open(kind: ConnectionKind, address: Option<&str>) -> Result<Box<dyn Transport>> {
    let address = kind.normalize_address(address)?;
    let transport: Box<dyn Transport> = match (kind, address.as_deref()) {
        (ConnectionKind::Serial, port) => Box::new(SerialTransport::open(port)?),
        (ConnectionKind::Bluetooth, Some(addr)) => Box::new(BluetoothTransport::connect(addr)?),
        (ConnectionKind::PlatformBluetooth, Some(addr)) => {
            Box::new(PlatformBluetoothTransport::connect(addr)?)
        }
        (ConnectionKind::Ble, Some(addr)) => Box::new(BleTransport::connect(addr)?),
        (kind, None) => {
            return Err(NiimbotError::InvalidArgument(format!(
                "An address is required for {:?} connections",
                kind
            )));
        }
    };
    Ok(transport)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!(ConnectionKind::parse("usb").unwrap(), ConnectionKind::Serial);
        assert_eq!(ConnectionKind::parse("BLE").unwrap(), ConnectionKind::Ble);
        assert_eq!(
            ConnectionKind::parse("bluetooth-native").unwrap(),
            ConnectionKind::PlatformBluetooth
        );
        assert!(ConnectionKind::parse("wifi").is_err());
    }

    #[test]
    fn test_serial_address_auto() {
        let kind = ConnectionKind::Serial;
        assert_eq!(kind.normalize_address(None).unwrap(), None);
        assert_eq!(kind.normalize_address(Some("auto")).unwrap(), None);
        assert_eq!(
            kind.normalize_address(Some("/dev/ttyACM0")).unwrap(),
            Some("/dev/ttyACM0".to_string())
        );
    }

    #[test]
    fn test_bluetooth_address_uppercased() {
        let addr = ConnectionKind::Bluetooth
            .normalize_address(Some("03:26:03:c3:f9:11"))
            .unwrap();
        assert_eq!(addr.as_deref(), Some("03:26:03:C3:F9:11"));
    }

    #[test]
    fn test_bluetooth_address_required_and_checked() {
        assert!(ConnectionKind::Bluetooth.normalize_address(None).is_err());
        assert!(
            ConnectionKind::PlatformBluetooth
                .normalize_address(Some("not-a-mac"))
                .is_err()
        );
    }

    #[test]
    fn test_ble_accepts_mac_or_uuid() {
        let kind = ConnectionKind::Ble;
        assert!(kind.normalize_address(Some("26:03:03:C3:F9:11")).is_ok());
        assert!(
            kind.normalize_address(Some("e7810a71-73ae-499d-8c15-faa9aef0c3f2"))
                .is_ok()
        );
        assert!(kind.normalize_address(Some("printer")).is_err());
    }
}
