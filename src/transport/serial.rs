//! # USB Serial Transport
//!
//! NIIMBOT printers enumerate as a USB CDC serial device. The port runs at
//! 115200 baud, 8N1, with a 500ms read timeout.
//!
//! ## Port Selection
//!
//! | Address | Behavior |
//! |---------|----------|
//! | `/dev/ttyACM0`, `COM3`, ... | Open that port |
//! | `None` / `auto` | Use the only available port |
//!
//! Auto-detection refuses to guess: zero ports is [`NiimbotError::NoPort`],
//! more than one is [`NiimbotError::AmbiguousPort`] listing every candidate.
//! On macOS only `/dev/cu.*` devices are considered since `/dev/tty.*`
//! blocks on open waiting for carrier detect.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use tracing::{debug, info, trace};

use super::Transport;
use crate::error::{NiimbotError, Result};

/// Line speed used by every supported model
pub const BAUD_RATE: u32 = 115_200;

/// Per-read timeout
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Blocking USB serial connection
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
}

impl SerialTransport {
    /// Open `port`, or auto-detect when `None`.
    pub fn open(port: Option<&str>) -> Result<Self> {
        let name = match port {
            Some(name) => name.to_string(),
            None => detect_port()?,
        };

        let handle = serialport::new(&name, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| NiimbotError::Transport(format!("Failed to open {}: {}", name, e)))?;
        info!("Opened {} at {} baud", name, BAUD_RATE);

        Ok(Self {
            port: Some(handle),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Pick the single available serial port.
pub fn detect_port() -> Result<String> {
    let ports = serialport::available_ports()
        .map_err(|e| NiimbotError::Transport(format!("Failed to enumerate ports: {}", e)))?;
    let name = select_port(ports.into_iter().filter(is_candidate).collect())?;
    debug!("Auto-detected serial port {}", name);
    Ok(name)
}

fn is_candidate(_port: &SerialPortInfo) -> bool {
    #[cfg(target_os = "macos")]
    {
        !_port.port_name.starts_with("/dev/tty.")
    }
    #[cfg(not(target_os = "macos"))]
    {
        true
    }
}

fn select_port(mut ports: Vec<SerialPortInfo>) -> Result<String> {
    match ports.len() {
        0 => Err(NiimbotError::NoPort),
        1 => Ok(ports.remove(0).port_name),
        _ => Err(NiimbotError::AmbiguousPort {
            candidates: ports.iter().map(describe_port).collect(),
        }),
    }
}

/// One-line description for the ambiguous-port listing
fn describe_port(port: &SerialPortInfo) -> String {
    match &port.port_type {
        SerialPortType::UsbPort(usb) => {
            let product = usb.product.as_deref().unwrap_or("USB device");
            format!(
                "{} ({}, {:04x}:{:04x})",
                port.port_name, product, usb.vid, usb.pid
            )
        }
        SerialPortType::BluetoothPort => format!("{} (Bluetooth)", port.port_name),
        SerialPortType::PciPort => format!("{} (PCI)", port.port_name),
        SerialPortType::Unknown => port.port_name.clone(),
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let port = self.port.as_mut().ok_or(NiimbotError::Closed)?;
        let mut buf = vec![0u8; max_len];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                if n > 0 {
                    trace!("read {} bytes: {}", n, hex::encode(&buf));
                }
                Ok(buf)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(NiimbotError::Transport(format!("Read failed: {}", e))),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or(NiimbotError::Closed)?;
        trace!("write {} bytes: {}", data.len(), hex::encode(data));
        port.write_all(data)
            .map_err(|e| NiimbotError::Transport(format!("Write failed: {}", e)))?;
        port.flush()
            .map_err(|e| NiimbotError::Transport(format!("Flush failed: {}", e)))?;
        Ok(data.len())
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!("Closed {}", self.name);
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
