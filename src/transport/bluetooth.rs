//! # Bluetooth RFCOMM Transport
//!
//! This module talks to NIIMBOT printers over the Bluetooth Serial Port
//! Profile by opening an RFCOMM stream socket directly. Unlike the
//! [`platform`](super::platform) transport it needs no `/dev/rfcommN`
//! binding and no root privileges, only a paired printer.
//!
//! ## Socket Setup (Linux)
//!
//! | Step | Call |
//! |------|------|
//! | Create | `socket(AF_BLUETOOTH, SOCK_STREAM, BTPROTO_RFCOMM)` |
//! | Connect | `sockaddr_rc { family, bdaddr (reversed), channel 1 }` |
//! | Timeout | `SO_RCVTIMEO` = 500ms |
//!
//! ## Connection Failures
//!
//! The two errors a user can actually fix get their own variants:
//!
//! - `EHOSTDOWN` → [`NiimbotError::HostDown`] (printer off or out of range)
//! - `ECONNREFUSED` → [`NiimbotError::ConnectionRefused`] (not paired, or busy)
//!
//! ## Chunked Writes
//!
//! Large row batches are written in chunks with a small delay between them
//! to avoid overrunning the adapter's buffer.

use std::time::Duration;

use crate::error::{NiimbotError, Result};

use super::Transport;

/// Receive timeout applied to the socket
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Default chunk size for writes (bytes)
const CHUNK_SIZE: usize = 4096;

/// Delay between chunks (milliseconds)
const CHUNK_DELAY_MS: u64 = 2;

/// Map a failed `connect(2)` to the error the user should see.
pub fn classify_connect_error(err: std::io::Error, address: &str) -> NiimbotError {
    match err.raw_os_error() {
        Some(libc::EHOSTDOWN) => NiimbotError::HostDown {
            address: address.to_string(),
        },
        Some(libc::ECONNREFUSED) => NiimbotError::ConnectionRefused {
            address: address.to_string(),
        },
        _ => NiimbotError::Transport(format!("Failed to connect to {}: {}", address, err)),
    }
}

/// # Bluetooth Printer Transport
///
/// Blocking RFCOMM stream socket to a printer.
///
/// ## Example
///
/// ```no_run
/// use niimbot::transport::{BluetoothTransport, Transport};
///
/// let mut transport = BluetoothTransport::connect("03:26:03:C3:F9:11")?;
/// transport.write(&[0x55, 0x55, 0xDC, 0x01, 0x01, 0xDC, 0xAA, 0xAA])?;
/// # Ok::<(), niimbot::NiimbotError>(())
/// ```
pub struct BluetoothTransport {
    #[cfg(target_os = "linux")]
    socket: Option<std::fs::File>,
    address: String,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl BluetoothTransport {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Set the chunk size for writes.
    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size.max(1);
    }

    /// Set the delay between chunks.
    pub fn set_chunk_delay(&mut self, delay: Duration) {
        self.chunk_delay = delay;
    }
}

// ============================================================================
// LINUX SOCKET BACKEND
// ============================================================================

#[cfg(target_os = "linux")]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::fd::{FromRawFd, OwnedFd};

    use crate::error::{NiimbotError, Result};
    use crate::transport::rfcomm::{self, RFCOMM_CHANNEL};

    use super::{READ_TIMEOUT, classify_connect_error};

    const BTPROTO_RFCOMM: libc::c_int = 3;

    /// `struct sockaddr_rc` from `<bluetooth/rfcomm.h>`
    #[repr(C)]
    struct SockaddrRc {
        rc_family: libc::sa_family_t,
        rc_bdaddr: [u8; 6],
        rc_channel: u8,
    }

    /// BlueZ stores addresses least significant octet first.
    pub(super) fn bdaddr(address: &str) -> Result<[u8; 6]> {
        let mut octets = rfcomm::parse_mac(address)?;
        octets.reverse();
        Ok(octets)
    }

    pub(super) fn connect(address: &str) -> Result<File> {
        let bdaddr = bdaddr(address)?;

        let fd = unsafe { libc::socket(libc::AF_BLUETOOTH, libc::SOCK_STREAM, BTPROTO_RFCOMM) };
        if fd < 0 {
            return Err(NiimbotError::Transport(format!(
                "Failed to create RFCOMM socket: {}",
                io::Error::last_os_error()
            )));
        }
        // Owned from here on so every error path closes it
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };

        let addr = SockaddrRc {
            rc_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            rc_bdaddr: bdaddr,
            rc_channel: RFCOMM_CHANNEL,
        };
        let result = unsafe {
            libc::connect(
                fd,
                &addr as *const SockaddrRc as *const libc::sockaddr,
                std::mem::size_of::<SockaddrRc>() as libc::socklen_t,
            )
        };
        if result != 0 {
            return Err(classify_connect_error(io::Error::last_os_error(), address));
        }

        let timeout = libc::timeval {
            tv_sec: READ_TIMEOUT.as_secs() as libc::time_t,
            tv_usec: READ_TIMEOUT.subsec_micros() as libc::suseconds_t,
        };
        let result = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &timeout as *const libc::timeval as *const libc::c_void,
                std::mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        };
        if result != 0 {
            return Err(NiimbotError::Transport(format!(
                "Failed to set receive timeout: {}",
                io::Error::last_os_error()
            )));
        }

        Ok(File::from(owned))
    }
}

#[cfg(target_os = "linux")]
impl BluetoothTransport {
    /// Connect to a paired printer on RFCOMM channel 1.
    pub fn connect(address: &str) -> Result<Self> {
        tracing::info!("Connecting to {} over RFCOMM", address);
        let socket = sys::connect(address)?;
        tracing::debug!("Connected to {}", address);
        Ok(Self {
            socket: Some(socket),
            address: address.to_string(),
            chunk_size: CHUNK_SIZE,
            chunk_delay: Duration::from_millis(CHUNK_DELAY_MS),
        })
    }
}

#[cfg(not(target_os = "linux"))]
impl BluetoothTransport {
    pub fn connect(_address: &str) -> Result<Self> {
        Err(NiimbotError::Transport(
            "RFCOMM sockets are not supported on this platform; use 'ble' instead".to_string(),
        ))
    }
}

#[cfg(target_os = "linux")]
impl Transport for BluetoothTransport {
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        use std::io::{ErrorKind, Read};

        let socket = self.socket.as_mut().ok_or(NiimbotError::Closed)?;
        let mut buf = vec![0u8; max_len];
        match socket.read(&mut buf) {
            Ok(0) if max_len > 0 => Err(NiimbotError::Closed),
            Ok(n) => {
                buf.truncate(n);
                tracing::trace!("read {} bytes: {}", n, hex::encode(&buf));
                Ok(buf)
            }
            // SO_RCVTIMEO expiry surfaces as EAGAIN
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(Vec::new())
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(Vec::new()),
            Err(e) => Err(NiimbotError::Transport(format!("Read failed: {}", e))),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        use std::io::Write;

        let chunk_size = self.chunk_size;
        let chunk_delay = self.chunk_delay;
        let socket = self.socket.as_mut().ok_or(NiimbotError::Closed)?;
        tracing::trace!("write {} bytes: {}", data.len(), hex::encode(data));

        let mut chunks = data.chunks(chunk_size).peekable();
        while let Some(chunk) = chunks.next() {
            socket
                .write_all(chunk)
                .map_err(|e| NiimbotError::Transport(format!("Write failed: {}", e)))?;
            if chunks.peek().is_some() && !chunk_delay.is_zero() {
                std::thread::sleep(chunk_delay);
            }
        }
        Ok(data.len())
    }

    fn close(&mut self) -> Result<()> {
        if self.socket.take().is_some() {
            tracing::debug!("Closed RFCOMM socket to {}", self.address);
        }
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
impl Transport for BluetoothTransport {
    fn read(&mut self, _max_len: usize) -> Result<Vec<u8>> {
        Err(NiimbotError::Closed)
    }

    fn write(&mut self, _data: &[u8]) -> Result<usize> {
        Err(NiimbotError::Closed)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
