//! # RFCOMM Helpers
//!
//! Shared Bluetooth Serial Port Profile plumbing: MAC address handling and,
//! on Unix, the kernel RFCOMM TTY devices (`/dev/rfcommN`).
//!
//! ## Binding a Printer (Linux)
//!
//! ```bash
//! # 1. Pair once
//! $ bluetoothctl
//! [bluetooth]# pair 03:26:03:C3:F9:11
//!
//! # 2. Bind to an RFCOMM device (creates /dev/rfcomm0)
//! $ sudo rfcomm bind 0 03:26:03:C3:F9:11 1
//! ```
//!
//! ## TTY Configuration
//!
//! The TTY is put in raw mode so binary frames pass through unmodified:
//!
//! - **No input processing**: IGNBRK, BRKINT, PARMRK, ISTRIP, INLCR, IGNCR, ICRNL
//! - **No flow control**: IXON, IXOFF, IXANY (0x11/0x13 appear in frames)
//! - **No output processing**: OPOST
//! - **8-bit characters**: CS8, no parity
//! - **Non-canonical, no echo**: ICANON, ECHO, ECHONL, ISIG, IEXTEN off

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::io;
#[cfg(unix)]
use std::path::Path;
#[cfg(unix)]
use std::process::Command;
#[cfg(unix)]
use std::thread;
#[cfg(unix)]
use std::time::Duration;

#[cfg(unix)]
use tracing::{debug, info};

use crate::error::{NiimbotError, Result};

/// RFCOMM channel the printers expose SPP on
pub const RFCOMM_CHANNEL: u8 = 1;

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Parse `XX:XX:XX:XX:XX:XX` into its six octets, most significant first.
pub fn parse_mac(mac: &str) -> Result<[u8; 6]> {
    if !is_valid_mac(mac) {
        return Err(NiimbotError::InvalidArgument(format!(
            "Bad MAC address '{}'",
            mac
        )));
    }
    let mut octets = [0u8; 6];
    for (octet, part) in octets.iter_mut().zip(mac.split(':')) {
        *octet = u8::from_str_radix(part, 16)
            .map_err(|e| NiimbotError::InvalidArgument(format!("Bad MAC octet '{}': {}", part, e)))?;
    }
    Ok(octets)
}

/// Guess the BLE address of a printer from its classic address.
///
/// Observed on D110: classic `03:26:03:C3:F9:11` advertises BLE as
/// `26:03:03:C3:F9:11`, i.e. the first three octets rotate
/// (AA:BB:CC → CC:AA:BB).
pub fn classic_to_ble_address(classic: &str) -> Result<String> {
    let upper = classic.to_uppercase();
    if !is_valid_mac(&upper) {
        return Err(NiimbotError::InvalidArgument(format!(
            "Bad MAC address '{}'",
            classic
        )));
    }
    let parts: Vec<&str> = upper.split(':').collect();
    let rotated = [parts[2], parts[0], parts[1], parts[3], parts[4], parts[5]];
    Ok(rotated.join(":"))
}

/// Configure a file descriptor for raw TTY mode.
#[cfg(unix)]
pub fn configure_tty_raw(fd: i32) -> Result<()> {
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(NiimbotError::Transport(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(NiimbotError::Transport(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Find the device name in an `rfcomm` listing line bound to `mac`.
///
/// Lines look like `rfcomm0: 03:26:03:C3:F9:11 channel 1 clean`.
fn device_for_line(line: &str, mac_upper: &str) -> Option<String> {
    if !line.to_uppercase().contains(mac_upper) {
        return None;
    }
    line.split(':')
        .next()
        .map(|dev| format!("/dev/{}", dev.trim()))
}

/// Find an existing RFCOMM device bound to the given MAC address.
///
/// Checks `/proc/net/rfcomm` and falls back to `rfcomm -a`.
#[cfg(unix)]
pub fn find_rfcomm_for_mac(mac: &str) -> Result<Option<String>> {
    let mac_upper = mac.to_uppercase();

    if let Ok(contents) = fs::read_to_string("/proc/net/rfcomm") {
        let found = contents
            .lines()
            .filter_map(|line| device_for_line(line, &mac_upper))
            .find(|path| Path::new(path).exists());
        if found.is_some() {
            return Ok(found);
        }
    }

    let output = Command::new("rfcomm")
        .arg("-a")
        .output()
        .map_err(|e| NiimbotError::Transport(format!("Failed to run 'rfcomm -a': {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .filter_map(|line| device_for_line(line, &mac_upper))
        .find(|path| Path::new(path).exists()))
}

#[cfg(not(unix))]
pub fn find_rfcomm_for_mac(_mac: &str) -> Result<Option<String>> {
    Ok(None)
}

/// Bind `/dev/rfcomm<index>` to a MAC address.
///
/// Runs `bluetoothctl connect`, `l2ping -c 1`, then `rfcomm bind`.
/// **Requires root privileges** for the bind step.
#[cfg(unix)]
pub fn setup_rfcomm(mac: &str, index: u8) -> Result<String> {
    let mac_upper = mac.to_uppercase();
    let device_path = format!("/dev/rfcomm{}", index);

    info!("Connecting to {}", mac_upper);
    let output = Command::new("bluetoothctl")
        .arg("connect")
        .arg(&mac_upper)
        .output()
        .map_err(|e| NiimbotError::Transport(format!("Failed to run bluetoothctl: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !(stdout.contains("Connection successful") || stdout.contains("already connected")) {
        // l2ping below decides whether this matters
        debug!("bluetoothctl returned: {}", stdout.trim());
    }

    thread::sleep(Duration::from_millis(500));

    let output = Command::new("l2ping")
        .arg("-c")
        .arg("1")
        .arg(&mac_upper)
        .output()
        .map_err(|e| NiimbotError::Transport(format!("Failed to run l2ping: {}", e)))?;

    if !output.status.success() {
        return Err(NiimbotError::HostDown { address: mac_upper });
    }

    info!("Binding rfcomm{}", index);
    let output = Command::new("rfcomm")
        .arg("bind")
        .arg(index.to_string())
        .arg(&mac_upper)
        .arg(RFCOMM_CHANNEL.to_string())
        .output()
        .map_err(|e| NiimbotError::Transport(format!("Failed to run rfcomm bind: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(NiimbotError::Transport(format!(
            "rfcomm bind failed: {}",
            stderr.trim()
        )));
    }

    thread::sleep(Duration::from_millis(500));

    if !Path::new(&device_path).exists() {
        return Err(NiimbotError::Transport(format!(
            "Device {} was not created",
            device_path
        )));
    }

    debug!("Created {}", device_path);
    Ok(device_path)
}

#[cfg(not(unix))]
pub fn setup_rfcomm(_mac: &str, _index: u8) -> Result<String> {
    Err(NiimbotError::Transport(
        "RFCOMM setup not supported on this platform".to_string(),
    ))
}

/// First `/dev/rfcommN` index not already present
#[cfg(unix)]
pub fn free_rfcomm_index() -> Option<u8> {
    (0..=u8::MAX).find(|i| !Path::new(&format!("/dev/rfcomm{}", i)).exists())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_format() {
        assert!(is_valid_mac("03:26:03:C3:F9:11"));
        assert!(is_valid_mac("26:03:03:c3:f9:11"));

        for bad in [
            "03:26:03:C3:F9",
            "03:26:03:C3:F9:11:00",
            "03-26-03-C3-F9-11",
            "03:26:03:C3:F9:1G",
            "3:26:03:C3:F9:11",
            "",
        ] {
            assert!(!is_valid_mac(bad), "{}", bad);
        }
    }

    #[test]
    fn test_parse_mac() {
        assert_eq!(
            parse_mac("03:26:03:C3:F9:11").unwrap(),
            [0x03, 0x26, 0x03, 0xC3, 0xF9, 0x11]
        );
        assert!(parse_mac("03:26:03:C3:F9").is_err());
    }

    #[test]
    fn test_classic_to_ble_address() {
        assert_eq!(
            classic_to_ble_address("03:26:03:c3:f9:11").unwrap(),
            "26:03:03:C3:F9:11"
        );
        assert!(classic_to_ble_address("bogus").is_err());
    }

    #[test]
    fn test_device_for_line() {
        let line = "rfcomm0: 03:26:03:C3:F9:11 channel 1 clean";
        assert_eq!(
            device_for_line(line, "03:26:03:C3:F9:11").as_deref(),
            Some("/dev/rfcomm0")
        );
        assert_eq!(device_for_line(line, "00:00:00:00:00:00"), None);
    }
}
