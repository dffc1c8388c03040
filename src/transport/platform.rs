//! # Platform Bluetooth Transport
//!
//! Wraps an event-driven, OS-managed Bluetooth channel behind the blocking
//! [`Transport`] contract.
//!
//! The OS delivers inbound data as events. This transport owns a small
//! receive buffer; `read` pumps the channel's event source in short slices
//! until the buffer holds data or the read timeout elapses:
//!
//! ```text
//! read(max_len)
//!   │
//!   ├─ buffer empty? ──► pump(10ms) ──► Data(bytes) → buffer
//!   │        ▲                │
//!   │        └──── retry ─────┘ (until 500ms)
//!   │
//!   └─ return up to max_len bytes from buffer
//! ```
//!
//! `write` is synchronous against the channel.
//!
//! On Unix the built-in channel is [`RfcommTty`], the kernel's RFCOMM TTY
//! bound to the printer's MAC address, pumped with `poll(2)`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::Transport;
use crate::error::{NiimbotError, Result};

/// Default time `read` waits for the first byte
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Length of one event pump slice
pub const PUMP_SLICE: Duration = Duration::from_millis(10);

/// Event delivered by a native channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Bytes received from the device
    Data(Vec<u8>),
    /// The OS closed the channel
    Closed,
}

/// An OS Bluetooth channel with an event source.
pub trait NativeChannel: Send {
    /// Run the event source for at most `budget` and return what happened.
    fn pump(&mut self, budget: Duration) -> Result<Vec<ChannelEvent>>;

    /// Write synchronously, returning once the OS accepted every byte.
    fn write_sync(&mut self, data: &[u8]) -> Result<()>;

    /// Close the channel. Must tolerate repeated calls.
    fn close_channel(&mut self);
}

/// Blocking transport over a [`NativeChannel`]
pub struct PlatformBluetoothTransport<C: NativeChannel = RfcommTty> {
    channel: C,
    buffer: VecDeque<u8>,
    connected: bool,
    read_timeout: Duration,
}

impl<C: NativeChannel> PlatformBluetoothTransport<C> {
    /// Wrap an already-open channel.
    pub fn with_channel(channel: C) -> Self {
        Self {
            channel,
            buffer: VecDeque::new(),
            connected: true,
            read_timeout: READ_TIMEOUT,
        }
    }

    /// Change how long `read` waits for data.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn apply(&mut self, events: Vec<ChannelEvent>) {
        for event in events {
            match event {
                ChannelEvent::Data(bytes) => self.buffer.extend(bytes),
                ChannelEvent::Closed => {
                    debug!("Native Bluetooth channel closed by the OS");
                    self.connected = false;
                }
            }
        }
    }
}

#[cfg(unix)]
impl PlatformBluetoothTransport<RfcommTty> {
    /// Connect to a printer through its RFCOMM TTY.
    pub fn connect(address: &str) -> Result<Self> {
        Ok(Self::with_channel(RfcommTty::connect(address)?))
    }
}

#[cfg(not(unix))]
impl PlatformBluetoothTransport<RfcommTty> {
    pub fn connect(_address: &str) -> Result<Self> {
        Err(NiimbotError::Transport(
            "Native Bluetooth transport is not supported on this platform".to_string(),
        ))
    }
}

impl<C: NativeChannel> Transport for PlatformBluetoothTransport<C> {
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        if !self.connected && self.buffer.is_empty() {
            return Err(NiimbotError::Closed);
        }

        let start = Instant::now();
        while self.buffer.is_empty() && self.connected && start.elapsed() < self.read_timeout {
            let events = self.channel.pump(PUMP_SLICE)?;
            self.apply(events);
        }

        if self.buffer.is_empty() {
            if !self.connected {
                return Err(NiimbotError::Closed);
            }
            return Err(NiimbotError::Timeout(format!(
                "No data received within {:?}",
                self.read_timeout
            )));
        }

        let n = max_len.min(self.buffer.len());
        let data: Vec<u8> = self.buffer.drain(..n).collect();
        trace!("read {} bytes: {}", data.len(), hex::encode(&data));
        Ok(data)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if !self.connected {
            return Err(NiimbotError::Closed);
        }
        trace!("write {} bytes: {}", data.len(), hex::encode(data));
        self.channel.write_sync(data)?;
        Ok(data.len())
    }

    fn close(&mut self) -> Result<()> {
        if self.connected {
            debug!("Closing native Bluetooth channel");
        }
        self.channel.close_channel();
        self.connected = false;
        Ok(())
    }
}

impl<C: NativeChannel> Drop for PlatformBluetoothTransport<C> {
    fn drop(&mut self) {
        self.channel.close_channel();
    }
}

// ============================================================================
// RFCOMM TTY CHANNEL
// ============================================================================

/// Kernel RFCOMM TTY (`/dev/rfcommN`) as a native channel.
pub struct RfcommTty {
    #[cfg(unix)]
    file: Option<std::fs::File>,
    path: String,
}

impl RfcommTty {
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(unix)]
impl RfcommTty {
    /// Find (or bind) the RFCOMM TTY for `address` and open it in raw mode.
    pub fn connect(address: &str) -> Result<Self> {
        use super::rfcomm;

        let path = match rfcomm::find_rfcomm_for_mac(address)? {
            Some(path) => path,
            None => {
                let index = rfcomm::free_rfcomm_index().ok_or_else(|| {
                    NiimbotError::Transport("No free /dev/rfcomm index".to_string())
                })?;
                rfcomm::setup_rfcomm(address, index)?
            }
        };
        Self::open(&path)
    }

    /// Open an RFCOMM TTY by path.
    pub fn open(path: &str) -> Result<Self> {
        use std::fs::OpenOptions;
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| NiimbotError::Transport(format!("Failed to open {}: {}", path, e)))?;
        super::rfcomm::configure_tty_raw(file.as_raw_fd())?;
        debug!("Opened {}", path);

        Ok(Self {
            file: Some(file),
            path: path.to_string(),
        })
    }
}

#[cfg(unix)]
impl NativeChannel for RfcommTty {
    fn pump(&mut self, budget: Duration) -> Result<Vec<ChannelEvent>> {
        use std::io::Read;
        use std::os::unix::io::AsRawFd;

        let Some(file) = self.file.as_mut() else {
            return Ok(vec![ChannelEvent::Closed]);
        };

        let mut pfd = libc::pollfd {
            fd: file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = budget.as_millis().min(i32::MAX as u128) as i32;
        let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(NiimbotError::Transport(format!("poll failed: {}", err)));
        }
        if ready == 0 {
            return Ok(Vec::new());
        }

        if pfd.revents & libc::POLLIN != 0 {
            let mut buf = [0u8; 1024];
            let n = file
                .read(&mut buf)
                .map_err(|e| NiimbotError::Transport(format!("Read failed: {}", e)))?;
            if n == 0 {
                return Ok(vec![ChannelEvent::Closed]);
            }
            return Ok(vec![ChannelEvent::Data(buf[..n].to_vec())]);
        }
        if pfd.revents & (libc::POLLHUP | libc::POLLERR) != 0 {
            return Ok(vec![ChannelEvent::Closed]);
        }
        Ok(Vec::new())
    }

    fn write_sync(&mut self, data: &[u8]) -> Result<()> {
        use std::io::Write;

        let file = self.file.as_mut().ok_or(NiimbotError::Closed)?;
        file.write_all(data)
            .map_err(|e| NiimbotError::Transport(format!("Write failed: {}", e)))?;
        file.flush()
            .map_err(|e| NiimbotError::Transport(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    fn close_channel(&mut self) {
        if self.file.take().is_some() {
            debug!("Closed {}", self.path);
        }
    }
}

#[cfg(not(unix))]
impl NativeChannel for RfcommTty {
    fn pump(&mut self, _budget: Duration) -> Result<Vec<ChannelEvent>> {
        Ok(vec![ChannelEvent::Closed])
    }

    fn write_sync(&mut self, _data: &[u8]) -> Result<()> {
        Err(NiimbotError::Closed)
    }

    fn close_channel(&mut self) {}
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Channel that replays scripted pump results
    struct ScriptedChannel {
        script: VecDeque<Vec<ChannelEvent>>,
        written: Arc<Mutex<Vec<u8>>>,
        closes: Arc<Mutex<usize>>,
    }

    impl ScriptedChannel {
        fn new(script: Vec<Vec<ChannelEvent>>) -> Self {
            Self {
                script: script.into(),
                written: Arc::new(Mutex::new(Vec::new())),
                closes: Arc::new(Mutex::new(0)),
            }
        }
    }

    impl NativeChannel for ScriptedChannel {
        fn pump(&mut self, budget: Duration) -> Result<Vec<ChannelEvent>> {
            match self.script.pop_front() {
                Some(events) => Ok(events),
                None => {
                    std::thread::sleep(budget);
                    Ok(Vec::new())
                }
            }
        }

        fn write_sync(&mut self, data: &[u8]) -> Result<()> {
            self.written.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        fn close_channel(&mut self) {
            *self.closes.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_read_waits_for_data() {
        let channel = ScriptedChannel::new(vec![
            vec![],
            vec![],
            vec![ChannelEvent::Data(vec![1, 2, 3])],
        ]);
        let mut transport = PlatformBluetoothTransport::with_channel(channel);
        assert_eq!(transport.read(2).unwrap(), vec![1, 2]);
        // Leftover served without pumping
        assert_eq!(transport.read(10).unwrap(), vec![3]);
    }

    #[test]
    fn test_read_times_out() {
        let mut transport = PlatformBluetoothTransport::with_channel(ScriptedChannel::new(vec![]));
        transport.set_read_timeout(Duration::from_millis(30));
        assert!(matches!(transport.read(10), Err(NiimbotError::Timeout(_))));
    }

    #[test]
    fn test_os_close_event() {
        let channel = ScriptedChannel::new(vec![vec![
            ChannelEvent::Data(vec![9]),
            ChannelEvent::Closed,
        ]]);
        let mut transport = PlatformBluetoothTransport::with_channel(channel);
        // Buffered data is still delivered
        assert_eq!(transport.read(10).unwrap(), vec![9]);
        assert!(!transport.is_connected());
        assert!(matches!(transport.read(10), Err(NiimbotError::Closed)));
        assert!(matches!(transport.write(&[1]), Err(NiimbotError::Closed)));
    }

    #[test]
    fn test_write_and_close() {
        let channel = ScriptedChannel::new(vec![]);
        let written = Arc::clone(&channel.written);
        let closes = Arc::clone(&channel.closes);
        let mut transport = PlatformBluetoothTransport::with_channel(channel);

        assert_eq!(transport.write(&[0x55, 0x55]).unwrap(), 2);
        assert_eq!(*written.lock().unwrap(), vec![0x55, 0x55]);

        transport.close().unwrap();
        transport.close().unwrap();
        assert!(matches!(transport.write(&[1]), Err(NiimbotError::Closed)));
        drop(transport);
        assert!(*closes.lock().unwrap() >= 2);
    }
}
