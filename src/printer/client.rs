//! # Printer Client
//!
//! Request/response engine over a [`Transport`]. The client owns the inbound
//! accumulator: every read is appended to it and complete frames are drained
//! from its head, one at a time.
//!
//! ## Transceive
//!
//! ```text
//! write(request)
//!   │
//!   └─► round 1..=max_attempts
//!         read ─► accumulator ─► decode every complete frame
//!           0xDB          → DeviceRejected
//!           0x00          → UnsupportedCommand
//!           req + offset  → candidate (last one in the round wins)
//!         candidate?  return it
//!         otherwise   sleep(poll_interval)
//!   None
//! ```
//!
//! Frames that match nothing are dropped. A corrupt frame is logged and
//! skipped by its declared length.
//!
//! ## Example
//!
//! ```no_run
//! use niimbot::printer::PrinterClient;
//! use niimbot::protocol::InfoKey;
//! use niimbot::transport::{self, ConnectionKind};
//!
//! let transport = transport::open(ConnectionKind::Serial, None)?;
//! let mut client = PrinterClient::new(transport);
//! if let Some(battery) = client.get_info(InfoKey::Battery)? {
//!     println!("battery: {}", battery);
//! }
//! # Ok::<(), niimbot::NiimbotError>(())
//! ```

use std::thread;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::{NiimbotError, Result};
use crate::protocol::commands::{
    self, DEFAULT_RESPONSE_OFFSET, DEVICE_ERROR, DEVICE_UNSUPPORTED, InfoKey, ONE, RequestCode,
};
use crate::protocol::packet::{self, Packet};
use crate::protocol::responses::{
    self, Heartbeat, InfoValue, PrintStatus, RfidInfo,
};
use crate::transport::Transport;

/// Bytes requested from the transport per read
pub const READ_CHUNK: usize = 1024;

/// Valid SET_LABEL_TYPE values
pub const LABEL_TYPES: std::ops::RangeInclusive<u8> = 1..=3;

/// Valid SET_LABEL_DENSITY values across all models
pub const DENSITIES: std::ops::RangeInclusive<u8> = 1..=5;

/// Retry policy for [`PrinterClient::transceive`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransceiveOptions {
    /// Read rounds before giving up
    pub max_attempts: u32,
    /// Sleep between rounds without a match
    pub poll_interval: Duration,
}

impl Default for TransceiveOptions {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Protocol client for one open printer connection
pub struct PrinterClient<T: Transport> {
    transport: T,
    accumulator: Vec<u8>,
    options: TransceiveOptions,
}

impl<T: Transport> PrinterClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_options(transport, TransceiveOptions::default())
    }

    pub fn with_options(transport: T, options: TransceiveOptions) -> Self {
        Self {
            transport,
            accumulator: Vec::new(),
            options,
        }
    }

    pub fn options(&self) -> TransceiveOptions {
        self.options
    }

    pub fn set_options(&mut self, options: TransceiveOptions) {
        self.options = options;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Bytes received but not yet framed
    pub fn pending(&self) -> usize {
        self.accumulator.len()
    }

    // ========================================================================
    // FRAMING
    // ========================================================================

    /// Write one frame without waiting for a reply.
    pub fn send(&mut self, packet: &Packet) -> Result<()> {
        trace!("send {:#04x}: {}", packet.command(), hex::encode(packet.payload()));
        self.transport.write(&packet.to_bytes())?;
        Ok(())
    }

    /// Concatenate frames into a single transport write.
    pub fn send_batch(&mut self, packets: &[Packet]) -> Result<()> {
        if packets.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(packets.iter().map(Packet::wire_len).sum());
        for packet in packets {
            packet.write_to(&mut buf);
        }
        trace!("send batch of {} frames ({} bytes)", packets.len(), buf.len());
        self.transport.write(&buf)?;
        Ok(())
    }

    /// One read, then drain every complete frame from the accumulator.
    fn recv(&mut self) -> Result<Vec<Packet>> {
        match self.transport.read(READ_CHUNK) {
            Ok(data) => self.accumulator.extend_from_slice(&data),
            // A quiet link is just an empty round
            Err(NiimbotError::Timeout(reason)) => trace!("read timed out: {}", reason),
            Err(e) => return Err(e),
        }

        let mut packets = Vec::new();
        loop {
            match packet::try_decode(&self.accumulator) {
                Ok(Some((packet, consumed))) => {
                    self.accumulator.drain(..consumed);
                    trace!(
                        "recv {:#04x}: {}",
                        packet.command(),
                        hex::encode(packet.payload())
                    );
                    packets.push(packet);
                }
                Ok(None) => break,
                Err(NiimbotError::CorruptFrame {
                    command,
                    expected,
                    actual,
                    consumed,
                }) => {
                    warn!(
                        "Dropping corrupt {:#04x} frame (checksum {:#04x}, expected {:#04x})",
                        command, actual, expected
                    );
                    self.accumulator.drain(..consumed.min(self.accumulator.len()));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(packets)
    }

    // ========================================================================
    // TRANSCEIVE
    // ========================================================================

    /// Send a request and wait for the frame typed `request + offset`.
    ///
    /// Uses the client's [`TransceiveOptions`]. `Ok(None)` means the device
    /// stayed silent for every round; callers decide whether that is fatal.
    pub fn transceive(
        &mut self,
        request: RequestCode,
        payload: &[u8],
        response_offset: u8,
    ) -> Result<Option<Packet>> {
        let options = self.options;
        self.transceive_with(request, payload, response_offset, options)
    }

    /// [`transceive`](Self::transceive) with explicit retry options.
    pub fn transceive_with(
        &mut self,
        request: RequestCode,
        payload: &[u8],
        response_offset: u8,
        options: TransceiveOptions,
    ) -> Result<Option<Packet>> {
        let command = request.code();
        let expected = command.wrapping_add(response_offset);
        self.send(&Packet::new(command, payload)?)?;

        for attempt in 1..=options.max_attempts {
            let mut matched = None;
            for packet in self.recv()? {
                match packet.command() {
                    DEVICE_ERROR => return Err(NiimbotError::DeviceRejected { command }),
                    DEVICE_UNSUPPORTED => {
                        return Err(NiimbotError::UnsupportedCommand { command });
                    }
                    code if code == expected => matched = Some(packet),
                    other => trace!("ignoring {:#04x} while waiting for {:#04x}", other, expected),
                }
            }

            if matched.is_some() {
                debug!("{:#04x} answered on attempt {}", command, attempt);
                return Ok(matched);
            }
            thread::sleep(options.poll_interval);
        }

        debug!(
            "{:#04x} unanswered after {} attempts",
            command, options.max_attempts
        );
        Ok(None)
    }

    /// Transceive with the request's table offset, requiring a reply.
    fn request(&mut self, request: RequestCode, payload: &[u8]) -> Result<Packet> {
        let offset = request.response_offset().unwrap_or(DEFAULT_RESPONSE_OFFSET);
        self.transceive(request, payload, offset)?
            .ok_or(NiimbotError::NoResponse {
                command: request.code(),
            })
    }

    /// Request whose reply is a single success flag.
    fn request_flag(&mut self, request: RequestCode, payload: &[u8]) -> Result<bool> {
        let reply = self.request(request, payload)?;
        reply.flag().ok_or_else(|| NiimbotError::MalformedResponse {
            command: request.code(),
            reason: "empty acknowledgement".to_string(),
        })
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Read one GET_INFO key. `Ok(None)` when the device did not answer.
    pub fn get_info(&mut self, key: InfoKey) -> Result<Option<InfoValue>> {
        let reply = self.transceive(RequestCode::GetInfo, &[key.code()], key.code())?;
        Ok(reply.map(|packet| responses::decode_info(key, packet.payload())))
    }

    /// Read the loaded label roll's RFID tag. `Ok(None)` when no tag was read.
    pub fn get_rfid(&mut self) -> Result<Option<RfidInfo>> {
        let reply = self.request(RequestCode::GetRfid, &ONE)?;
        responses::decode_rfid(reply.payload())
    }

    pub fn heartbeat(&mut self) -> Result<Heartbeat> {
        let reply = self.request(RequestCode::Heartbeat, &ONE)?;
        Ok(responses::decode_heartbeat(reply.payload()))
    }

    pub fn get_print_status(&mut self) -> Result<PrintStatus> {
        let reply = self.request(RequestCode::GetPrintStatus, &ONE)?;
        responses::decode_print_status(reply.payload())
    }

    // ========================================================================
    // SETTINGS
    // ========================================================================

    /// Select the label type (1 = gap, 2 = black mark, 3 = continuous).
    pub fn set_label_type(&mut self, label_type: u8) -> Result<bool> {
        if !LABEL_TYPES.contains(&label_type) {
            return Err(NiimbotError::InvalidArgument(format!(
                "Label type {} out of range {:?}",
                label_type, LABEL_TYPES
            )));
        }
        self.request_flag(RequestCode::SetLabelType, &[label_type])
    }

    pub fn set_label_density(&mut self, density: u8) -> Result<bool> {
        if !DENSITIES.contains(&density) {
            return Err(NiimbotError::InvalidArgument(format!(
                "Density {} out of range {:?}",
                density, DENSITIES
            )));
        }
        self.request_flag(RequestCode::SetLabelDensity, &[density])
    }

    /// Declare the page size in dots, height first.
    pub fn set_dimension(&mut self, height: u16, width: u16) -> Result<bool> {
        self.request_flag(RequestCode::SetDimension, &commands::dimension(height, width))
    }

    pub fn set_quantity(&mut self, quantity: u16) -> Result<bool> {
        self.request_flag(RequestCode::SetQuantity, &commands::quantity(quantity))
    }

    // ========================================================================
    // PRINT LIFECYCLE
    // ========================================================================

    pub fn start_print(&mut self) -> Result<bool> {
        self.request_flag(RequestCode::StartPrint, &ONE)
    }

    /// `Ok(false)` while the printer is still busy with the job.
    pub fn end_print(&mut self) -> Result<bool> {
        self.request_flag(RequestCode::EndPrint, &ONE)
    }

    pub fn start_page_print(&mut self) -> Result<bool> {
        self.request_flag(RequestCode::StartPagePrint, &ONE)
    }

    pub fn end_page_print(&mut self) -> Result<bool> {
        self.request_flag(RequestCode::EndPagePrint, &ONE)
    }

    pub fn allow_print_clear(&mut self) -> Result<bool> {
        self.request_flag(RequestCode::AllowPrintClear, &ONE)
    }

    /// Close the transport.
    pub fn close(&mut self) -> Result<()> {
        self.accumulator.clear();
        self.transport.close()
    }

    /// Give the transport back.
    pub fn into_inner(self) -> T {
        self.transport
    }
}

// ============================================================================
// TESTS
// ============================================================================
