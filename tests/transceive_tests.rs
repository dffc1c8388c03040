//! # Transceive Tests
//!
//! Request/response correlation over scripted transports: interleaved and
//! split frames, device error codes, silence and read timeouts.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use niimbot::printer::{PrinterClient, TransceiveOptions};
use niimbot::protocol::packet::{self, Packet};
use niimbot::protocol::responses::{Heartbeat, PrintStatus};
use niimbot::protocol::{InfoKey, RequestCode};
use niimbot::transport::{MockTransport, Transport};
use niimbot::NiimbotError;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn frame(command: u8, payload: &[u8]) -> Vec<u8> {
    packet::encode(command, payload).unwrap()
}

fn options(max_attempts: u32, poll_ms: u64) -> TransceiveOptions {
    TransceiveOptions {
        max_attempts,
        poll_interval: Duration::from_millis(poll_ms),
    }
}

/// Transport whose reads always time out
struct TimeoutTransport {
    reads: usize,
}

impl Transport for TimeoutTransport {
    fn read(&mut self, _max_len: usize) -> niimbot::error::Result<Vec<u8>> {
        self.reads += 1;
        Err(NiimbotError::Timeout("quiet".to_string()))
    }

    fn write(&mut self, data: &[u8]) -> niimbot::error::Result<usize> {
        Ok(data.len())
    }

    fn close(&mut self) -> niimbot::error::Result<()> {
        Ok(())
    }
}

/// Transport that serves a fixed list of reads, then silence
struct ChunkedTransport {
    reads: VecDeque<Vec<u8>>,
}

impl Transport for ChunkedTransport {
    fn read(&mut self, _max_len: usize) -> niimbot::error::Result<Vec<u8>> {
        Ok(self.reads.pop_front().unwrap_or_default())
    }

    fn write(&mut self, data: &[u8]) -> niimbot::error::Result<usize> {
        Ok(data.len())
    }

    fn close(&mut self) -> niimbot::error::Result<()> {
        Ok(())
    }
}

// ============================================================================
// CORRELATION
// ============================================================================

#[test]
fn test_interleaved_frames_pick_expected_code() {
    let mut mock = MockTransport::new();
    // Stale heartbeat reply, then the answer we want
    mock.push_inbound(&frame(0xDD, &[0; 9]));
    mock.push_inbound(&frame(0x14, &[1]));
    let mut client = PrinterClient::with_options(mock, options(3, 1));

    let reply = client
        .transceive(RequestCode::SetDimension, &[0, 4, 0, 8], 1)
        .unwrap()
        .unwrap();
    assert_eq!(reply.command(), 0x14);
    assert_eq!(reply.payload(), &[1]);
    assert_eq!(client.pending(), 0);
}

#[test]
fn test_last_match_in_round_wins() {
    let mut mock = MockTransport::new();
    mock.push_inbound(&frame(0x02, &[0]));
    mock.push_inbound(&frame(0x02, &[1]));
    let mut client = PrinterClient::with_options(mock, options(3, 1));

    let reply = client.transceive(RequestCode::StartPrint, &[1], 1).unwrap();
    assert_eq!(reply.and_then(|p| p.flag()), Some(true));
}

#[test]
fn test_frame_split_across_reads() {
    let reply = frame(0xB3, &[0x00, 0x02, 0x40, 0x50]);
    let transport = ChunkedTransport {
        reads: vec![reply[..3].to_vec(), Vec::new(), reply[3..].to_vec()].into(),
    };
    let mut client = PrinterClient::with_options(transport, options(5, 1));

    assert_eq!(
        client.get_print_status().unwrap(),
        PrintStatus {
            page: 2,
            progress1: 0x40,
            progress2: 0x50,
        }
    );
}

// ============================================================================
// DEVICE ERRORS
// ============================================================================

#[test]
fn test_device_error_code_rejects() {
    let mock = MockTransport::replying(|_req: &Packet| Packet::new(0xDB, vec![0]).ok());
    let mut client = PrinterClient::with_options(mock, options(3, 1));

    match client.set_dimension(240, 96) {
        Err(NiimbotError::DeviceRejected { command }) => assert_eq!(command, 0x13),
        other => panic!("expected DeviceRejected, got {:?}", other),
    }
}

#[test]
fn test_unsupported_code() {
    let mock = MockTransport::replying(|_req: &Packet| Packet::new(0x00, vec![]).ok());
    let mut client = PrinterClient::with_options(mock, options(3, 1));

    match client.heartbeat() {
        Err(NiimbotError::UnsupportedCommand { command }) => assert_eq!(command, 0xDC),
        other => panic!("expected UnsupportedCommand, got {:?}", other),
    }
}

#[test]
fn test_error_message_names_command() {
    let mock = MockTransport::replying(|_req: &Packet| Packet::new(0xDB, vec![0]).ok());
    let mut client = PrinterClient::with_options(mock, options(1, 1));
    let err = client.end_print().unwrap_err();
    assert!(err.to_string().contains("0xf3"), "{}", err);
}

// ============================================================================
// SILENCE
// ============================================================================

#[test]
fn test_silent_device_returns_none_after_attempts() {
    let mut client = PrinterClient::with_options(MockTransport::new(), options(3, 10));

    let start = Instant::now();
    let reply = client.transceive(RequestCode::StartPrint, &[1], 1).unwrap();
    assert!(reply.is_none());
    // Three rounds, each followed by a poll sleep
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn test_read_timeouts_count_as_empty_rounds() {
    let mut client =
        PrinterClient::with_options(TimeoutTransport { reads: 0 }, options(4, 1));

    let reply = client.transceive(RequestCode::Heartbeat, &[1], 1).unwrap();
    assert!(reply.is_none());
    assert_eq!(client.transport().reads, 4);
}

#[test]
fn test_closed_transport_propagates() {
    let mut mock = MockTransport::new();
    mock.close().unwrap();
    let mut client = PrinterClient::with_options(mock, options(3, 1));
    assert!(matches!(
        client.transceive(RequestCode::StartPrint, &[1], 1),
        Err(NiimbotError::Closed)
    ));
}

// ============================================================================
// QUERIES
// ============================================================================

#[test]
fn test_info_over_mock_device() {
    let mock = MockTransport::replying(|req: &Packet| {
        let key = req.payload()[0];
        let data = match key {
            11 => vec![0xA1, 0xB2, 0xC3],
            12 => vec![0x00, 0x64],
            _ => vec![0x00, 0x05],
        };
        Packet::new(req.command() + key, data).ok()
    });
    let mut client = PrinterClient::with_options(mock, options(3, 1));

    let serial = client.get_info(InfoKey::DeviceSerial).unwrap().unwrap();
    assert_eq!(serial.to_string(), "a1b2c3");
    let hard = client.get_info(InfoKey::HardVersion).unwrap().unwrap();
    assert_eq!(hard.to_string(), "1.00");
    let density = client.get_info(InfoKey::Density).unwrap().unwrap();
    assert_eq!(density.to_string(), "5");
}

#[test]
fn test_heartbeat_over_mock_device() {
    let mock = MockTransport::replying(|req: &Packet| {
        let mut data = vec![0u8; 13];
        data[9..13].copy_from_slice(&[1, 4, 0, 1]);
        Packet::new(req.command() + 1, data).ok()
    });
    let mut client = PrinterClient::with_options(mock, options(3, 1));

    assert_eq!(
        client.heartbeat().unwrap(),
        Heartbeat {
            closing_state: Some(1),
            power_level: Some(4),
            paper_state: Some(0),
            rfid_read_state: Some(1),
        }
    );
}

#[test]
fn test_rfid_without_tag() {
    let mock = MockTransport::replying(|req: &Packet| Packet::new(req.command() + 1, vec![0]).ok());
    let mut client = PrinterClient::with_options(mock, options(3, 1));
    assert_eq!(client.get_rfid().unwrap(), None);
}
