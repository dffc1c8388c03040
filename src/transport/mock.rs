//! # Mock Transport
//!
//! In-memory transport for tests. Writes are recorded, and an optional
//! responder turns each written frame into the device's reply, which is then
//! served by later reads.
//!
//! ```
//! use niimbot::protocol::Packet;
//! use niimbot::transport::{MockTransport, Transport};
//!
//! // Acknowledge every request with `request + 1` and payload [1]
//! let mut mock = MockTransport::replying(|req: &Packet| {
//!     Some(Packet::new(req.command() + 1, vec![1]).unwrap())
//! });
//!
//! mock.write(&Packet::new(0x01, vec![1]).unwrap().to_bytes())?;
//! let reply = mock.read(1024)?;
//! assert_eq!(reply[2], 0x02);
//! # Ok::<(), niimbot::NiimbotError>(())
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::Transport;
use crate::error::{NiimbotError, Result};
use crate::protocol::packet::{self, Packet};

type Responder = Box<dyn FnMut(&Packet) -> Option<Packet> + Send>;

/// Shared log of every `write` call, in order
pub type WriteLog = Arc<Mutex<Vec<Vec<u8>>>>;

/// Scripted in-memory transport
pub struct MockTransport {
    inbound: VecDeque<u8>,
    writes: WriteLog,
    responder: Option<Responder>,
    closed: bool,
}

impl MockTransport {
    /// A silent device: reads always come back empty.
    pub fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            writes: Arc::new(Mutex::new(Vec::new())),
            responder: None,
            closed: false,
        }
    }

    /// A device that answers each written frame through `responder`.
    ///
    /// Batched writes are split into frames and each one is offered in order.
    pub fn replying<F>(responder: F) -> Self
    where
        F: FnMut(&Packet) -> Option<Packet> + Send + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    /// Queue raw bytes to be returned by upcoming reads.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }

    /// Handle to the write log, usable after the mock moves into a client.
    pub fn write_log(&self) -> WriteLog {
        Arc::clone(&self.writes)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        if self.closed {
            return Err(NiimbotError::Closed);
        }
        let n = max_len.min(self.inbound.len());
        Ok(self.inbound.drain(..n).collect())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(NiimbotError::Closed);
        }
        if let Ok(mut log) = self.writes.lock() {
            log.push(data.to_vec());
        }

        if let Some(responder) = self.responder.as_mut() {
            let mut rest = data;
            while let Some((request, consumed)) = packet::try_decode(rest)? {
                rest = &rest[consumed..];
                if let Some(reply) = responder(&request) {
                    self.inbound.extend(reply.to_bytes());
                }
            }
        }

        Ok(data.len())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_read_is_empty() {
        let mut mock = MockTransport::new();
        assert!(mock.read(1024).unwrap().is_empty());
    }

    #[test]
    fn test_partial_reads() {
        let mut mock = MockTransport::new();
        mock.push_inbound(&[1, 2, 3, 4, 5]);
        assert_eq!(mock.read(2).unwrap(), vec![1, 2]);
        assert_eq!(mock.read(10).unwrap(), vec![3, 4, 5]);
    }

    #[test]
    fn test_batched_write_answers_each_frame() {
        let mut mock = MockTransport::replying(|req| Packet::new(req.command() + 1, vec![1]).ok());
        let mut batch = Vec::new();
        Packet::new(0x01, vec![1]).unwrap().write_to(&mut batch);
        Packet::new(0x03, vec![1]).unwrap().write_to(&mut batch);
        mock.write(&batch).unwrap();

        let inbound = mock.read(1024).unwrap();
        let (first, used) = packet::try_decode(&inbound).unwrap().unwrap();
        let (second, _) = packet::try_decode(&inbound[used..]).unwrap().unwrap();
        assert_eq!(first.command(), 0x02);
        assert_eq!(second.command(), 0x04);
        assert_eq!(mock.write_log().lock().unwrap().len(), 1);
    }

    #[test]
    fn test_closed_rejects_io() {
        let mut mock = MockTransport::new();
        mock.close().unwrap();
        mock.close().unwrap();
        assert!(matches!(mock.read(1), Err(NiimbotError::Closed)));
        assert!(matches!(mock.write(&[0]), Err(NiimbotError::Closed)));
    }
}
