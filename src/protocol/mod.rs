//! # NIIMBOT Protocol Implementation
//!
//! This module provides the wire-level pieces of the NIIMBOT label printer
//! protocol. Everything here is pure: no I/O, no sleeping.
//!
//! ## Module Structure
//!
//! - [`packet`]: Frame encoding/decoding and checksum
//! - [`commands`]: Request codes, info keys and payload builders
//! - [`responses`]: Typed decoding of response payloads
//!
//! ## Usage Example
//!
//! ```
//! use niimbot::protocol::{commands::{self, RequestCode}, packet::Packet};
//!
//! // SET_DIMENSION for a 240x96 label
//! let pkt = Packet::new(RequestCode::SetDimension.code(), commands::dimension(240, 96)).unwrap();
//! let bytes = pkt.to_bytes();
//! assert_eq!(bytes.len(), 4 + 7);
//! ```

pub mod commands;
pub mod packet;
pub mod responses;

pub use commands::{InfoKey, RequestCode};
pub use packet::Packet;
