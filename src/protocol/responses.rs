//! # Response Decoding
//!
//! Pure functions turning response payloads into typed records. Each query
//! has its own fixed layout; the dispatch is table-driven with an explicit
//! fallback for layouts the firmware may add later.
//!
//! | Query | Layout |
//! |-------|--------|
//! | GET_INFO serial | raw bytes, rendered as hex |
//! | GET_INFO versions | big-endian integer / 100 |
//! | GET_INFO other keys | big-endian unsigned integer |
//! | GET_RFID | uuid(8) blen barcode slen serial total(2) used(2) type(1) |
//! | HEARTBEAT | depends on payload length, see [`decode_heartbeat`] |
//! | GET_PRINT_STATUS | page(2) progress1(1) progress2(1) |

use serde::Serialize;

use super::commands::{InfoKey, RequestCode};
use crate::error::{NiimbotError, Result};

// ============================================================================
// GET_INFO
// ============================================================================

/// Decoded GET_INFO value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InfoValue {
    /// Plain counter or enumeration value
    Number(u64),
    /// Firmware/hardware version (`raw / 100`)
    Version(f64),
    /// Serial number, hex-encoded
    Serial(String),
}

impl std::fmt::Display for InfoValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Version(v) => write!(f, "{:.2}", v),
            Self::Serial(s) => f.write_str(s),
        }
    }
}

/// Big-endian unsigned integer of up to 8 bytes.
///
/// Longer payloads keep their low 8 bytes.
pub fn be_uint(data: &[u8]) -> u64 {
    data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Decode a GET_INFO payload for `key`.
pub fn decode_info(key: InfoKey, data: &[u8]) -> InfoValue {
    match key {
        InfoKey::DeviceSerial => InfoValue::Serial(hex::encode(data)),
        InfoKey::SoftVersion | InfoKey::HardVersion => {
            InfoValue::Version(be_uint(data) as f64 / 100.0)
        }
        InfoKey::Density
        | InfoKey::PrintSpeed
        | InfoKey::LabelType
        | InfoKey::LanguageType
        | InfoKey::AutoShutdownTime
        | InfoKey::DeviceType
        | InfoKey::Battery => InfoValue::Number(be_uint(data)),
    }
}

// ============================================================================
// GET_RFID
// ============================================================================

/// RFID tag data of the loaded label roll
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RfidInfo {
    pub uuid: String,
    pub barcode: String,
    pub serial: String,
    pub used_len: u16,
    pub total_len: u16,
    #[serde(rename = "type")]
    pub label_type: u8,
}

/// Bounds-checked cursor over a response payload
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    command: u8,
}

impl<'a> Reader<'a> {
    fn new(command: RequestCode, data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            command: command.code(),
        }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(NiimbotError::MalformedResponse {
                command: self.command,
                reason: format!(
                    "{} needs {} bytes at offset {}, payload is {} bytes",
                    what,
                    n,
                    self.pos,
                    self.data.len()
                ),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Length-prefixed string
    fn string(&mut self, what: &str) -> Result<String> {
        let len = self.u8(what)? as usize;
        let bytes = self.take(len, what)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Decode a GET_RFID payload.
///
/// Returns `Ok(None)` when no tag was read (`payload[0] == 0`).
pub fn decode_rfid(data: &[u8]) -> Result<Option<RfidInfo>> {
    if data.first().copied().unwrap_or(0) == 0 {
        return Ok(None);
    }

    let mut r = Reader::new(RequestCode::GetRfid, data);
    let uuid = hex::encode(r.take(8, "uuid")?);
    let barcode = r.string("barcode")?;
    let serial = r.string("serial")?;
    let total_len = r.u16("total_len")?;
    let used_len = r.u16("used_len")?;
    let label_type = r.u8("type")?;

    Ok(Some(RfidInfo {
        uuid,
        barcode,
        serial,
        used_len,
        total_len,
        label_type,
    }))
}

// ============================================================================
// HEARTBEAT
// ============================================================================

/// Printer state reported by HEARTBEAT.
///
/// Which fields are present depends on the firmware's payload layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Heartbeat {
    pub closing_state: Option<u8>,
    pub power_level: Option<u8>,
    pub paper_state: Option<u8>,
    pub rfid_read_state: Option<u8>,
}

/// Byte offsets of each heartbeat field for one payload length
#[derive(Debug, Clone, Copy)]
struct HeartbeatLayout {
    closing_state: Option<usize>,
    power_level: Option<usize>,
    paper_state: Option<usize>,
    rfid_read_state: Option<usize>,
}

/// Known heartbeat layouts keyed by payload length.
///
/// The 10-byte layout reads closing and RFID state from the same byte.
const HEARTBEAT_LAYOUTS: [(usize, HeartbeatLayout); 5] = [
    (
        9,
        HeartbeatLayout {
            closing_state: Some(8),
            power_level: None,
            paper_state: None,
            rfid_read_state: None,
        },
    ),
    (
        10,
        HeartbeatLayout {
            closing_state: Some(8),
            power_level: Some(9),
            paper_state: None,
            rfid_read_state: Some(8),
        },
    ),
    (
        13,
        HeartbeatLayout {
            closing_state: Some(9),
            power_level: Some(10),
            paper_state: Some(11),
            rfid_read_state: Some(12),
        },
    ),
    (
        19,
        HeartbeatLayout {
            closing_state: Some(15),
            power_level: Some(16),
            paper_state: Some(17),
            rfid_read_state: Some(18),
        },
    ),
    (
        20,
        HeartbeatLayout {
            closing_state: None,
            power_level: None,
            paper_state: Some(18),
            rfid_read_state: Some(19),
        },
    ),
];

/// Decode a HEARTBEAT payload.
///
/// Unknown lengths yield a record with every field unset.
pub fn decode_heartbeat(data: &[u8]) -> Heartbeat {
    let Some((_, layout)) = HEARTBEAT_LAYOUTS
        .iter()
        .find(|(len, _)| *len == data.len())
    else {
        return Heartbeat::default();
    };

    let at = |idx: Option<usize>| idx.map(|i| data[i]);
    Heartbeat {
        closing_state: at(layout.closing_state),
        power_level: at(layout.power_level),
        paper_state: at(layout.paper_state),
        rfid_read_state: at(layout.rfid_read_state),
    }
}

// ============================================================================
// GET_PRINT_STATUS
// ============================================================================

/// Progress of the current print job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrintStatus {
    pub page: u16,
    pub progress1: u8,
    pub progress2: u8,
}

/// Decode a GET_PRINT_STATUS payload.
pub fn decode_print_status(data: &[u8]) -> Result<PrintStatus> {
    let mut r = Reader::new(RequestCode::GetPrintStatus, data);
    Ok(PrintStatus {
        page: r.u16("page")?,
        progress1: r.u8("progress1")?,
        progress2: r.u8("progress2")?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_serial_is_hex() {
        let value = decode_info(InfoKey::DeviceSerial, &[0xDE, 0xAD, 0x01]);
        assert_eq!(value, InfoValue::Serial("dead01".to_string()));
    }

    #[test]
    fn test_info_version_divided_by_100() {
        let value = decode_info(InfoKey::SoftVersion, &[0x01, 0x05]);
        assert_eq!(value, InfoValue::Version(2.61));
        assert_eq!(value.to_string(), "2.61");
    }

    #[test]
    fn test_info_number() {
        assert_eq!(decode_info(InfoKey::Battery, &[4]), InfoValue::Number(4));
        assert_eq!(
            decode_info(InfoKey::DeviceType, &[0x02, 0x00]),
            InfoValue::Number(512)
        );
        assert_eq!(decode_info(InfoKey::Density, &[]), InfoValue::Number(0));
    }

    #[test]
    fn test_rfid_no_tag() {
        assert_eq!(decode_rfid(&[0x00]).unwrap(), None);
        assert_eq!(decode_rfid(&[]).unwrap(), None);
    }

    #[test]
    fn test_rfid_full() {
        let mut data = vec![0x88, 1, 2, 3, 4, 5, 6, 7];
        data.push(3);
        data.extend(b"123");
        data.push(2);
        data.extend(b"SN");
        data.extend(&[0x00, 0xC8, 0x00, 0x0A, 0x01]);

        let info = decode_rfid(&data).unwrap().unwrap();
        assert_eq!(info.uuid, "8801020304050607");
        assert_eq!(info.barcode, "123");
        assert_eq!(info.serial, "SN");
        assert_eq!(info.total_len, 200);
        assert_eq!(info.used_len, 10);
        assert_eq!(info.label_type, 1);
    }

    #[test]
    fn test_rfid_truncated() {
        let data = vec![0x88, 1, 2, 3, 4, 5, 6, 7, 10, b'x'];
        let err = decode_rfid(&data).unwrap_err();
        assert!(matches!(
            err,
            NiimbotError::MalformedResponse { command: 0x1A, .. }
        ));
    }

    #[test]
    fn test_heartbeat_len_9() {
        let mut data = vec![0u8; 9];
        data[8] = 1;
        let hb = decode_heartbeat(&data);
        assert_eq!(hb.closing_state, Some(1));
        assert_eq!(hb.power_level, None);
        assert_eq!(hb.paper_state, None);
        assert_eq!(hb.rfid_read_state, None);
    }

    #[test]
    fn test_heartbeat_len_10_shares_byte() {
        let mut data = vec![0u8; 10];
        data[8] = 7;
        data[9] = 3;
        let hb = decode_heartbeat(&data);
        assert_eq!(hb.closing_state, Some(7));
        assert_eq!(hb.rfid_read_state, Some(7));
        assert_eq!(hb.power_level, Some(3));
        assert_eq!(hb.paper_state, None);
    }

    #[test]
    fn test_heartbeat_len_13() {
        let data: Vec<u8> = (0..13).collect();
        let hb = decode_heartbeat(&data);
        assert_eq!(
            hb,
            Heartbeat {
                closing_state: Some(9),
                power_level: Some(10),
                paper_state: Some(11),
                rfid_read_state: Some(12),
            }
        );
    }

    #[test]
    fn test_heartbeat_len_19() {
        let data: Vec<u8> = (0..19).collect();
        let hb = decode_heartbeat(&data);
        assert_eq!(hb.closing_state, Some(15));
        assert_eq!(hb.rfid_read_state, Some(18));
    }

    #[test]
    fn test_heartbeat_len_20() {
        let data: Vec<u8> = (0..20).collect();
        let hb = decode_heartbeat(&data);
        assert_eq!(hb.closing_state, None);
        assert_eq!(hb.power_level, None);
        assert_eq!(hb.paper_state, Some(18));
        assert_eq!(hb.rfid_read_state, Some(19));
    }

    #[test]
    fn test_heartbeat_unknown_len() {
        for len in [0usize, 1, 8, 11, 12, 14, 21, 40] {
            assert_eq!(decode_heartbeat(&vec![0xFF; len]), Heartbeat::default());
        }
    }

    #[test]
    fn test_print_status() {
        let status = decode_print_status(&[0x00, 0x01, 0x64, 0x32]).unwrap();
        assert_eq!(status.page, 1);
        assert_eq!(status.progress1, 100);
        assert_eq!(status.progress2, 50);
        assert!(decode_print_status(&[0x00]).is_err());
    }
}
