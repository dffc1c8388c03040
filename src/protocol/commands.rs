//! # NIIMBOT Command Codes
//!
//! Request codes and the payload builders for each command.
//!
//! ## Request / Response Correlation
//!
//! The printer answers a request with a frame whose type is the request code
//! plus a fixed offset:
//!
//! | Command | Request | Offset | Response |
//! |---------|---------|--------|----------|
//! | GET_INFO | 0x40 | info key | 0x40 + key |
//! | GET_RFID | 0x1A | 1 | 0x1B |
//! | HEARTBEAT | 0xDC | 1 | 0xDD |
//! | SET_LABEL_TYPE | 0x23 | 16 | 0x33 |
//! | SET_LABEL_DENSITY | 0x21 | 16 | 0x31 |
//! | START_PRINT | 0x01 | 1 | 0x02 |
//! | END_PRINT | 0xF3 | 1 | 0xF4 |
//! | START_PAGE_PRINT | 0x03 | 1 | 0x04 |
//! | END_PAGE_PRINT | 0xE3 | 1 | 0xE4 |
//! | ALLOW_PRINT_CLEAR | 0x20 | 16 | 0x30 |
//! | SET_DIMENSION | 0x13 | 1 | 0x14 |
//! | SET_QUANTITY | 0x15 | 1 | 0x16 |
//! | GET_PRINT_STATUS | 0xA3 | 16 | 0xB3 |
//! | PRINT_EMPTY_ROW | 0x84 | - | none |
//! | PRINT_BITMAP_ROW | 0x85 | - | none |
//!
//! Two codes only ever arrive from the device:
//!
//! - `0xDB`: the device rejected the request
//! - `0x00`: the device does not implement the request
//!
//! ## Byte Order
//!
//! Multi-byte integers are **big-endian**.

/// Device error response
pub const DEVICE_ERROR: u8 = 0xDB;

/// Device "unsupported command" response
pub const DEVICE_UNSUPPORTED: u8 = 0x00;

/// Default offset between request and response codes
pub const DEFAULT_RESPONSE_OFFSET: u8 = 1;

/// Request codes understood by the printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestCode {
    GetInfo = 0x40,
    GetRfid = 0x1A,
    Heartbeat = 0xDC,
    SetLabelType = 0x23,
    SetLabelDensity = 0x21,
    StartPrint = 0x01,
    EndPrint = 0xF3,
    StartPagePrint = 0x03,
    EndPagePrint = 0xE3,
    AllowPrintClear = 0x20,
    SetDimension = 0x13,
    SetQuantity = 0x15,
    GetPrintStatus = 0xA3,
    PrintEmptyRow = 0x84,
    PrintBitmapRow = 0x85,
}

impl RequestCode {
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Fixed response offset for this request.
    ///
    /// `None` for row commands, which are never acknowledged, and for
    /// `GetInfo`, whose offset is the queried [`InfoKey`].
    pub fn response_offset(self) -> Option<u8> {
        match self {
            Self::SetLabelType
            | Self::SetLabelDensity
            | Self::AllowPrintClear
            | Self::GetPrintStatus => Some(16),
            Self::GetRfid
            | Self::Heartbeat
            | Self::StartPrint
            | Self::EndPrint
            | Self::StartPagePrint
            | Self::EndPagePrint
            | Self::SetDimension
            | Self::SetQuantity => Some(DEFAULT_RESPONSE_OFFSET),
            Self::GetInfo | Self::PrintEmptyRow | Self::PrintBitmapRow => None,
        }
    }
}

impl TryFrom<u8> for RequestCode {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, u8> {
        Ok(match code {
            0x40 => Self::GetInfo,
            0x1A => Self::GetRfid,
            0xDC => Self::Heartbeat,
            0x23 => Self::SetLabelType,
            0x21 => Self::SetLabelDensity,
            0x01 => Self::StartPrint,
            0xF3 => Self::EndPrint,
            0x03 => Self::StartPagePrint,
            0xE3 => Self::EndPagePrint,
            0x20 => Self::AllowPrintClear,
            0x13 => Self::SetDimension,
            0x15 => Self::SetQuantity,
            0xA3 => Self::GetPrintStatus,
            0x84 => Self::PrintEmptyRow,
            0x85 => Self::PrintBitmapRow,
            other => return Err(other),
        })
    }
}

/// Keys accepted by GET_INFO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InfoKey {
    Density = 1,
    PrintSpeed = 2,
    LabelType = 3,
    LanguageType = 6,
    AutoShutdownTime = 7,
    DeviceType = 8,
    SoftVersion = 9,
    Battery = 10,
    DeviceSerial = 11,
    HardVersion = 12,
}

impl InfoKey {
    /// Every key, in wire order
    pub const ALL: [InfoKey; 10] = [
        Self::Density,
        Self::PrintSpeed,
        Self::LabelType,
        Self::LanguageType,
        Self::AutoShutdownTime,
        Self::DeviceType,
        Self::SoftVersion,
        Self::Battery,
        Self::DeviceSerial,
        Self::HardVersion,
    ];

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Snake-case name used in CLI and JSON output
    pub fn name(self) -> &'static str {
        match self {
            Self::Density => "density",
            Self::PrintSpeed => "print_speed",
            Self::LabelType => "label_type",
            Self::LanguageType => "language_type",
            Self::AutoShutdownTime => "auto_shutdown_time",
            Self::DeviceType => "device_type",
            Self::SoftVersion => "soft_version",
            Self::Battery => "battery",
            Self::DeviceSerial => "device_serial",
            Self::HardVersion => "hard_version",
        }
    }
}

// ============================================================================
// PAYLOAD BUILDERS
// ============================================================================

/// Single-byte "go" payload used by most parameterless requests
pub const ONE: [u8; 1] = [0x01];

/// # Set Dimension (0x13)
///
/// Two big-endian u16 fields, **height first**, then width:
///
/// ```
/// use niimbot::protocol::commands::dimension;
///
/// assert_eq!(dimension(240, 96), [0x00, 0xF0, 0x00, 0x60]);
/// ```
pub fn dimension(height: u16, width: u16) -> [u8; 4] {
    let h = height.to_be_bytes();
    let w = width.to_be_bytes();
    [h[0], h[1], w[0], w[1]]
}

/// # Set Quantity (0x15)
///
/// One big-endian u16 copy count.
#[inline]
pub fn quantity(n: u16) -> [u8; 2] {
    n.to_be_bytes()
}

/// # Print Empty Row (0x84)
///
/// Row index (u16 BE) followed by a repeat count.
pub fn empty_row(row: u16, repeat: u8) -> Vec<u8> {
    let mut payload = Vec::with_capacity(3);
    payload.extend_from_slice(&row.to_be_bytes());
    payload.push(repeat);
    payload
}

/// # Print Bitmap Row (0x85)
///
/// ```text
/// ┌──────────┬───────────────┬────────┬─────────────┐
/// │ row u16  │ 0x00 0x00 0x00│ repeat │ packed bits │
/// └──────────┴───────────────┴────────┴─────────────┘
/// ```
///
/// The three reserved bytes are pixel counts on some firmware; zeros are
/// always accepted.
pub fn bitmap_row(row: u16, repeat: u8, bits: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(6 + bits.len());
    payload.extend_from_slice(&row.to_be_bytes());
    payload.extend_from_slice(&[0, 0, 0]);
    payload.push(repeat);
    payload.extend_from_slice(bits);
    payload
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_codes() {
        assert_eq!(RequestCode::GetInfo.code(), 0x40);
        assert_eq!(RequestCode::Heartbeat.code(), 0xDC);
        assert_eq!(RequestCode::EndPrint.code(), 0xF3);
        assert_eq!(RequestCode::PrintBitmapRow.code(), 0x85);
    }

    #[test]
    fn test_response_offsets() {
        assert_eq!(RequestCode::SetLabelDensity.response_offset(), Some(16));
        assert_eq!(RequestCode::GetPrintStatus.response_offset(), Some(16));
        assert_eq!(RequestCode::StartPrint.response_offset(), Some(1));
        assert_eq!(RequestCode::GetInfo.response_offset(), None);
        assert_eq!(RequestCode::PrintEmptyRow.response_offset(), None);
    }

    #[test]
    fn test_request_code_from_byte() {
        assert_eq!(RequestCode::try_from(0x13), Ok(RequestCode::SetDimension));
        assert_eq!(RequestCode::try_from(0xDB), Err(0xDB));
        let round_trip = RequestCode::try_from(RequestCode::GetRfid.code());
        assert_eq!(round_trip, Ok(RequestCode::GetRfid));
    }

    #[test]
    fn test_info_keys_unique() {
        let mut codes: Vec<u8> = InfoKey::ALL.iter().map(|k| k.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), InfoKey::ALL.len());
    }

    #[test]
    fn test_dimension_height_first() {
        assert_eq!(dimension(0x0102, 0x0304), [0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_quantity() {
        assert_eq!(quantity(1), [0x00, 0x01]);
    }

    #[test]
    fn test_empty_row() {
        assert_eq!(empty_row(0x0203, 1), vec![0x02, 0x03, 0x01]);
    }

    #[test]
    fn test_bitmap_row() {
        assert_eq!(
            bitmap_row(7, 1, &[0xAA, 0x55]),
            vec![0x00, 0x07, 0x00, 0x00, 0x00, 0x01, 0xAA, 0x55]
        );
    }
}
