// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

//! Interpretation of common event payloads.
//!
//! The engine itself treats payloads as opaque bytes; these helpers are
//! for consumers that want typed views of the well-known events.

use bitflags::bitflags;

use crate::codes::{ClientCode, CodeRegistry};
use crate::message::ServerMessage;

/// Outcome carried by a `LoginRes` (505) event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginResult {
    /// "0" - password rejected
    Failure,
    /// "1" - password accepted
    Success,
    /// "2" - no password sent in time
    TimedOut,
    /// "3" - panel is asking for a password
    Request,
}

impl LoginResult {
    pub fn from_data(data: &[u8]) -> Option<Self> {
        match data {
            b"0" => Some(Self::Failure),
            b"1" => Some(Self::Success),
            b"2" => Some(Self::TimedOut),
            b"3" => Some(Self::Request),
            _ => None,
        }
    }
}

/// Parse an all-digit ASCII field.
pub fn parse_decimal(field: &[u8]) -> Option<u16> {
    if field.is_empty() || field.len() > 4 || !field.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(
        field
            .iter()
            .fold(0u16, |acc, &d| acc * 10 + u16::from(d - b'0')),
    )
}

/// Numeric code acknowledged by an `Ack` (500) or rejected by a
/// `CommandError` (501): the payload is the 3-digit client code.
pub fn acknowledged_value(data: &[u8]) -> Option<u16> {
    if data.len() != 3 {
        return None;
    }
    parse_decimal(data)
}

/// Client code acknowledged by an `Ack` (500) message.
pub fn acknowledged_code(msg: &ServerMessage, registry: &CodeRegistry<ClientCode>) -> Option<ClientCode> {
    acknowledged_value(msg.data()).and_then(|v| registry.by_value(v))
}

/// Partition number leading a partition event payload ("1" to "8").
pub fn partition(data: &[u8]) -> Option<u8> {
    match data.first() {
        Some(&(d @ b'1'..=b'8')) => Some(d - b'0'),
        _ => None,
    }
}

/// Zone number of a zone event.
///
/// Zone open/restore (609/610) carry only the 3-digit zone; alarm, tamper
/// and fault events (601-606) carry the partition digit first.
pub fn zone(data: &[u8]) -> Option<u16> {
    match data.len() {
        3 => parse_decimal(data),
        4 => parse_decimal(&data[1..]),
        _ => None,
    }
}

/// Parse two hex digits into a byte.
fn parse_hex_byte(data: &[u8]) -> Option<u8> {
    let text = std::str::from_utf8(data).ok()?;
    if text.len() != 2 {
        return None;
    }
    u8::from_str_radix(text, 16).ok()
}

bitflags! {
    /// Keypad LEDs reported by `KeypadLedState` (510) and
    /// `KeypadLedFlashState` (511). Payload is two hex digits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeypadLedState: u8 {
        const READY     = 0x01;
        const ARMED     = 0x02;
        const MEMORY    = 0x04;
        const BYPASS    = 0x08;
        const TROUBLE   = 0x10;
        const PROGRAM   = 0x20;
        const FIRE      = 0x40;
        const BACKLIGHT = 0x80;
    }
}

impl KeypadLedState {
    pub fn from_data(data: &[u8]) -> Option<Self> {
        parse_hex_byte(data).map(Self::from_bits_truncate)
    }
}

bitflags! {
    /// Trouble conditions reported by `VerboseTroubleStatus` (849).
    /// Payload is two hex digits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SystemTroubleStatus: u8 {
        const SERVICE_REQUIRED          = 0x01;
        const AC_POWER_LOST             = 0x02;
        const TELEPHONE_LINE_FAULT      = 0x04;
        const FAILURE_TO_COMMUNICATE    = 0x08;
        const SENSOR_OR_ZONE_FAULT      = 0x10;
        const SENSOR_OR_ZONE_TAMPER     = 0x20;
        const SENSOR_OR_ZONE_LOW_BATTERY = 0x40;
        const LOSS_OF_TIME              = 0x80;
    }
}

impl SystemTroubleStatus {
    pub fn from_data(data: &[u8]) -> Option<Self> {
        parse_hex_byte(data).map(Self::from_bits_truncate)
    }
}

/// Target of a `TriggerPanicAlarm` (060) command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicTarget {
    Fire,
    Ambulance,
    Police,
}

impl PanicTarget {
    /// Command payload for this target.
    pub fn as_data(&self) -> &'static [u8] {
        match self {
            Self::Fire => b"1",
            Self::Ambulance => b"2",
            Self::Police => b"3",
        }
    }
}
