// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

use std::fmt;
use std::time::Duration;

/// Error numbers carried by the panel's `SystemError` (502) event.
///
/// The payload of a 502 event is a zero-padded 3-digit number identifying
/// what the TPI or the keybus rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemErrorCode {
    /// 001 - Receive Buffer Overrun
    ReceiveBufferOverrun,
    /// 002 - Receive Buffer Overflow
    ReceiveBufferOverflow,
    /// 003 - Transmit Buffer Overflow
    TransmitBufferOverflow,
    /// 010 - Keybus Transmit Buffer Overrun
    KeybusTransmitBufferOverrun,
    /// 011 - Keybus Transmit Time Timeout
    KeybusTransmitTimeTimeout,
    /// 012 - Keybus Transmit Mode Timeout
    KeybusTransmitModeTimeout,
    /// 013 - Keybus Transmit Keystring Timeout
    KeybusTransmitKeystringTimeout,
    /// 014 - Keybus Interface Not Functioning
    KeybusNotFunctioning,
    /// 015 - Keybus Busy
    KeybusBusy,
    /// 016 - Keybus Busy - Lockout
    KeybusBusyLockout,
    /// 017 - Keybus Busy - Installers Mode
    KeybusBusyInstallersMode,
    /// 018 - Keybus Busy - General Busy
    KeybusBusyGeneral,
    /// 020 - API Command Syntax Error
    CommandSyntax,
    /// 021 - API Command Partition Error
    CommandPartition,
    /// 022 - API Command Not Supported
    CommandNotSupported,
    /// 023 - API System Not Armed
    SystemNotArmed,
    /// 024 - API System Not Ready to Arm
    SystemNotReadyToArm,
    /// 025 - API Command Invalid Length
    CommandInvalidLength,
    /// 026 - API User Code not Required
    UserCodeNotRequired,
    /// 027 - API Invalid Characters in Command
    InvalidCharacters,
}

impl SystemErrorCode {
    /// Map an error number to its code.
    pub fn from_number(n: u16) -> Option<Self> {
        match n {
            1 => Some(Self::ReceiveBufferOverrun),
            2 => Some(Self::ReceiveBufferOverflow),
            3 => Some(Self::TransmitBufferOverflow),
            10 => Some(Self::KeybusTransmitBufferOverrun),
            11 => Some(Self::KeybusTransmitTimeTimeout),
            12 => Some(Self::KeybusTransmitModeTimeout),
            13 => Some(Self::KeybusTransmitKeystringTimeout),
            14 => Some(Self::KeybusNotFunctioning),
            15 => Some(Self::KeybusBusy),
            16 => Some(Self::KeybusBusyLockout),
            17 => Some(Self::KeybusBusyInstallersMode),
            18 => Some(Self::KeybusBusyGeneral),
            20 => Some(Self::CommandSyntax),
            21 => Some(Self::CommandPartition),
            22 => Some(Self::CommandNotSupported),
            23 => Some(Self::SystemNotArmed),
            24 => Some(Self::SystemNotReadyToArm),
            25 => Some(Self::CommandInvalidLength),
            26 => Some(Self::UserCodeNotRequired),
            27 => Some(Self::InvalidCharacters),
            _ => None,
        }
    }

    /// Parse the ASCII payload of a 502 event (e.g. `b"024"`).
    pub fn from_data(data: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(data).ok()?;
        text.trim().parse::<u16>().ok().and_then(Self::from_number)
    }

    /// The numeric value as sent by the panel.
    pub fn number(&self) -> u16 {
        match self {
            Self::ReceiveBufferOverrun => 1,
            Self::ReceiveBufferOverflow => 2,
            Self::TransmitBufferOverflow => 3,
            Self::KeybusTransmitBufferOverrun => 10,
            Self::KeybusTransmitTimeTimeout => 11,
            Self::KeybusTransmitModeTimeout => 12,
            Self::KeybusTransmitKeystringTimeout => 13,
            Self::KeybusNotFunctioning => 14,
            Self::KeybusBusy => 15,
            Self::KeybusBusyLockout => 16,
            Self::KeybusBusyInstallersMode => 17,
            Self::KeybusBusyGeneral => 18,
            Self::CommandSyntax => 20,
            Self::CommandPartition => 21,
            Self::CommandNotSupported => 22,
            Self::SystemNotArmed => 23,
            Self::SystemNotReadyToArm => 24,
            Self::CommandInvalidLength => 25,
            Self::UserCodeNotRequired => 26,
            Self::InvalidCharacters => 27,
        }
    }

    /// Human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ReceiveBufferOverrun => "Receive Buffer Overrun",
            Self::ReceiveBufferOverflow => "Receive Buffer Overflow",
            Self::TransmitBufferOverflow => "Transmit Buffer Overflow",
            Self::KeybusTransmitBufferOverrun => "Keybus Transmit Buffer Overrun",
            Self::KeybusTransmitTimeTimeout => "Keybus Transmit Time Timeout",
            Self::KeybusTransmitModeTimeout => "Keybus Transmit Mode Timeout",
            Self::KeybusTransmitKeystringTimeout => "Keybus Transmit Keystring Timeout",
            Self::KeybusNotFunctioning => "Keybus Interface Not Functioning",
            Self::KeybusBusy => "Keybus Busy",
            Self::KeybusBusyLockout => "Keybus Busy - Lockout",
            Self::KeybusBusyInstallersMode => "Keybus Busy - Installers Mode",
            Self::KeybusBusyGeneral => "Keybus Busy - General Busy",
            Self::CommandSyntax => "API Command Syntax Error",
            Self::CommandPartition => "API Command Partition Error",
            Self::CommandNotSupported => "API Command Not Supported",
            Self::SystemNotArmed => "API System Not Armed",
            Self::SystemNotReadyToArm => "API System Not Ready to Arm",
            Self::CommandInvalidLength => "API Command Invalid Length",
            Self::UserCodeNotRequired => "API User Code not Required",
            Self::InvalidCharacters => "API Invalid Characters in Command",
        }
    }
}

impl fmt::Display for SystemErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}: {}", self.number(), self.description())
    }
}

/// Why an inbound frame could not be turned into a message.
///
/// These never abort the message pump: the offending frame is logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown panel code {value:03}")]
    UnknownCode { value: u16 },

    #[error("checksum mismatch (computed {computed}, received {received})")]
    ChecksumMismatch { computed: String, received: String },

    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },
}

/// Why an outbound command could not be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("code {value} does not fit the 3-digit code field")]
    CodeOutOfRange { value: u16 },

    #[error("command data contains the CR LF frame delimiter")]
    DelimiterInData,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame exceeds {max} bytes without a delimiter ({len} buffered)")]
    Oversized { len: usize, max: usize },
}

/// Code table construction failures. These are configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{table} table: duplicate name {name}")]
    DuplicateName { table: &'static str, name: &'static str },

    #[error("{table} table: value {value:03} used by both {first} and {second}")]
    DuplicateValue {
        table: &'static str,
        value: u16,
        first: &'static str,
        second: &'static str,
    },

    #[error("{table} table: {name} has value {value}, codes are at most 999")]
    ValueOutOfRange {
        table: &'static str,
        name: &'static str,
        value: u16,
    },
}

/// All errors that can occur in the TPI client.
#[derive(Debug, thiserror::Error)]
pub enum TpiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("Code registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Unknown code name: {name}")]
    UnknownCodeName { name: String },

    #[error("Read retries exhausted after {attempts} transient failures")]
    ReadRetryExhausted { attempts: u32 },

    #[error("Connection fault: {reason}")]
    ConnectionFault { reason: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    #[error("Timed out after {after:?} waiting for {expected}")]
    Timeout { expected: String, after: Duration },

    #[error("Invalid connection state: {state}")]
    InvalidState { state: String },

    #[error("Invalid partition: {id} (must be 1-8)")]
    InvalidPartition { id: u8 },
}

impl TpiError {
    /// Whether the owner may answer this error with a reconnect.
    ///
    /// Authentication failures are fatal: a rejected password will not become
    /// valid by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TpiError::Io(_)
                | TpiError::ReadRetryExhausted { .. }
                | TpiError::ConnectionFault { .. }
                | TpiError::ConnectionClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, TpiError>;
