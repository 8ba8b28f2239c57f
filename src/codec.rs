// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

//! TPI wire format.
//!
//! Frame format: `<code:3 decimal digits><data><checksum:2 hex digits>\r\n`
//!
//! The checksum is the sum of every byte of code + data, modulo 256,
//! rendered as two lowercase hex digits. Received checksums are compared
//! case-insensitively.

use crate::codes::{Code, CodeRegistry, MAX_CODE_VALUE, ServerCode};
use crate::error::{DecodeError, EncodeError};
use crate::message::ServerMessage;

/// Frame delimiter.
pub const DELIMITER: &[u8; 2] = b"\r\n";

const CODE_LEN: usize = 3;
const CHECKSUM_LEN: usize = 2;

/// Shortest valid frame (delimiter excluded): code plus checksum, no data.
pub const MIN_FRAME_LEN: usize = CODE_LEN + CHECKSUM_LEN;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Sum of all bytes modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Two lowercase hex digits for a checksum byte.
pub fn checksum_hex(sum: u8) -> [u8; 2] {
    [HEX[(sum >> 4) as usize], HEX[(sum & 0x0f) as usize]]
}

/// A frame that passed shape and checksum validation but whose code has not
/// been looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub code: u16,
    pub data: Vec<u8>,
}

/// Encode a command for the wire, delimiter included.
pub fn encode<C: Code>(code: C, data: &[u8]) -> Result<Vec<u8>, EncodeError> {
    encode_raw(code.value(), data)
}

/// Encode a numeric code and payload, delimiter included.
pub fn encode_raw(value: u16, data: &[u8]) -> Result<Vec<u8>, EncodeError> {
    if value > MAX_CODE_VALUE {
        return Err(EncodeError::CodeOutOfRange { value });
    }
    if data.windows(DELIMITER.len()).any(|w| w == DELIMITER) {
        return Err(EncodeError::DelimiterInData);
    }

    let mut frame = Vec::with_capacity(CODE_LEN + data.len() + CHECKSUM_LEN + DELIMITER.len());
    frame.extend_from_slice(format!("{value:03}").as_bytes());
    frame.extend_from_slice(data);
    let sum = checksum(&frame);
    frame.extend_from_slice(&checksum_hex(sum));
    frame.extend_from_slice(DELIMITER);
    Ok(frame)
}

/// Validate the shape and checksum of one frame (delimiter already stripped).
pub fn decode_raw(frame: &[u8]) -> Result<RawFrame, DecodeError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(DecodeError::MalformedFrame {
            reason: format!(
                "{} bytes is shorter than the {MIN_FRAME_LEN}-byte minimum",
                frame.len()
            ),
        });
    }

    let (body, received) = frame.split_at(frame.len() - CHECKSUM_LEN);
    let (code_field, data) = body.split_at(CODE_LEN);

    if !code_field.iter().all(u8::is_ascii_digit) {
        return Err(DecodeError::MalformedFrame {
            reason: format!(
                "code field {:?} is not 3 decimal digits",
                String::from_utf8_lossy(code_field)
            ),
        });
    }
    let code = code_field
        .iter()
        .fold(0u16, |acc, &d| acc * 10 + u16::from(d - b'0'));

    let computed = checksum_hex(checksum(body));
    if !computed.eq_ignore_ascii_case(received) {
        return Err(DecodeError::ChecksumMismatch {
            computed: String::from_utf8_lossy(&computed).into_owned(),
            received: String::from_utf8_lossy(received).into_owned(),
        });
    }

    Ok(RawFrame {
        code,
        data: data.to_vec(),
    })
}

/// Decode one frame into a server message.
pub fn decode(frame: &[u8], registry: &CodeRegistry<ServerCode>) -> Result<ServerMessage, DecodeError> {
    let raw = decode_raw(frame)?;
    let code = registry
        .by_value(raw.code)
        .ok_or(DecodeError::UnknownCode { value: raw.code })?;
    Ok(ServerMessage::new(code, raw.data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::ClientCode;

    fn registry() -> CodeRegistry<ServerCode> {
        CodeRegistry::new().unwrap()
    }

    #[test]
    fn test_encode_vectors() {
        assert_eq!(encode_raw(1, b"").unwrap(), b"00191\r\n");
        assert_eq!(encode_raw(5, b"abc").unwrap(), b"005abcbb\r\n");
        assert_eq!(encode(ClientCode::StatusReport, b"").unwrap(), b"00191\r\n");
    }

    #[test]
    fn test_checksum_wraps() {
        // 0xff + 0x02 wraps to 0x01
        assert_eq!(checksum(&[0xff, 0x02]), 0x01);
        assert_eq!(checksum(b""), 0);
        assert_eq!(&checksum_hex(0xbb), b"bb");
        assert_eq!(&checksum_hex(0x0a), b"0a");
    }

    #[test]
    fn test_encode_rejects_bad_input() {
        assert_eq!(
            encode_raw(1000, b""),
            Err(EncodeError::CodeOutOfRange { value: 1000 })
        );
        assert_eq!(encode_raw(71, b"1*\r\n9"), Err(EncodeError::DelimiterInData));
    }

    #[test]
    fn test_decode_raw_roundtrip_every_code() {
        for value in 0..=MAX_CODE_VALUE {
            for len in 0..=64usize {
                // printable ASCII, shifted per code so payloads differ
                let data: Vec<u8> = (0..len)
                    .map(|i| b' ' + ((usize::from(value) + i) % 95) as u8)
                    .collect();
                let frame = encode_raw(value, &data).unwrap();
                let raw = decode_raw(&frame[..frame.len() - 2]).unwrap();
                assert_eq!(raw.code, value, "len {len}");
                assert_eq!(raw.data, data, "code {value:03}");
            }
        }
    }

    #[test]
    fn test_decode_known_event() {
        let frame = encode_raw(609, b"012").unwrap();
        let msg = decode(&frame[..frame.len() - 2], &registry()).unwrap();
        assert_eq!(msg.code(), ServerCode::ZoneOpen);
        assert_eq!(msg.data(), b"012");
    }

    #[test]
    fn test_decode_uppercase_checksum() {
        // 005abc sums to 0xbb
        let msg = decode_raw(b"005abcBB").unwrap();
        assert_eq!(msg.code, 5);
        assert_eq!(msg.data, b"abc");
    }

    #[test]
    fn test_decode_unknown_code() {
        let frame = encode_raw(999, b"").unwrap();
        assert_eq!(
            decode(&frame[..frame.len() - 2], &registry()).unwrap_err(),
            DecodeError::UnknownCode { value: 999 }
        );
    }

    #[test]
    fn test_decode_too_short() {
        assert!(matches!(
            decode_raw(b"0019"),
            Err(DecodeError::MalformedFrame { .. })
        ));
        assert!(matches!(decode_raw(b""), Err(DecodeError::MalformedFrame { .. })));
    }

    #[test]
    fn test_decode_non_numeric_code() {
        assert!(matches!(
            decode_raw(b"5x0abc12"),
            Err(DecodeError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn test_flipped_checksum_bits_detected() {
        // Digits only: every single-bit flip must be caught
        let frame = b"00191";
        for pos in 3..5 {
            for bit in 0..8 {
                let mut corrupt = frame.to_vec();
                corrupt[pos] ^= 1 << bit;
                assert!(
                    matches!(decode_raw(&corrupt), Err(DecodeError::ChecksumMismatch { .. })),
                    "flip of bit {bit} at {pos} not detected"
                );
            }
        }
    }

    #[test]
    fn test_flipped_checksum_bits_detected_hex_letters() {
        // The ASCII case bit of a hex letter is the one flip that the
        // case-insensitive comparison accepts.
        let frame = b"005abcbb";
        for pos in 6..8 {
            for bit in (0..8).filter(|&b| b != 5) {
                let mut corrupt = frame.to_vec();
                corrupt[pos] ^= 1 << bit;
                assert!(
                    matches!(decode_raw(&corrupt), Err(DecodeError::ChecksumMismatch { .. })),
                    "flip of bit {bit} at {pos} not detected"
                );
            }
        }
    }

    #[test]
    fn test_flipped_data_detected() {
        let mut corrupt = b"005abcbb".to_vec();
        corrupt[4] = b'd';
        assert!(matches!(
            decode_raw(&corrupt),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }
}
