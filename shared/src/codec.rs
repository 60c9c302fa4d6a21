//! Tinkerforge TCP/IP packet codec
//!
//! Every packet exchanged with the Brick Daemon starts with an 8 byte header:
//! ```text
//! [ 4 bytes: UID (u32, little-endian) ]
//! [ 1 byte : total packet length, header included ]
//! [ 1 byte : function id ]
//! [ 1 byte : sequence number (bits 7..4) | response expected (bit 3) ]
//! [ 1 byte : error code (bits 7..6) ]
//! [ N bytes: payload, little-endian fields ]
//! ```
//!
//! Sequence number 0 is reserved for callbacks; requests cycle through 1..=15.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the packet header
pub const HEADER_LEN: usize = 8;

/// Maximum packet size (header + payload)
pub const MAX_PACKET_LEN: usize = 80;

/// Highest usable sequence number (4 bits)
pub const MAX_SEQUENCE: u8 = 15;

const BASE58_ALPHABET: &[u8] = b"123456789abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ";

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Invalid packet length: {0} bytes (min: {HEADER_LEN}, max: {MAX_PACKET_LEN})")]
    InvalidLength(usize),

    #[error("Invalid sequence number: {0} (max: {MAX_SEQUENCE})")]
    InvalidSequence(u8),

    #[error("Invalid UID '{0}'")]
    InvalidUid(String),
}

/// Error code reported by a device in a response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Ok,
    InvalidParameter,
    FunctionNotSupported,
    Unknown(u8),
}

impl From<u8> for ErrorCode {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::InvalidParameter,
            2 => Self::FunctionNotSupported,
            other => Self::Unknown(other),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::Ok => write!(f, "ok"),
            ErrorCode::InvalidParameter => write!(f, "invalid parameter"),
            ErrorCode::FunctionNotSupported => write!(f, "function not supported"),
            ErrorCode::Unknown(code) => write!(f, "unknown error {}", code),
        }
    }
}

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub uid: u32,
    pub length: u8,
    pub function_id: u8,
    pub sequence: u8,
    pub response_expected: bool,
    pub error_code: ErrorCode,
}

/// A complete packet
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    /// Build a request packet
    pub fn request(
        uid: u32,
        function_id: u8,
        sequence: u8,
        response_expected: bool,
        payload: &[u8],
    ) -> Result<Self, CodecError> {
        let length = HEADER_LEN + payload.len();
        if length > MAX_PACKET_LEN {
            return Err(CodecError::InvalidLength(length));
        }
        if sequence > MAX_SEQUENCE {
            return Err(CodecError::InvalidSequence(sequence));
        }

        Ok(Self {
            header: PacketHeader {
                uid,
                length: length as u8,
                function_id,
                sequence,
                response_expected,
                error_code: ErrorCode::Ok,
            },
            payload: Bytes::copy_from_slice(payload),
        })
    }

    /// Callbacks are the only packets sent with sequence number 0
    pub fn is_callback(&self) -> bool {
        self.header.sequence == 0
    }

    /// Check if this packet answers the given request
    pub fn answers(&self, request: &PacketHeader) -> bool {
        self.header.uid == request.uid
            && self.header.function_id == request.function_id
            && self.header.sequence == request.sequence
    }
}

/// Encode a packet into a byte buffer
pub fn encode(packet: &Packet) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + packet.payload.len());
    encode_into(packet, &mut buf);
    buf.freeze()
}

/// Encode a packet directly into a provided buffer
pub fn encode_into(packet: &Packet, buf: &mut BytesMut) {
    let header = &packet.header;
    let error_bits = match header.error_code {
        ErrorCode::Ok => 0,
        ErrorCode::InvalidParameter => 1,
        ErrorCode::FunctionNotSupported => 2,
        ErrorCode::Unknown(code) => code & 0x03,
    };

    buf.reserve(HEADER_LEN + packet.payload.len());
    buf.put_u32_le(header.uid);
    buf.put_u8((HEADER_LEN + packet.payload.len()) as u8);
    buf.put_u8(header.function_id);
    buf.put_u8((header.sequence << 4) | (u8::from(header.response_expected) << 3));
    buf.put_u8(error_bits << 6);
    buf.put_slice(&packet.payload);
}

/// Try to decode a packet from a buffer
///
/// Returns:
/// - `Ok(Some(packet))` if a complete packet was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the length byte is invalid
pub fn decode(buf: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }

    // Peek at the length byte without consuming
    let length = buf[4] as usize;
    if !(HEADER_LEN..=MAX_PACKET_LEN).contains(&length) {
        return Err(CodecError::InvalidLength(length));
    }

    if buf.len() < length {
        return Ok(None);
    }

    let mut frame = buf.split_to(length);
    let uid = frame.get_u32_le();
    let length = frame.get_u8();
    let function_id = frame.get_u8();
    let seq_byte = frame.get_u8();
    let flags = frame.get_u8();

    Ok(Some(Packet {
        header: PacketHeader {
            uid,
            length,
            function_id,
            sequence: seq_byte >> 4,
            response_expected: seq_byte & 0x08 != 0,
            error_code: ErrorCode::from(flags >> 6),
        },
        payload: frame.freeze(),
    }))
}

/// Decoder state machine for streaming decoding
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Partial packet data being accumulated
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next packet from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete packets
    pub fn decode_next(&mut self) -> Result<Option<Packet>, CodecError> {
        decode(&mut self.buffer)
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Decode a base58 UID string into the 32 bit UID used on the wire.
///
/// UIDs wider than 32 bits are folded the same way the vendor bindings do.
pub fn decode_uid(uid: &str) -> Result<u32, CodecError> {
    if uid.is_empty() {
        return Err(CodecError::InvalidUid(uid.to_string()));
    }

    let mut value: u64 = 0;
    for ch in uid.bytes() {
        let digit = BASE58_ALPHABET
            .iter()
            .position(|&c| c == ch)
            .ok_or_else(|| CodecError::InvalidUid(uid.to_string()))?;

        value = value
            .checked_mul(58)
            .and_then(|v| v.checked_add(digit as u64))
            .ok_or_else(|| CodecError::InvalidUid(uid.to_string()))?;
    }

    if value > u64::from(u32::MAX) {
        let low = value & 0xFFFF_FFFF;
        let high = value >> 32;
        value = (low & 0x0000_0FFF)
            | ((low & 0x0F00_0000) >> 12)
            | ((high & 0x0000_003F) << 16)
            | ((high & 0x000F_0000) << 6)
            | ((high & 0x3F00_0000) << 2);
    }

    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn humidity_request() -> Packet {
        Packet::request(64685, 1, 3, true, &[]).expect("valid request")
    }

    #[test]
    fn test_header_layout() {
        let encoded = encode(&humidity_request());

        assert_eq!(encoded.len(), HEADER_LEN);
        assert_eq!(u32::from_le_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]), 64685);
        assert_eq!(encoded[4], 8);
        assert_eq!(encoded[5], 1);
        assert_eq!(encoded[6], 0x38); // seq 3, response expected
        assert_eq!(encoded[7], 0);
    }

    #[test]
    fn test_decode_response_with_payload_and_error() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(64685);
        buf.put_u8(10);
        buf.put_u8(1);
        buf.put_u8(3 << 4);
        buf.put_u8(2 << 6);
        buf.put_u16_le(452);

        let packet = decode(&mut buf).expect("decode failed").expect("no packet");
        assert_eq!(packet.header.sequence, 3);
        assert!(!packet.header.response_expected);
        assert_eq!(packet.header.error_code, ErrorCode::FunctionNotSupported);
        assert_eq!(&packet.payload[..], &452u16.to_le_bytes());
        assert!(packet.answers(&humidity_request().header));
        assert!(buf.is_empty(), "buffer should be empty after decode");
    }

    #[test]
    fn test_partial_decode() {
        let encoded = encode(&Packet::request(1, 11, 1, true, &(-1i32).to_le_bytes()).unwrap());

        let mut buf = BytesMut::from(&encoded[..10]);
        let result = decode(&mut buf).expect("decode should not fail on partial data");
        assert!(result.is_none(), "should return None for partial data");
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_frame_decoder_streaming() {
        let callback = Packet::request(7, 9, 0, false, &[1, 2, 3, 4]).unwrap();
        let response = humidity_request();

        let mut decoder = FrameDecoder::new();
        decoder.extend(&encode(&callback));
        decoder.extend(&encode(&response)[..4]);

        let first = decoder.decode_next().expect("decode error").expect("callback");
        assert!(first.is_callback());
        assert!(decoder.decode_next().expect("decode error").is_none());

        decoder.extend(&encode(&response)[4..]);
        let second = decoder.decode_next().expect("decode error").expect("response");
        assert_eq!(second.header.uid, 64685);
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_invalid_length() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(1);
        buf.put_u8(4); // shorter than the header itself
        buf.put_bytes(0, 3);

        assert!(matches!(decode(&mut buf), Err(CodecError::InvalidLength(4))));
        assert!(matches!(
            Packet::request(1, 1, 1, true, &[0; 80]),
            Err(CodecError::InvalidLength(88))
        ));
        assert!(matches!(
            Packet::request(1, 1, 16, true, &[]),
            Err(CodecError::InvalidSequence(16))
        ));
    }

    #[test]
    fn test_decode_uid() {
        assert_eq!(decode_uid("1").unwrap(), 0);
        assert_eq!(decode_uid("2").unwrap(), 1);
        assert_eq!(decode_uid("keg").unwrap(), 64685);
        assert_eq!(decode_uid("6Jf").unwrap(), 5 * 58 * 58 + 42 * 58 + 14);
        assert!(decode_uid("0OIl").is_err());
        assert!(decode_uid("").is_err());
    }
}
