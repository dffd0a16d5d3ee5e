//! AWS EventStream binary framing.
//!
//! Frames are length-prefixed: a 12-byte prelude (total length, headers
//! length, prelude CRC), a header block, the payload, and a trailing message
//! CRC. Payloads here are always JSON. CRCs are not verified; framing is
//! validated by length bookkeeping and the record cap.
//!
//! After the final frame the connection carries no trailer bytes; readers
//! must not attempt a drain, it would block waiting for data that never
//! comes.

use bytes::Bytes;

use crate::core::types::errors::GatewayError;

/// Upper bound on a single record; anything larger is a corrupt stream.
pub const MAX_RECORD_BYTES: usize = 10 * 1024 * 1024;

const PRELUDE_LEN: usize = 12;
const MESSAGE_CRC_LEN: usize = 4;

/// One decoded frame.
#[derive(Debug, Clone)]
pub struct EventStreamFrame {
    /// `:event-type` header, when present.
    pub event_type: Option<String>,
    /// `:exception-type` header, when present.
    pub exception_type: Option<String>,
    /// `:message-type` header (`event` or `exception`).
    pub message_type: Option<String>,
    pub payload: Bytes,
}

impl EventStreamFrame {
    pub fn is_exception(&self) -> bool {
        self.exception_type.is_some() || self.message_type.as_deref() == Some("exception")
    }
}

/// Incremental frame decoder. Feed it body bytes; complete frames come back
/// in wire order, partial frames stay buffered.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: Vec<u8>,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<EventStreamFrame>, GatewayError> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        loop {
            if self.buffer.len() < PRELUDE_LEN {
                break;
            }
            let total_length = u32::from_be_bytes([
                self.buffer[0],
                self.buffer[1],
                self.buffer[2],
                self.buffer[3],
            ]) as usize;

            if total_length < PRELUDE_LEN + MESSAGE_CRC_LEN || total_length > MAX_RECORD_BYTES {
                return Err(GatewayError::decode(format!(
                    "invalid event stream frame length: {}",
                    total_length
                )));
            }
            if self.buffer.len() < total_length {
                break;
            }

            let frame_data: Vec<u8> = self.buffer.drain(..total_length).collect();
            frames.push(Self::decode_frame(&frame_data)?);
        }
        Ok(frames)
    }

    /// Whether any partial frame remains buffered.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    fn decode_frame(data: &[u8]) -> Result<EventStreamFrame, GatewayError> {
        let total_length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let headers_length = u32::from_be_bytes([data[4], data[5], data[6], data[7]]) as usize;
        // data[8..12] is the prelude CRC.

        let headers_end = PRELUDE_LEN + headers_length;
        let payload_end = total_length - MESSAGE_CRC_LEN;
        if headers_end > payload_end || payload_end > data.len() {
            return Err(GatewayError::decode("event stream header length exceeds frame"));
        }

        let mut event_type = None;
        let mut exception_type = None;
        let mut message_type = None;

        let mut offset = PRELUDE_LEN;
        while offset < headers_end {
            let name_len = data[offset] as usize;
            offset += 1;
            if offset + name_len > headers_end {
                return Err(GatewayError::decode("truncated event stream header name"));
            }
            let name = String::from_utf8_lossy(&data[offset..offset + name_len]).into_owned();
            offset += name_len;

            if offset >= headers_end {
                return Err(GatewayError::decode("truncated event stream header type"));
            }
            let value_type = data[offset];
            offset += 1;

            let string_value = match value_type {
                // 7 = string: 2-byte big-endian length then UTF-8 bytes.
                7 => {
                    if offset + 2 > headers_end {
                        return Err(GatewayError::decode("truncated event stream string header"));
                    }
                    let len = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
                    offset += 2;
                    if offset + len > headers_end {
                        return Err(GatewayError::decode("truncated event stream string value"));
                    }
                    let value =
                        String::from_utf8_lossy(&data[offset..offset + len]).into_owned();
                    offset += len;
                    Some(value)
                }
                // 0/1 = bool true/false, no value bytes.
                0 | 1 => None,
                // 2 = byte, 3 = short, 4 = int, 5 = long, 8 = timestamp.
                2 => {
                    offset += 1;
                    None
                }
                3 => {
                    offset += 2;
                    None
                }
                4 => {
                    offset += 4;
                    None
                }
                5 | 8 => {
                    offset += 8;
                    None
                }
                // 6 = byte array, length-prefixed like strings.
                6 => {
                    if offset + 2 > headers_end {
                        return Err(GatewayError::decode("truncated event stream byte array"));
                    }
                    let len = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
                    offset += 2 + len;
                    None
                }
                // 9 = uuid.
                9 => {
                    offset += 16;
                    None
                }
                other => {
                    return Err(GatewayError::decode(format!(
                        "unknown event stream header type: {}",
                        other
                    )));
                }
            };

            if let Some(value) = string_value {
                match name.as_str() {
                    ":event-type" => event_type = Some(value),
                    ":exception-type" => exception_type = Some(value),
                    ":message-type" => message_type = Some(value),
                    _ => {}
                }
            }
        }

        Ok(EventStreamFrame {
            event_type,
            exception_type,
            message_type,
            payload: Bytes::copy_from_slice(&data[headers_end..payload_end]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble a frame with one string header and a payload.
    fn frame(header_name: &str, header_value: &str, payload: &[u8]) -> Vec<u8> {
        let mut headers = Vec::new();
        headers.push(header_name.len() as u8);
        headers.extend_from_slice(header_name.as_bytes());
        headers.push(7u8);
        headers.extend_from_slice(&(header_value.len() as u16).to_be_bytes());
        headers.extend_from_slice(header_value.as_bytes());

        let total = PRELUDE_LEN + headers.len() + payload.len() + MESSAGE_CRC_LEN;
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&(total as u32).to_be_bytes());
        out.extend_from_slice(&(headers.len() as u32).to_be_bytes());
        out.extend_from_slice(&[0u8; 4]); // prelude CRC, unchecked
        out.extend_from_slice(&headers);
        out.extend_from_slice(payload);
        out.extend_from_slice(&[0u8; 4]); // message CRC, unchecked
        out
    }

    #[test]
    fn test_decode_single_frame() {
        let mut decoder = EventStreamDecoder::new();
        let data = frame(":event-type", "contentBlockDelta", br#"{"delta":{"text":"hi"}}"#);
        let frames = decoder.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_type.as_deref(), Some("contentBlockDelta"));
        assert_eq!(&frames[0].payload[..], br#"{"delta":{"text":"hi"}}"#);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_decode_split_across_pushes() {
        let mut decoder = EventStreamDecoder::new();
        let data = frame(":event-type", "messageStop", b"{}");
        let split = data.len() / 2;
        assert!(decoder.push(&data[..split]).unwrap().is_empty());
        assert!(decoder.has_pending());
        let frames = decoder.push(&data[split..]).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_decode_two_frames_in_one_push() {
        let mut decoder = EventStreamDecoder::new();
        let mut data = frame(":event-type", "a", b"{}");
        data.extend_from_slice(&frame(":event-type", "b", b"{}"));
        let frames = decoder.push(&data).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event_type.as_deref(), Some("a"));
        assert_eq!(frames[1].event_type.as_deref(), Some("b"));
    }

    #[test]
    fn test_exception_frame() {
        let mut decoder = EventStreamDecoder::new();
        let data = frame(":exception-type", "throttlingException", br#"{"message":"slow"}"#);
        let frames = decoder.push(&data).unwrap();
        assert!(frames[0].is_exception());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut decoder = EventStreamDecoder::new();
        let mut data = Vec::new();
        data.extend_from_slice(&((MAX_RECORD_BYTES + 1) as u32).to_be_bytes());
        data.extend_from_slice(&[0u8; 8]);
        assert!(decoder.push(&data).is_err());
    }
}
