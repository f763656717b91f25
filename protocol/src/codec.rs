//! RCON wire framing (C1): `Size(u32) | ID-low(u8) | ID-high=0(u8) | Count(u16)
//! | Type(u32) | Body(UTF-8, null-padded) | 0x00 0x00`, little-endian
//! throughout. `Size` counts every byte after itself.
//!
//! The game server's RCON implementation has a documented quirk: a
//! `Size=10` frame is sometimes followed by an 11-byte garbage tail whose
//! first 7 bytes match a fixed signature. Missing that probe desyncs the
//! stream for every frame after it.

use bytes::{BufMut, BytesMut};

/// `SERVERDATA_AUTH`. Sent once, at handshake, with `id=ID_END`.
pub const TYPE_AUTH: u32 = 3;
/// `SERVERDATA_EXECCOMMAND` from the client; the server also uses this
/// numeric value for `SERVERDATA_AUTH_RESPONSE`, so `Type` alone can never
/// disambiguate a frame — see [`crate::classify`].
pub const TYPE_EXEC_OR_AUTH_RESPONSE: u32 = 2;
/// `SERVERDATA_RESPONSE_VALUE`.
pub const TYPE_RESPONSE: u32 = 0;

/// Sentinel ids. `MID` tags the command body, `END` tags the empty
/// sentinel that follows it and whose echo terminates a multi-packet
/// response, `AUTH_FAILED` is what the server sends back instead of the
/// client's own id when authentication fails.
pub const ID_MID: i16 = 0x00;
pub const ID_END: i16 = 0x01;
pub const ID_AUTH_FAILED: i16 = -1;

/// Minimum `Size` field value: header bytes after `Size` (1+1+2+4) plus
/// the two-byte null terminator, for an empty body.
pub const MIN_FRAME_BODY: u32 = 10;
/// Minimum total frame length including the 4-byte `Size` field itself.
pub const MIN_FRAME_TOTAL: usize = 14;

const BROKEN_PACKET_LOOKAHEAD: usize = 11;
const BROKEN_PACKET_SIGNATURE: [u8; 7] = [0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: i16,
    pub count: u16,
    pub packet_type: u32,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A complete frame; `consumed` bytes should be dropped from the
    /// buffer's front (21 instead of the frame's natural 14+body length
    /// when the broken-packet probe fires and swallows no frame at all).
    Frame { frame: Option<Frame>, consumed: usize },
    Incomplete { required: usize, available: usize },
    InvalidSize { size: u32 },
    Malformed { reason: String },
}

/// Encodes one frame. `body` must not itself contain interior NUL bytes;
/// the trailing NUL terminator is added here.
pub fn encode_packet(packet_type: u32, id: i16, count: u16, body: &str) -> Vec<u8> {
    let body_bytes = body.as_bytes();
    let size = MIN_FRAME_BODY as usize + body_bytes.len();
    let mut buf = BytesMut::with_capacity(4 + size);
    buf.put_u32_le(size as u32);
    let id_bytes = id.to_le_bytes();
    buf.put_u8(id_bytes[0]);
    buf.put_u8(id_bytes[1]);
    buf.put_u16_le(count);
    buf.put_u32_le(packet_type);
    buf.put_slice(body_bytes);
    buf.put_u8(0);
    buf.put_u8(0);
    buf.to_vec()
}

/// Decodes a single frame (plus the broken-packet probe) from the front
/// of `buf`. Never panics on short input — returns `Incomplete` instead.
pub fn decode_packet(buf: &[u8]) -> DecodeOutcome {
    if buf.len() < 4 {
        return DecodeOutcome::Incomplete {
            required: 4,
            available: buf.len(),
        };
    }
    let size = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if size < MIN_FRAME_BODY {
        return DecodeOutcome::InvalidSize { size };
    }
    let total = 4 + size as usize;
    if buf.len() < total {
        return DecodeOutcome::Incomplete {
            required: total,
            available: buf.len(),
        };
    }

    let id = i16::from_le_bytes([buf[4], buf[5]]);
    let count = u16::from_le_bytes([buf[6], buf[7]]);
    let packet_type = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    let body_len = total - 12 - 2;
    let body_bytes = &buf[12..12 + body_len];
    let terminator = &buf[12 + body_len..total];
    if terminator != [0u8, 0u8] {
        return DecodeOutcome::Malformed {
            reason: format!("missing NUL terminator, found {terminator:?}"),
        };
    }
    let body = match std::str::from_utf8(body_bytes) {
        Ok(s) => s.trim_end_matches('\0').to_string(),
        Err(e) => {
            return DecodeOutcome::Malformed {
                reason: format!("body is not valid UTF-8: {e}"),
            };
        }
    };

    if size == MIN_FRAME_BODY {
        if buf.len() < total + BROKEN_PACKET_LOOKAHEAD {
            return DecodeOutcome::Incomplete {
                required: total + BROKEN_PACKET_LOOKAHEAD,
                available: buf.len(),
            };
        }
        let lookahead = &buf[total..total + BROKEN_PACKET_SIGNATURE.len()];
        if lookahead == BROKEN_PACKET_SIGNATURE {
            return DecodeOutcome::Frame {
                frame: None,
                consumed: total + BROKEN_PACKET_LOOKAHEAD,
            };
        }
    }

    DecodeOutcome::Frame {
        frame: Some(Frame {
            id,
            count,
            packet_type,
            body,
        }),
        consumed: total,
    }
}

/// Drains every complete frame from `buf`, stopping at the first
/// `Incomplete` (leftover bytes are the caller's responsibility to keep
/// buffered) or the first `InvalidSize`/`Malformed` result. Used both by
/// tests asserting the universal stream invariant and by the RCON
/// ingress loop.
pub fn decode_all(buf: &[u8]) -> (Vec<Frame>, usize) {
    let mut frames = Vec::new();
    let mut offset = 0;
    loop {
        match decode_packet(&buf[offset..]) {
            DecodeOutcome::Frame { frame, consumed } => {
                if let Some(frame) = frame {
                    frames.push(frame);
                }
                offset += consumed;
            }
            _ => break,
        }
    }
    (frames, offset)
}
