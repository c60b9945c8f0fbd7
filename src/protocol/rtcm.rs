//! RTCM 3 transport framing
//!
//! The caster does not interpret correction data, but it does need to know
//! where a message starts when priming a late joiner from the ring buffer.
//! RTCM 3 frames look like this:
//!
//! ```text
//! +--------+----------+-----------+-----------------+---------+
//! |  0xD3  | 6 bits 0 |  10 bits  |  payload        | CRC-24Q |
//! |preamble| reserved |  length   |  (0..=1023 B)   |  3 B    |
//! +--------+----------+-----------+-----------------+---------+
//! ```
//!
//! A candidate is accepted only when its CRC-24Q matches, so a stray 0xD3
//! inside a payload is not mistaken for a frame start.

use bytes::Bytes;

/// RTCM 3 preamble byte
pub const PREAMBLE: u8 = 0xD3;

/// Preamble plus reserved bits and length
pub const HEADER_LEN: usize = 3;

/// CRC-24Q trailer length
pub const CRC_LEN: usize = 3;

/// Largest payload the 10-bit length field allows
pub const MAX_PAYLOAD_LEN: usize = 1023;

const CRC24Q_POLY: u32 = 0x0186_4CFB;

/// CRC-24Q as used by RTCM 3
pub fn crc24q(data: &[u8]) -> u32 {
    let mut crc: u32 = 0;
    for &byte in data {
        crc ^= (byte as u32) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24Q_POLY;
            }
        }
    }
    crc & 0x00FF_FFFF
}

/// Total frame length announced by the header at the start of `buf`
///
/// Returns `None` if `buf` does not start with a plausible header.
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_LEN || buf[0] != PREAMBLE || buf[1] & 0xFC != 0 {
        return None;
    }
    let payload = (((buf[1] & 0x03) as usize) << 8) | buf[2] as usize;
    Some(HEADER_LEN + payload + CRC_LEN)
}

/// Whether `buf` starts with a complete frame whose CRC checks out
pub fn is_valid_frame_at(buf: &[u8]) -> bool {
    let Some(len) = frame_len(buf) else {
        return false;
    };
    if buf.len() < len {
        return false;
    }

    let body = &buf[..len - CRC_LEN];
    let trailer = &buf[len - CRC_LEN..len];
    let expected =
        ((trailer[0] as u32) << 16) | ((trailer[1] as u32) << 8) | trailer[2] as u32;
    crc24q(body) == expected
}

/// Offset of the first complete, CRC-valid frame in `buf`
pub fn find_frame_start(buf: &[u8]) -> Option<usize> {
    buf.iter()
        .enumerate()
        .filter(|(_, &b)| b == PREAMBLE)
        .map(|(i, _)| i)
        .find(|&i| is_valid_frame_at(&buf[i..]))
}

/// RTCM message number (first 12 bits of the payload) of the frame at the start of `buf`
pub fn message_type(buf: &[u8]) -> Option<u16> {
    frame_len(buf)?;
    if buf.len() < HEADER_LEN + 2 {
        return None;
    }
    Some(((buf[3] as u16) << 4) | (buf[4] as u16 >> 4))
}

/// Build a frame around `payload`
///
/// Returns `None` if the payload exceeds [`MAX_PAYLOAD_LEN`].
pub fn encode_frame(payload: &[u8]) -> Option<Bytes> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return None;
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
    frame.push(PREAMBLE);
    frame.push((payload.len() >> 8) as u8 & 0x03);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);

    let crc = crc24q(&frame);
    frame.extend_from_slice(&[(crc >> 16) as u8, (crc >> 8) as u8, crc as u8]);
    Some(Bytes::from(frame))
}
