//! The link-layer byte-stuffing codec: `DLE STX <stuffed bytes> DLE ETX`,
//! with any `DLE` inside the payload doubled.
//!
//! Unlike the INSTEON wire format this crate is descended from — which is a
//! set of fixed, anchored tag/length frames nom parses in one shot — ahoi's
//! envelope is a genuinely stateful escaping protocol: the decoder has to
//! remember whether it is mid-frame and whether the previous byte was `DLE`
//! across calls. That does not fit nom's grammar-on-a-slice style, so this
//! module is a small explicit state machine instead, matching the shape of
//! the original `Streamer.dec`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::constants::{DLE, ETX, STX};
use crate::error::Error;

/// Streaming byte-stuffing decoder/encoder.
///
/// Decode state is `(in_packet, last_was_dle)`. An unexpected byte while
/// both flags are true is a protocol violation: the accumulated buffer is
/// discarded and both flags reset, resuming on the next `DLE STX`. This is
/// a resync, not a hard error — `decode()` never returns `Err` for it.
#[derive(Debug, Default)]
pub struct ByteStuffCodec {
    in_packet: bool,
    last_was_dle: bool,
    buf: Vec<u8>,
}

impl ByteStuffCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn abort_frame(&mut self) {
        self.buf.clear();
        self.in_packet = false;
        self.last_was_dle = false;
    }

    /// Feeds a single byte into the state machine. Returns a completed
    /// frame if this byte closed one.
    fn feed(&mut self, b: u8) -> Option<Bytes> {
        if !self.last_was_dle {
            if b == DLE {
                self.last_was_dle = true;
            } else if self.in_packet {
                self.buf.push(b);
            }
            // else: discard byte outside a frame
            return None;
        }

        // previous byte was DLE
        match b {
            STX if !self.in_packet => {
                self.in_packet = true;
                self.last_was_dle = false;
            }
            ETX if self.in_packet => {
                let frame = Bytes::from(std::mem::take(&mut self.buf));
                self.in_packet = false;
                self.last_was_dle = false;
                return Some(frame);
            }
            DLE if self.in_packet => {
                self.buf.push(DLE);
                self.last_was_dle = false;
            }
            _ if self.in_packet => {
                self.abort_frame();
            }
            _ => {
                // DLE seen outside a frame, followed by something other
                // than STX: just drop back to idle.
                self.last_was_dle = false;
            }
        }

        None
    }
}

impl Decoder for ByteStuffCodec {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while src.has_remaining() {
            let b = src.get_u8();
            if let Some(frame) = self.feed(b) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

impl Encoder<Bytes> for ByteStuffCodec {
    type Error = Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() * 2 + 4);
        dst.put_u8(DLE);
        dst.put_u8(STX);
        for b in item.iter() {
            dst.put_u8(*b);
            if *b == DLE {
                dst.put_u8(DLE);
            }
        }
        dst.put_u8(DLE);
        dst.put_u8(ETX);
        Ok(())
    }
}

/// Encodes a single frame in one shot, without a codec/buffer.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() * 2 + 4);
    out.push(DLE);
    out.push(STX);
    for &b in payload {
        out.push(b);
        if b == DLE {
            out.push(DLE);
        }
    }
    out.push(DLE);
    out.push(ETX);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Bytes> {
        let mut codec = ByteStuffCodec::new();
        let mut src = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = codec.decode(&mut src) {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn roundtrip_with_stuffed_dle() {
        let payload = [0x10u8, 0x02, 0x03, 0x10, 0xFF];
        let framed = encode(&payload);
        assert_eq!(
            framed,
            vec![0x10, 0x02, 0x10, 0x10, 0x02, 0x03, 0x10, 0x10, 0xFF, 0x10, 0x03]
        );

        let frames = decode_all(&framed);
        assert_eq!(frames, vec![Bytes::copy_from_slice(&payload)]);
    }

    #[test]
    fn empty_payload_roundtrips() {
        let framed = encode(&[]);
        assert_eq!(framed, vec![0x10, 0x02, 0x10, 0x03]);
        assert_eq!(decode_all(&framed), vec![Bytes::new()]);
    }

    #[test]
    fn payload_of_only_dle_bytes() {
        let payload = [0x10u8; 4];
        let framed = encode(&payload);
        assert_eq!(framed.len(), 4 + 2 * payload.len());
        assert_eq!(decode_all(&framed), vec![Bytes::copy_from_slice(&payload)]);
    }

    #[test]
    fn protocol_violation_resyncs_on_next_frame() {
        // DLE DLE DLE (a stuffed literal, fine) followed by a bogus
        // DLE <garbage> while in-packet, then a fresh valid frame.
        let mut bytes = vec![0x10, 0x02]; // start
        bytes.push(0x41); // 'A'
        bytes.push(0x10);
        bytes.push(0x99); // garbage after DLE while in_packet -> abort
        bytes.extend(encode(&[0x42])); // fresh valid frame
        let frames = decode_all(&bytes);
        assert_eq!(frames, vec![Bytes::copy_from_slice(&[0x42])]);
    }

    #[test]
    fn frame_by_frame_byte_at_a_time() {
        let mut codec = ByteStuffCodec::new();
        let framed = encode(&[1, 2, 3]);
        let mut seen = None;
        for b in framed {
            let mut chunk = BytesMut::from(&[b][..]);
            if let Ok(Some(frame)) = codec.decode(&mut chunk) {
                seen = Some(frame);
            }
        }
        assert_eq!(seen, Some(Bytes::copy_from_slice(&[1, 2, 3])));
    }
}
