//! Frame-level encoder/decoder implementing the [`tokio_util::codec`] traits.
//!
//! The decoder is restartable: it inspects the buffered bytes without
//! consuming anything until an entire frame (header and payload) is available,
//! then removes it in one step. A frame split across any number of reads
//! decodes once the last byte arrives, and re-running the header scan on a
//! short buffer is a handful of index reads, not a state to persist.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    frame::{Frame, OpCode, MAX_HEAD_SIZE},
    mask::apply_mask,
    Error,
};

/// RFC 6455 frame codec.
///
/// Holds only configuration, no parse state: decoding either yields a complete
/// frame or leaves the buffer exactly as it found it.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload: usize,
}

impl FrameCodec {
    /// Creates a codec rejecting frames whose announced payload exceeds
    /// `max_payload` bytes.
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    /// Encodes a frame into a standalone buffer, masking the payload first
    /// when a key is set. Used by the send queue, which works in terms of
    /// ready-to-write byte runs.
    pub fn encode_frame(mut frame: Frame) -> Bytes {
        frame.apply_mask();

        let mut head = [0u8; MAX_HEAD_SIZE];
        let head_len = frame.fmt_head(&mut head);

        let mut buf = BytesMut::with_capacity(head_len + frame.payload.len());
        buf.extend_from_slice(&head[..head_len]);
        buf.extend_from_slice(&frame.payload);
        buf.freeze()
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        if src.len() < 2 {
            return Ok(None);
        }

        let fin = src[0] & 0x80 != 0;
        let rsv = (src[0] >> 4) & 0x07;
        let opcode = OpCode::from(src[0] & 0x0F);
        let masked = src[1] & 0x80 != 0;

        // Header size past the two base bytes depends on the length code and
        // the mask bit.
        let mut offset = 2;
        let payload_len = match src[1] & 0x7F {
            126 => {
                if src.len() < offset + 2 {
                    return Ok(None);
                }
                let len = u16::from_be_bytes([src[offset], src[offset + 1]]) as u64;
                offset += 2;
                len
            }
            127 => {
                if src.len() < offset + 8 {
                    return Ok(None);
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&src[offset..offset + 8]);
                offset += 8;
                u64::from_be_bytes(bytes)
            }
            len => len as u64,
        };

        // Reject oversized frames as soon as the announced length is known,
        // before buffering any of the payload.
        if payload_len > self.max_payload as u64 {
            return Err(Error::FrameTooLarge);
        }
        let payload_len = payload_len as usize;

        let mask = if masked {
            if src.len() < offset + 4 {
                return Ok(None);
            }
            let key = [
                src[offset],
                src[offset + 1],
                src[offset + 2],
                src[offset + 3],
            ];
            offset += 4;
            Some(key)
        } else {
            None
        };

        if src.len() < offset + payload_len {
            src.reserve(offset + payload_len - src.len());
            return Ok(None);
        }

        src.advance(offset);
        let mut payload = src.split_to(payload_len);
        if let Some(key) = mask {
            apply_mask(&mut payload, key);
        }

        Ok(Some(Frame {
            fin,
            rsv,
            opcode,
            mask,
            payload,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, mut frame: Frame, dst: &mut BytesMut) -> Result<(), Error> {
        frame.apply_mask();

        let mut head = [0u8; MAX_HEAD_SIZE];
        let head_len = frame.fmt_head(&mut head);

        dst.reserve(head_len + frame.payload.len());
        dst.extend_from_slice(&head[..head_len]);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_to_buf(frame: Frame) -> BytesMut {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_roundtrip_all_length_encodings() {
        // Cover the 7-bit, 16-bit and 64-bit length forms on both sides of
        // each boundary, masked and unmasked.
        let mut codec = FrameCodec::new(128 * 1024);

        for size in [0usize, 1, 125, 126, 65535, 65536] {
            for mask in [None, Some([0x11, 0x22, 0x33, 0x44])] {
                let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
                let frame = Frame::new(true, OpCode::Binary, mask, &payload[..]);

                let mut buf = encode_to_buf(frame);
                let decoded = codec.decode(&mut buf).unwrap().unwrap();

                assert!(decoded.fin);
                assert_eq!(decoded.opcode, OpCode::Binary);
                assert_eq!(decoded.mask, mask);
                assert_eq!(decoded.payload.as_ref(), &payload[..], "size {size}");
                assert!(buf.is_empty());
            }
        }
    }

    #[test]
    fn test_decode_waits_for_full_frame() {
        // Feed the wire bytes one at a time; the decoder must return None at
        // every step except the last and never consume partial input.
        let frame = Frame::new(
            true,
            OpCode::Text,
            Some([0xDE, 0xAD, 0xBE, 0xEF]),
            &b"incremental delivery"[..],
        );
        let wire = encode_to_buf(frame);

        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        for (i, byte) in wire.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let result = codec.decode(&mut buf).unwrap();
            if i + 1 < wire.len() {
                assert!(result.is_none(), "decoded early at byte {}", i);
                assert_eq!(buf.len(), i + 1, "consumed bytes at {}", i);
            } else {
                let decoded = result.unwrap();
                assert_eq!(decoded.payload.as_ref(), b"incremental delivery");
            }
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_multiple_frames_from_one_buffer() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_to_buf(Frame::text("one")));
        buf.extend_from_slice(&encode_to_buf(Frame::ping("two")));
        buf.extend_from_slice(&encode_to_buf(Frame::binary("three")));

        let mut codec = FrameCodec::default();
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        let third = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(first.payload.as_ref(), b"one");
        assert_eq!(second.opcode, OpCode::Ping);
        assert_eq!(second.payload.as_ref(), b"two");
        assert_eq!(third.payload.as_ref(), b"three");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversized_frame_rejected_before_payload() {
        let mut codec = FrameCodec::new(1024);

        // Header for a 2048-byte unmasked binary frame; no payload yet.
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x82, 126]);
        buf.extend_from_slice(&2048u16.to_be_bytes());

        assert!(matches!(codec.decode(&mut buf), Err(Error::FrameTooLarge)));
    }

    #[test]
    fn test_decode_preserves_reserved_bits_and_opcodes() {
        let mut frame = Frame::text("ext");
        frame.rsv = 0b100;
        frame.opcode = OpCode::Reserved(0x7);

        let mut codec = FrameCodec::default();
        let mut buf = encode_to_buf(frame);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded.rsv, 0b100);
        assert_eq!(decoded.opcode, OpCode::Reserved(0x7));
    }

    #[test]
    fn test_masked_payload_differs_on_wire() {
        let frame = Frame::new(
            true,
            OpCode::Text,
            Some([0x5A, 0x5A, 0x5A, 0x5A]),
            &b"secret"[..],
        );
        let wire = FrameCodec::encode_frame(frame);

        // Header is 2 base bytes + 4 mask bytes; payload follows masked.
        assert_ne!(&wire[6..], b"secret");

        let mut unmasked = wire[6..].to_vec();
        apply_mask(&mut unmasked, [0x5A; 4]);
        assert_eq!(&unmasked, b"secret");
    }
}
