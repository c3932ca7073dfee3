//! WebSocket frames as defined in [RFC 6455 Section 5.2].
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |         (16 or 64 bits)       |
//! |N|V|V|V|       |S|             |                               |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |        Extended payload length continued, if payload len == 127|
//! +---------------------------------------------------------------+
//! |                               |   Masking-key, if MASK set to 1|
//! +-------------------------------+-------------------------------+
//! |     Masking-key (continued)       |          Payload Data      |
//! +-----------------------------------+ - - - - - - - - - - - - - -+
//! ```
//!
//! Both extended payload length forms are big-endian on the wire, in decoding
//! and encoding alike.
//!
//! [RFC 6455 Section 5.2]: https://datatracker.ietf.org/doc/html/rfc6455#section-5.2

use bytes::BytesMut;

/// WebSocket operation code, the 4-bit frame type identifier.
///
/// The numeric values are defined in [RFC 6455, Section 11.8]:
/// Continuation = 0x0, Text = 0x1, Binary = 0x2, Close = 0x8, Ping = 0x9,
/// Pong = 0xA.
///
/// Nibbles outside that set (0x3–0x7, 0xB–0xF) are reserved by the protocol.
/// The codec does not reject them — an unknown opcode is indistinguishable
/// from a future extension at this layer — so they are carried through to the
/// application as [`OpCode::Reserved`].
///
/// [RFC 6455, Section 11.8]: https://datatracker.ietf.org/doc/html/rfc6455#section-11.8
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// An opcode outside the RFC 6455 set, preserved verbatim.
    Reserved(u8),
}

impl OpCode {
    /// Returns `true` for the control frame opcodes (`Close`, `Ping`, `Pong`).
    ///
    /// Control frames may not be fragmented and carry at most 125 payload
    /// bytes per the protocol; this engine leaves enforcing that to the
    /// application.
    pub fn is_control(&self) -> bool {
        matches!(*self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

impl From<u8> for OpCode {
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            other => Self::Reserved(other),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(val: OpCode) -> Self {
        match val {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
            OpCode::Reserved(v) => v & 0x0F,
        }
    }
}

/// Maximum encoded header size: 2 base bytes + 8 extended length + 4 mask.
pub(crate) const MAX_HEAD_SIZE: usize = 14;

/// A single WebSocket frame.
///
/// The payload of a decoded frame is split straight out of the receive buffer
/// (already unmasked when the MASK bit was set), so handing frames to the
/// application involves no copy.
///
/// # Fields
/// - `fin`: final-fragment flag.
/// - `rsv`: the three reserved bits as received, normally zero. Extensions
///   that assign them a meaning see them untouched.
/// - `opcode`: frame type.
/// - `mask`: masking key. `Some` on frames received from a client and on
///   frames a client is about to send; the encoder applies it.
/// - `payload`: the frame data.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub rsv: u8,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload: BytesMut,
}

impl Frame {
    /// Creates a frame with zero reserved bits.
    pub fn new(
        fin: bool,
        opcode: OpCode,
        mask: Option<[u8; 4]>,
        payload: impl Into<BytesMut>,
    ) -> Self {
        Self {
            fin,
            rsv: 0,
            opcode,
            mask,
            payload: payload.into(),
        }
    }

    /// A final text frame with the given payload, unmasked.
    pub fn text(payload: impl AsRef<[u8]>) -> Self {
        Self::new(true, OpCode::Text, None, payload.as_ref())
    }

    /// A final binary frame with the given payload, unmasked.
    pub fn binary(payload: impl AsRef<[u8]>) -> Self {
        Self::new(true, OpCode::Binary, None, payload.as_ref())
    }

    /// A ping frame with the given payload.
    pub fn ping(payload: impl AsRef<[u8]>) -> Self {
        Self::new(true, OpCode::Ping, None, payload.as_ref())
    }

    /// A pong frame, usually echoing a ping's payload.
    pub fn pong(payload: impl AsRef<[u8]>) -> Self {
        Self::new(true, OpCode::Pong, None, payload.as_ref())
    }

    /// A close frame with a raw payload. The payload layout (status code +
    /// reason) is not validated here.
    pub fn close(payload: impl AsRef<[u8]>) -> Self {
        Self::new(true, OpCode::Close, None, payload.as_ref())
    }

    /// A close frame carrying a status code and a UTF-8 reason.
    pub fn close_with(code: u16, reason: impl AsRef<[u8]>) -> Self {
        let reason = reason.as_ref();
        let mut payload = BytesMut::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason);
        Self::new(true, OpCode::Close, None, payload)
    }

    /// Whether the frame carries a masking key.
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// XORs the payload with the masking key in place. Applying it twice
    /// restores the original bytes, so the same routine masks and unmasks.
    pub(crate) fn apply_mask(&mut self) {
        if let Some(mask) = self.mask {
            crate::mask::apply_mask(&mut self.payload, mask);
        }
    }

    /// Writes the frame header into `head` and returns the number of header
    /// bytes, including the masking key when present.
    ///
    /// # Panics
    /// Panics if `head` is shorter than [`MAX_HEAD_SIZE`].
    pub(crate) fn fmt_head(&self, head: &mut [u8]) -> usize {
        head[0] = (self.fin as u8) << 7 | (self.rsv & 0x07) << 4 | u8::from(self.opcode);

        let len = self.payload.len();
        let size = if len < 126 {
            head[1] = len as u8;
            2
        } else if len < 65536 {
            head[1] = 126;
            head[2..4].copy_from_slice(&(len as u16).to_be_bytes());
            4
        } else {
            head[1] = 127;
            head[2..10].copy_from_slice(&(len as u64).to_be_bytes());
            10
        };

        if let Some(mask) = self.mask {
            head[1] |= 0x80;
            head[size..size + 4].copy_from_slice(&mask);
            size + 4
        } else {
            size
        }
    }
}
