//! Growable receive buffer for a single connection.
//!
//! All bytes arriving from the transport are appended at the tail; the parsers
//! consume complete units (lines, fixed-size runs, whole frames) from the
//! front. There is no interior mutation, so anything split off the front is an
//! independent allocation-free view into the same backing storage.

use bytes::{Buf, BytesMut};

use crate::{Error, Result};

/// Per-connection receive buffer.
///
/// Wraps a [`BytesMut`] with the two extraction disciplines the engine needs:
/// delimiter-terminated lines for HTTP and exact byte counts for bodies and
/// frame payloads. Body bytes may legally contain `\r\n`, which is why the two
/// operations are kept separate.
///
/// The buffer is capped: [`append`](Self::append) fails once the configured
/// limit would be exceeded, bounding memory under a peer that never completes
/// a line or frame.
#[derive(Debug)]
pub struct RecvBuffer {
    buf: BytesMut,
    limit: usize,
}

impl RecvBuffer {
    /// Creates an empty buffer that will hold at most `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            limit,
        }
    }

    /// Creates a buffer seeded with bytes left over from an earlier parsing
    /// phase, e.g. frame bytes that arrived in the same read as the upgrade
    /// request.
    pub fn from_parts(buf: BytesMut, limit: usize) -> Self {
        Self { buf, limit }
    }

    /// Appends a chunk read from the transport at the tail.
    ///
    /// Fails with [`Error::BufferLimitExceeded`] when the buffered total would
    /// pass the limit; the connection should be closed in that case.
    pub fn append(&mut self, chunk: &[u8]) -> Result<()> {
        if self.buf.len() + chunk.len() > self.limit {
            return Err(Error::BufferLimitExceeded(self.limit));
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    /// Removes and returns the bytes before the first `\r\n`, discarding the
    /// delimiter. Returns `None` (buffer untouched) when no complete line is
    /// buffered. A line may be empty.
    ///
    /// Call repeatedly until it returns `None`: one read may deliver several
    /// complete lines.
    pub fn take_line(&mut self) -> Option<BytesMut> {
        let at = self.buf.windows(2).position(|w| w == b"\r\n")?;
        let line = self.buf.split_to(at);
        self.buf.advance(2);
        Some(line)
    }

    /// Removes and returns exactly `n` bytes from the front.
    ///
    /// The caller is responsible for checking `len()` first; this is used once
    /// a `Content-Length` or frame payload length is known.
    ///
    /// # Panics
    /// Panics if fewer than `n` bytes are buffered.
    pub fn take_bytes(&mut self, n: usize) -> BytesMut {
        self.buf.split_to(n)
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Direct access to the backing bytes, for the frame decoder.
    pub(crate) fn bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Consumes the buffer, yielding the unparsed remainder. Used when the
    /// residual bytes are handed to another component, such as a framed
    /// client stream after the handshake.
    pub fn into_inner(self) -> BytesMut {
        self.buf
    }
}
