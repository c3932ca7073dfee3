//! Per-connection send queue.
//!
//! All outgoing bytes for a connection funnel through one queue drained by a
//! single writer task, so at most one transport write is in flight and
//! responses hit the wire in enqueue order, regardless of how many tasks hold
//! an [`Outbound`] handle.

use bytes::Bytes;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};

use crate::{codec::FrameCodec, frame::Frame, Error, Result};

/// Creates a connected send-queue pair: the cloneable [`Outbound`] handle for
/// producers and the [`SendQueue`] the writer task drains.
pub fn channel() -> (Outbound, SendQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Outbound { tx }, SendQueue { rx })
}

/// Producer handle for a connection's send queue.
///
/// Cheap to clone; every clone feeds the same queue. Enqueueing never blocks
/// and never performs I/O itself.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl Outbound {
    /// Enqueues a ready-to-write run of bytes, such as a serialized HTTP
    /// response.
    ///
    /// Fails with [`Error::ConnectionClosed`] once the writer task has
    /// stopped.
    pub fn enqueue(&self, bytes: Bytes) -> Result<()> {
        self.tx.send(bytes).map_err(|_| Error::ConnectionClosed)
    }

    /// Serializes a frame (applying its mask, if any) and enqueues it.
    pub fn send_frame(&self, frame: Frame) -> Result<()> {
        self.enqueue(FrameCodec::encode_frame(frame))
    }
}

/// Consumer half of the send queue, owned by the connection's writer task.
pub struct SendQueue {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl SendQueue {
    /// Writes queued buffers to the transport one at a time until every
    /// [`Outbound`] handle has been dropped, then shuts the write side down.
    ///
    /// `write_all` completes before the next buffer is picked up, which is
    /// what keeps a single write in flight.
    pub async fn drain<W>(mut self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(buf) = self.rx.recv().await {
            writer.write_all(&buf).await?;
        }
        writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn drain_preserves_enqueue_order() {
        let (out, queue) = channel();
        let other = out.clone();

        out.enqueue(Bytes::from_static(b"first ")).unwrap();
        other.enqueue(Bytes::from_static(b"second ")).unwrap();
        out.send_frame(Frame::text("third")).unwrap();
        drop(out);
        drop(other);

        let (mut client, mut server) = tokio::io::duplex(1024);
        queue.drain(&mut server).await.unwrap();

        let mut written = Vec::new();
        client.read_to_end(&mut written).await.unwrap();

        assert!(written.starts_with(b"first second "));
        // Then the text frame: FIN+Text header, length 5, "third".
        assert_eq!(&written[13..15], &[0x81, 5]);
        assert_eq!(&written[15..], b"third");
    }

    #[tokio::test]
    async fn enqueue_fails_after_queue_dropped() {
        let (out, queue) = channel();
        drop(queue);

        assert!(matches!(
            out.enqueue(Bytes::from_static(b"late")),
            Err(Error::ConnectionClosed)
        ));
    }
}
