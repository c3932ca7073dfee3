//! Per-connection orchestrator.
//!
//! [`serve`] owns a connection from accept to teardown. It splits the
//! transport, spawns a writer task draining the send queue, and runs the read
//! side through two phases: the HTTP loop (parse events → handler dispatch)
//! and, after a successful upgrade, the WebSocket frame loop. Bytes left in
//! the receive buffer at the moment of upgrade carry over — frames that
//! arrived in the same read as the handshake request are not lost.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::codec::Decoder;

use crate::{
    buffer::RecvBuffer,
    codec::FrameCodec,
    frame::MAX_HEAD_SIZE,
    handler::{Action, FrameHandler, HandlerFactory, ResponseHandler},
    http::{HttpEvent, HttpParser},
    outbound::{self, Outbound},
    Error, Result,
};

/// Per-connection tuning knobs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Serve further requests on the same connection after a response.
    pub keep_alive: bool,
    /// Receive buffer cap in bytes; a peer that exceeds it is disconnected.
    pub max_buffer: usize,
    /// Largest accepted WebSocket payload in bytes.
    pub max_payload: usize,
    /// Size of each transport read.
    pub read_chunk: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keep_alive: true,
            max_buffer: 1024 * 1024,
            max_payload: 1024 * 1024,
            read_chunk: 4096,
        }
    }
}

/// Serves one connection to completion.
///
/// Returns `Ok(())` on orderly shutdown (peer closed, keep-alive disabled, or
/// a handler asked to close); protocol violations and resource-limit hits
/// surface as `Err` after the connection is torn down. A failed transport
/// read is not an error here: it ends the connection the same way a close
/// does, since there is no one left to report it to.
pub async fn serve<S>(stream: S, factory: Arc<dyn HandlerFactory>, config: Config) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (out, queue) = outbound::channel();

    let writer_task = tokio::spawn(async move {
        if let Err(err) = queue.drain(&mut writer).await {
            log::debug!("writer stopped: {err}");
        }
    });

    let result = http_loop(&mut reader, &out, factory.as_ref(), &config).await;

    // Dropping the last handle ends the queue; on clean shutdown the writer
    // flushes everything still enqueued before the task finishes.
    drop(out);
    match result {
        Ok(()) => {
            let _ = writer_task.await;
            Ok(())
        }
        Err(err) => {
            writer_task.abort();
            Err(err)
        }
    }
}

/// HTTP phase: reads, parses, dispatches to the current handler, and acts on
/// the handler's verdict after each complete request.
async fn http_loop<R>(
    reader: &mut R,
    out: &Outbound,
    factory: &dyn HandlerFactory,
    config: &Config,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = RecvBuffer::new(config.max_buffer);
    let mut parser = HttpParser::request();
    let mut handler: Option<Box<dyn ResponseHandler>> = None;
    let mut scratch = vec![0u8; config.read_chunk];

    loop {
        // Drain every event the buffered bytes can produce before reading
        // again; one read may carry a whole pipeline of requests.
        while let Some(event) = parser.next_event(&mut buf)? {
            match event {
                HttpEvent::RequestLine {
                    method,
                    target,
                    version,
                } => {
                    log::debug!(
                        "request: {} {}",
                        String::from_utf8_lossy(&method),
                        String::from_utf8_lossy(&target),
                    );
                    handler = Some(
                        factory
                            .make_handler(&method, &target, &version)
                            .ok_or(Error::NoHandler)?,
                    );
                }
                // A request parser never produces a status line.
                HttpEvent::StatusLine { .. } => unreachable!(),
                HttpEvent::Header { name, value } => {
                    handler
                        .as_mut()
                        .ok_or(Error::NoHandler)?
                        .on_header(&name, &value);
                }
                HttpEvent::BodyChunk(chunk) => {
                    handler
                        .as_mut()
                        .ok_or(Error::NoHandler)?
                        .on_body_chunk(&chunk);
                }
                HttpEvent::MessageComplete => {
                    let mut current = handler.take().ok_or(Error::NoHandler)?;
                    match current.on_complete()? {
                        Action::Respond(response) => {
                            out.enqueue(response)?;
                            if !config.keep_alive {
                                return Ok(());
                            }
                            parser.reset();
                        }
                        Action::RespondAndClose(response) => {
                            out.enqueue(response)?;
                            return Ok(());
                        }
                        Action::Upgrade { response, handler } => {
                            out.enqueue(response)?;
                            return websocket_loop(reader, buf, handler, out, config).await;
                        }
                    }
                }
            }
        }

        match reader.read(&mut scratch).await {
            Ok(0) => {
                log::debug!("peer closed connection");
                return Ok(());
            }
            Ok(n) => buf.append(&scratch[..n])?,
            Err(err) => {
                log::debug!("read failed: {err}");
                return Ok(());
            }
        }
    }
}

/// WebSocket phase: decodes frames out of the carried-over buffer and every
/// subsequent read, dispatching each to the handler. `on_close` fires on
/// every way out, protocol errors included.
async fn websocket_loop<R>(
    reader: &mut R,
    buf: RecvBuffer,
    mut handler: Box<dyn FrameHandler>,
    out: &Outbound,
    config: &Config,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    // The frame phase must be able to buffer one maximal frame whole.
    let limit = config.max_buffer.max(config.max_payload + MAX_HEAD_SIZE);
    let mut buf = RecvBuffer::from_parts(buf.into_inner(), limit);

    handler.on_open(out);
    let result = frame_loop(reader, &mut buf, handler.as_mut(), out, config, limit).await;
    handler.on_close(out);
    result
}

async fn frame_loop<R>(
    reader: &mut R,
    buf: &mut RecvBuffer,
    handler: &mut dyn FrameHandler,
    out: &Outbound,
    config: &Config,
    limit: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut codec = FrameCodec::new(config.max_payload);
    let mut scratch = vec![0u8; config.read_chunk];

    loop {
        // Frames may already be waiting, starting with any that arrived in
        // the same read as the handshake request.
        while let Some(frame) = codec.decode(buf.bytes_mut())? {
            handler.on_frame(frame, out);
        }

        let n = match reader.read(&mut scratch).await {
            Ok(0) => {
                log::debug!("peer closed websocket");
                return Ok(());
            }
            Ok(n) => n,
            Err(err) => {
                log::debug!("read failed: {err}");
                return Ok(());
            }
        };

        // One read may carry the tail of a maximal frame plus the start of
        // the next, which together exceed the cap. Fill up to the cap, drain
        // complete frames to make room, and fail only when a full buffer
        // holds no decodable frame.
        let mut pending = &scratch[..n];
        while !pending.is_empty() {
            let take = pending.len().min(limit - buf.len());
            buf.append(&pending[..take])?;
            pending = &pending[take..];

            if !pending.is_empty() {
                let mut drained = false;
                while let Some(frame) = codec.decode(buf.bytes_mut())? {
                    drained = true;
                    handler.on_frame(frame, out);
                }
                if !drained {
                    return Err(Error::BufferLimitExceeded(limit));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::{Frame, OpCode},
        handshake::WsUpgrade,
    };
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Hello;

    impl ResponseHandler for Hello {
        fn on_header(&mut self, _name: &[u8], _value: &[u8]) {}

        fn on_complete(&mut self) -> Result<Action> {
            Ok(Action::Respond(Bytes::from_static(
                b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello",
            )))
        }
    }

    struct Echo;

    impl FrameHandler for Echo {
        fn on_frame(&mut self, frame: Frame, out: &Outbound) {
            let _ = out.send_frame(Frame::new(true, frame.opcode, None, frame.payload));
        }
    }

    fn factory() -> Arc<dyn HandlerFactory> {
        Arc::new(
            |_method: &[u8], target: &[u8], _version: &[u8]| -> Option<Box<dyn ResponseHandler>> {
                match target {
                    b"/hello" => Some(Box::new(Hello)),
                    b"/ws" => Some(Box::new(WsUpgrade::new(Echo))),
                    _ => None,
                }
            },
        )
    }

    #[tokio::test]
    async fn serves_two_requests_on_kept_alive_connection() {
        let (mut peer, stream) = tokio::io::duplex(4096);
        let server = tokio::spawn(serve(stream, factory(), Config::default()));

        for _ in 0..2 {
            peer.write_all(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n")
                .await
                .unwrap();
            let mut reply = vec![0u8; 128];
            let n = peer.read(&mut reply).await.unwrap();
            let text = std::str::from_utf8(&reply[..n]).unwrap();
            assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
            assert!(text.ends_with("hello"));
        }

        drop(peer);
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn upgrade_echoes_frames_buffered_with_handshake() {
        let (mut peer, stream) = tokio::io::duplex(4096);
        let server = tokio::spawn(serve(stream, factory(), Config::default()));

        // Handshake request and a masked text frame in a single write, so the
        // frame bytes land in the receive buffer during the HTTP phase.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(
            b"GET /ws HTTP/1.1\r\n\
              Host: x\r\n\
              Upgrade: websocket\r\n\
              Connection: Upgrade\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
              Sec-WebSocket-Version: 13\r\n\r\n",
        );
        bytes.extend_from_slice(&FrameCodec::encode_frame(Frame::new(
            true,
            OpCode::Text,
            Some([1, 2, 3, 4]),
            &b"ping me"[..],
        )));
        peer.write_all(&bytes).await.unwrap();

        // 101 response first.
        let mut head = Vec::new();
        while !head.ends_with(b"\r\n\r\n") {
            let mut byte = [0u8; 1];
            peer.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        let head = String::from_utf8(head).unwrap();
        assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(head.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));

        // Then the echoed (unmasked) frame.
        let mut frame = [0u8; 9];
        peer.read_exact(&mut frame).await.unwrap();
        assert_eq!(&frame[..2], &[0x81, 7]);
        assert_eq!(&frame[2..], b"ping me");

        drop(peer);
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn back_to_back_frames_in_one_read_survive_a_tight_buffer() {
        // Buffer cap sized for a single maximal frame; two full-size frames
        // arriving in one write must still both decode.
        let config = Config {
            max_buffer: 1024,
            max_payload: 1024,
            ..Config::default()
        };
        let (mut peer, stream) = tokio::io::duplex(16 * 1024);
        let server = tokio::spawn(serve(stream, factory(), config));

        peer.write_all(
            b"GET /ws HTTP/1.1\r\n\
              Host: x\r\n\
              Upgrade: websocket\r\n\
              Connection: Upgrade\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .await
        .unwrap();

        let mut head = Vec::new();
        while !head.ends_with(b"\r\n\r\n") {
            let mut byte = [0u8; 1];
            peer.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }

        let mut bytes = Vec::new();
        for fill in [0x11u8, 0x22] {
            bytes.extend_from_slice(&FrameCodec::encode_frame(Frame::new(
                true,
                OpCode::Binary,
                Some([9, 9, 9, 9]),
                &vec![fill; 1024][..],
            )));
        }
        peer.write_all(&bytes).await.unwrap();

        for fill in [0x11u8, 0x22] {
            let mut frame = vec![0u8; 4 + 1024];
            peer.read_exact(&mut frame).await.unwrap();
            assert_eq!(&frame[..4], &[0x82, 126, 4, 0]);
            assert!(frame[4..].iter().all(|&b| b == fill));
        }

        drop(peer);
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn on_close_fires_when_a_protocol_error_tears_down() {
        use std::sync::atomic::{AtomicBool, Ordering};

        struct Watcher(Arc<AtomicBool>);

        impl FrameHandler for Watcher {
            fn on_frame(&mut self, _frame: Frame, _out: &Outbound) {}

            fn on_close(&mut self, _out: &Outbound) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let closed = Arc::new(AtomicBool::new(false));
        let factory: Arc<dyn HandlerFactory> = {
            let closed = Arc::clone(&closed);
            Arc::new(
                move |_method: &[u8],
                      _target: &[u8],
                      _version: &[u8]|
                      -> Option<Box<dyn ResponseHandler>> {
                    Some(Box::new(WsUpgrade::new(Watcher(Arc::clone(&closed)))))
                },
            )
        };

        let config = Config {
            max_payload: 64,
            ..Config::default()
        };
        let (mut peer, stream) = tokio::io::duplex(4096);
        let server = tokio::spawn(serve(stream, factory, config));

        peer.write_all(
            b"GET /ws HTTP/1.1\r\n\
              Host: x\r\n\
              Upgrade: websocket\r\n\
              Connection: Upgrade\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .await
        .unwrap();

        // Header announcing a 2048-byte payload, far over the 64-byte cap.
        peer.write_all(&[0x82, 126, 8, 0]).await.unwrap();

        assert!(matches!(
            server.await.unwrap(),
            Err(Error::FrameTooLarge)
        ));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unrouted_request_is_an_error() {
        let (mut peer, stream) = tokio::io::duplex(4096);
        let server = tokio::spawn(serve(stream, factory(), Config::default()));

        peer.write_all(b"GET /nowhere HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        assert!(matches!(
            server.await.unwrap(),
            Err(Error::NoHandler)
        ));
    }

    #[tokio::test]
    async fn failed_handshake_answers_400_and_closes() {
        let (mut peer, stream) = tokio::io::duplex(4096);
        let server = tokio::spawn(serve(stream, factory(), Config::default()));

        // Missing Sec-WebSocket-Key.
        peer.write_all(
            b"GET /ws HTTP/1.1\r\n\
              Host: x\r\n\
              Upgrade: websocket\r\n\
              Connection: Upgrade\r\n\r\n",
        )
        .await
        .unwrap();

        let mut reply = Vec::new();
        peer.read_to_end(&mut reply).await.unwrap();
        let text = std::str::from_utf8(&reply).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));

        server.await.unwrap().unwrap();
    }
}
