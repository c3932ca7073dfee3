//! WebSocket client.
//!
//! [`WsClient::connect`] dials `ws://` or `wss://`, performs the opening
//! handshake with the same incremental HTTP parser the server uses, and
//! yields a [`futures::Stream`] of frames. Bytes the server sends in the same
//! read as its `101` response are preserved: the receive buffer's remainder
//! seeds the framed stream.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{SinkExt, Stream};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_util::codec::{Framed, FramedParts};
use url::Url;

use crate::{
    buffer::RecvBuffer,
    codec::FrameCodec,
    connection::Config,
    frame::Frame,
    handshake::{self, HandshakeReply},
    http::{HttpEvent, HttpParser},
    stream::{tls_connector, MaybeTlsStream},
    Error, Result,
};

/// A connected WebSocket client.
///
/// Incoming frames arrive through the [`Stream`] impl; outgoing frames go
/// through [`send`](Self::send), which masks them with a fresh random key as
/// the protocol requires of clients.
pub struct WsClient<S = MaybeTlsStream> {
    framed: Framed<S, FrameCodec>,
}

impl WsClient<MaybeTlsStream> {
    /// Connects to a `ws://` or `wss://` URL with default settings.
    pub async fn connect(url: Url) -> Result<Self> {
        Self::connect_with_config(url, Config::default()).await
    }

    /// Connects with explicit per-connection settings.
    pub async fn connect_with_config(url: Url, config: Config) -> Result<Self> {
        let host = url.host_str().ok_or(Error::MissingHost)?.to_string();
        let port = url.port_or_known_default().ok_or(Error::InvalidHttpScheme)?;

        let tcp_stream = TcpStream::connect((host.as_str(), port)).await?;

        let io = match url.scheme() {
            "ws" => MaybeTlsStream::Plain(tcp_stream),
            "wss" => {
                let connector = tls_connector();
                let domain = ServerName::try_from(host)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid dnsname"))?;

                MaybeTlsStream::Tls(Box::new(connector.connect(domain, tcp_stream).await?))
            }
            _ => return Err(Error::InvalidHttpScheme),
        };

        Self::handshake(url, io, config).await
    }
}

impl<S> WsClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Performs the opening handshake over an existing connection.
    pub async fn handshake(url: Url, mut io: S, config: Config) -> Result<Self> {
        let key = handshake::generate_key();
        io.write_all(&handshake::upgrade_request(&url, &key)?)
            .await?;

        let mut buf = RecvBuffer::new(config.max_buffer);
        let mut parser = HttpParser::response();
        let mut reply = HandshakeReply::new();
        let mut scratch = vec![0u8; config.read_chunk];

        'reply: loop {
            while let Some(event) = parser.next_event(&mut buf)? {
                match event {
                    HttpEvent::StatusLine { status, .. } => reply.set_status(status),
                    HttpEvent::Header { name, value } => reply.observe_header(&name, &value),
                    HttpEvent::BodyChunk(_) => {}
                    HttpEvent::MessageComplete => break 'reply,
                    // A response parser never produces a request line.
                    HttpEvent::RequestLine { .. } => unreachable!(),
                }
            }

            let n = io.read(&mut scratch).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            buf.append(&scratch[..n])?;
        }

        reply.verify(&key)?;
        log::debug!("websocket handshake complete: {url}");

        // Frames the server sent right behind the 101 are already in the
        // buffer; hand them to the framed stream instead of dropping them.
        let mut parts = FramedParts::new::<Frame>(io, FrameCodec::new(config.max_payload));
        parts.read_buf = buf.into_inner();

        Ok(Self {
            framed: Framed::from_parts(parts),
        })
    }

    /// Sends a frame, masking it with a fresh random key unless the caller
    /// set one.
    pub async fn send(&mut self, mut frame: Frame) -> Result<()> {
        if frame.mask.is_none() {
            frame.mask = Some(rand::random());
        }
        self.framed.send(frame).await
    }

    /// Sends a normal-closure close frame and shuts the connection down.
    pub async fn close(&mut self) -> Result<()> {
        self.send(Frame::close_with(1000, "")).await?;
        self.framed.close().await
    }
}

impl<S> Stream for WsClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Item = Result<Frame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.framed).poll_next(cx)
    }
}
