//! # skiff
//! An embedded-friendly HTTP/1.1 and WebSocket (RFC 6455) protocol engine.
//!
//! The crate is built around an incremental parsing core that never assumes
//! anything about how bytes arrive from the transport: a read may deliver half
//! a header line, three complete frames, or the tail of a body followed by the
//! start of the next request. Every component picks up exactly where it left
//! off on the next read.
//!
//! The moving parts, leaf first:
//!
//! - [`buffer::RecvBuffer`]: a growable receive buffer with line- and
//!   byte-oriented extraction from the front.
//! - [`http::HttpParser`]: a state machine turning buffered bytes into
//!   request/status lines, header pairs and body chunks.
//! - [`codec::FrameCodec`]: the RFC 6455 frame decoder/encoder, including
//!   masking and the 16/64-bit extended payload lengths.
//! - [`connection`]: the per-connection orchestrator sequencing HTTP parse →
//!   handler dispatch → optional WebSocket handoff → frame loop.
//! - [`outbound::Outbound`]: the per-connection send queue guaranteeing a
//!   single write in flight and enqueue-order delivery.
//!
//! # Server example
//! ```no_run
//! use skiff::{Server, connection::Config, handshake::WsUpgrade};
//! use skiff::handler::{ResponseHandler, FrameHandler};
//! use skiff::frame::Frame;
//! use skiff::outbound::Outbound;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl FrameHandler for Echo {
//!     fn on_frame(&mut self, frame: Frame, out: &Outbound) {
//!         let _ = out.send_frame(Frame::new(true, frame.opcode, None, frame.payload));
//!     }
//! }
//!
//! # async fn run() -> skiff::Result<()> {
//! let factory = Arc::new(|_method: &[u8], path: &[u8], _version: &[u8]| {
//!     (path == b"/ws").then(|| {
//!         Box::new(WsUpgrade::new(Echo)) as Box<dyn ResponseHandler>
//!     })
//! });
//!
//! Server::bind("0.0.0.0:8080", factory, Config::default())
//!     .await?
//!     .run()
//!     .await
//! # }
//! ```
//!
//! # Client example
//! ```no_run
//! use futures::StreamExt;
//! use skiff::{client::WsClient, frame::Frame};
//!
//! # async fn run() -> skiff::Result<()> {
//! let mut ws = WsClient::connect("wss://echo.websocket.org".parse()?).await?;
//! ws.send(Frame::text("hello")).await?;
//!
//! while let Some(frame) = ws.next().await {
//!     println!("{:?}", frame?.opcode);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Memory safety
//! The receive buffer and the frame decoder both enforce configurable size
//! limits (1 MiB by default), so a peer that trickles an endless header line
//! or announces a giant frame gets its connection closed instead of growing
//! the heap without bound.

pub mod buffer;
pub mod client;
pub mod codec;
pub mod connection;
pub mod frame;
pub mod handler;
pub mod handshake;
pub mod http;
mod mask;
pub mod outbound;
pub mod server;
pub mod stream;

use thiserror::Error;

pub use connection::Config;
pub use frame::{Frame, OpCode};
pub use server::Server;

/// A result type for protocol operations, using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the protocol engine.
///
/// The variants fall into three groups, matching how they are handled:
///
/// - HTTP protocol violations (`MalformedStartLine`, `MalformedHeader`,
///   `InvalidContentLength`, `NoHandler`): terminal, the connection is closed
///   without attempting a response.
/// - Handshake failures (`MissingSecWebSocketKey`, `InvalidUpgradeHeader`,
///   ...): reported to the peer as an HTTP 400 on the server side, or
///   returned from [`client::WsClient::connect`] on the client side.
/// - Transport and resource errors (`Io`, `BufferLimitExceeded`,
///   `FrameTooLarge`, `ConnectionClosed`): terminal for the connection.
///
/// "Not enough bytes buffered yet" is deliberately absent: incremental
/// operations signal it with `Ok(None)` and are simply retried after the next
/// read.
#[derive(Error, Debug)]
pub enum Error {
    /// An HTTP start line did not contain the two spaces separating its three
    /// fields.
    #[error("malformed start line")]
    MalformedStartLine,

    /// A header line did not contain the `": "` name/value separator.
    #[error("malformed header line")]
    MalformedHeader,

    /// A `Content-Length` header value was not an unsigned integer.
    #[error("invalid Content-Length value")]
    InvalidContentLength,

    /// The application factory declined to produce a handler for a request
    /// line. Treated like a protocol violation: the connection is closed.
    #[error("no handler for request")]
    NoHandler,

    /// The receive buffer would exceed its configured cap. Protects against
    /// peers that never terminate a header line or frame.
    #[error("receive buffer limit exceeded ({0} bytes)")]
    BufferLimitExceeded(usize),

    /// A frame announced a payload length above the configured maximum.
    #[error("frame too large")]
    FrameTooLarge,

    /// The handshake response carried a status other than 101.
    #[error("invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// The `Upgrade` header is missing or does not contain "websocket".
    #[error("invalid upgrade header")]
    InvalidUpgradeHeader,

    /// The `Connection` header is missing or does not contain "upgrade".
    #[error("invalid connection header")]
    InvalidConnectionHeader,

    /// The client request did not carry a `Sec-WebSocket-Key` header.
    #[error("Sec-WebSocket-Key header is missing")]
    MissingSecWebSocketKey,

    /// The `Sec-WebSocket-Version` header is present but not "13".
    #[error("Sec-WebSocket-Version must be 13")]
    InvalidSecWebSocketVersion,

    /// The server's `Sec-WebSocket-Accept` does not match the key we sent.
    #[error("Sec-WebSocket-Accept mismatch")]
    InvalidSecWebSocketAccept,

    /// A client URL used a scheme other than `ws` or `wss`.
    #[error("invalid http scheme")]
    InvalidHttpScheme,

    /// A client URL carried no host to connect to.
    #[error("url has no host")]
    MissingHost,

    /// An operation was attempted on a connection that has been torn down.
    #[error("connection is closed")]
    ConnectionClosed,

    /// Transport-level I/O failure. Always terminal for the connection.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A client URL failed to parse.
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
}
