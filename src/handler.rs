//! Application-facing traits for serving HTTP requests and WebSocket frames.
//!
//! A [`HandlerFactory`] maps each request line to a [`ResponseHandler`], which
//! receives the headers and body incrementally and finishes by returning an
//! [`Action`]: a plain response, a response followed by teardown, or an
//! upgrade that hands the connection to a [`FrameHandler`].

use bytes::Bytes;

use crate::{frame::Frame, outbound::Outbound, Result};

/// Routes request lines to response handlers.
///
/// Called once per request as soon as the request line is parsed, before any
/// headers. Returning `None` rejects the request and closes the connection.
///
/// Implemented for closures, so a router can be as small as:
///
/// ```
/// use skiff::handler::{HandlerFactory, ResponseHandler};
///
/// let factory = |method: &[u8], path: &[u8], _version: &[u8]| -> Option<Box<dyn ResponseHandler>> {
///     if method == b"GET" && path == b"/health" {
///         // ... construct and return a handler
///     }
///     None
/// };
/// # let _: &dyn HandlerFactory = &factory;
/// ```
pub trait HandlerFactory: Send + Sync {
    /// Produces the handler for a request, or `None` if the request is not
    /// served.
    fn make_handler(
        &self,
        method: &[u8],
        target: &[u8],
        version: &[u8],
    ) -> Option<Box<dyn ResponseHandler>>;
}

impl<F> HandlerFactory for F
where
    F: Fn(&[u8], &[u8], &[u8]) -> Option<Box<dyn ResponseHandler>> + Send + Sync,
{
    fn make_handler(
        &self,
        method: &[u8],
        target: &[u8],
        version: &[u8],
    ) -> Option<Box<dyn ResponseHandler>> {
        self(method, target, version)
    }
}

/// What the connection does once a handler has seen the complete request.
pub enum Action {
    /// Write the response bytes, then await the next request on the same
    /// connection (subject to the keep-alive setting).
    Respond(Bytes),
    /// Write the response bytes, then close the connection.
    RespondAndClose(Bytes),
    /// Write the `101 Switching Protocols` response, then hand the connection
    /// (including any already-buffered bytes) to the frame handler.
    Upgrade {
        response: Bytes,
        handler: Box<dyn FrameHandler>,
    },
}

/// Receives one HTTP request incrementally and decides how to answer it.
///
/// The connection drives the handler in order: zero or more
/// [`on_header`](Self::on_header) calls, zero or more
/// [`on_body_chunk`](Self::on_body_chunk) calls, then exactly one
/// [`on_complete`](Self::on_complete).
pub trait ResponseHandler: Send {
    /// Called for each header line. Name casing is preserved from the wire.
    fn on_header(&mut self, name: &[u8], value: &[u8]);

    /// Called for each run of body bytes as it arrives. Handlers that expect
    /// no body can keep the default no-op.
    fn on_body_chunk(&mut self, chunk: &[u8]) {
        let _ = chunk;
    }

    /// Called once the full request has been received. An `Err` tears the
    /// connection down without a response.
    fn on_complete(&mut self) -> Result<Action>;
}

/// Receives WebSocket frames after an upgrade.
///
/// Outgoing frames go through the [`Outbound`] handle, which can also be
/// cloned out of the handler and used from other tasks.
pub trait FrameHandler: Send {
    /// Called once, right after the `101` response is enqueued and before any
    /// frame. A good place to stash a clone of the [`Outbound`] handle or
    /// send a greeting.
    fn on_open(&mut self, out: &Outbound) {
        let _ = out;
    }

    /// Called for every decoded frame, including control frames. Ping/pong
    /// and close replies are the handler's responsibility.
    fn on_frame(&mut self, frame: Frame, out: &Outbound);

    /// Called once when the peer disconnects or the connection is torn down.
    /// No further frames follow.
    fn on_close(&mut self, out: &Outbound) {
        let _ = out;
    }
}
