//! Incremental HTTP/1.1 message parser.
//!
//! [`HttpParser`] is a finite state machine fed from a [`RecvBuffer`]. It
//! never reads past buffered data: [`HttpParser::next_event`] returns
//! `Ok(None)` whenever the next unit (line or body run) is incomplete, and is
//! simply called again after the next transport read. The same machine parses
//! server-side requests and client-side responses; only the interpretation of
//! the start line differs.
//!
//! Header and body bytes are handed out in wire order as owned [`Bytes`]
//! split off the buffer, so no event outlives or aliases the parse state.

use bytes::{Buf, Bytes, BytesMut};

use crate::{buffer::RecvBuffer, Error, Result};

/// Which flavor of start line the parser expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageKind {
    /// `METHOD SP TARGET SP VERSION` — server side.
    Request,
    /// `VERSION SP STATUS SP REASON` — client side.
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    StartLine,
    Headers,
    Body,
    /// Body fully consumed; `MessageComplete` is the next event.
    Eom,
    Done,
}

/// One parsed unit of an HTTP message, in wire order.
#[derive(Debug, PartialEq, Eq)]
pub enum HttpEvent {
    /// First line of a request.
    RequestLine {
        method: Bytes,
        target: Bytes,
        version: Bytes,
    },
    /// First line of a response.
    StatusLine {
        version: Bytes,
        status: u16,
        reason: Bytes,
    },
    /// A single header pair. Every header is forwarded, including the ones
    /// the parser itself inspects (`Content-Length`).
    Header { name: Bytes, value: Bytes },
    /// A run of body bytes. The sum of all chunks equals the declared
    /// `Content-Length` exactly.
    BodyChunk(Bytes),
    /// The message is complete; no further events until [`HttpParser::reset`].
    MessageComplete,
}

/// Incremental request/response parser.
pub struct HttpParser {
    kind: MessageKind,
    state: ParseState,
    remaining_body: usize,
}

impl HttpParser {
    /// Parser for incoming requests (server side).
    pub fn request() -> Self {
        Self::new(MessageKind::Request)
    }

    /// Parser for incoming responses (client side).
    pub fn response() -> Self {
        Self::new(MessageKind::Response)
    }

    fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            state: ParseState::StartLine,
            remaining_body: 0,
        }
    }

    /// Whether the current message has been fully parsed.
    pub fn is_complete(&self) -> bool {
        self.state == ParseState::Done
    }

    /// Re-arms the parser for the next message on a kept-alive connection.
    pub fn reset(&mut self) {
        self.state = ParseState::StartLine;
        self.remaining_body = 0;
    }

    /// Pulls the next event out of `buf`.
    ///
    /// `Ok(None)` means more bytes are needed; nothing has been consumed that
    /// the caller could still act on. Errors are terminal: the connection must
    /// be closed and no further events will be produced.
    pub fn next_event(&mut self, buf: &mut RecvBuffer) -> Result<Option<HttpEvent>> {
        loop {
            match self.state {
                ParseState::StartLine => {
                    let Some(line) = buf.take_line() else {
                        return Ok(None);
                    };
                    let event = self.parse_start_line(line)?;
                    self.state = ParseState::Headers;
                    return Ok(Some(event));
                }
                ParseState::Headers => {
                    let Some(line) = buf.take_line() else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        if self.remaining_body == 0 {
                            self.state = ParseState::Done;
                            return Ok(Some(HttpEvent::MessageComplete));
                        }
                        // Body bytes may already sit in the buffer if they
                        // arrived in the same read as the blank line.
                        self.state = ParseState::Body;
                        continue;
                    }
                    return Ok(Some(self.parse_header(line)?));
                }
                ParseState::Body => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let n = buf.len().min(self.remaining_body);
                    let chunk = buf.take_bytes(n).freeze();
                    self.remaining_body -= n;
                    if self.remaining_body == 0 {
                        self.state = ParseState::Eom;
                    }
                    return Ok(Some(HttpEvent::BodyChunk(chunk)));
                }
                ParseState::Eom => {
                    self.state = ParseState::Done;
                    return Ok(Some(HttpEvent::MessageComplete));
                }
                ParseState::Done => return Ok(None),
            }
        }
    }

    fn parse_start_line(&self, mut line: BytesMut) -> Result<HttpEvent> {
        let first_sp = line
            .iter()
            .position(|&b| b == b' ')
            .ok_or(Error::MalformedStartLine)?;
        let first = line.split_to(first_sp).freeze();
        line.advance(1);

        let second_sp = line
            .iter()
            .position(|&b| b == b' ')
            .ok_or(Error::MalformedStartLine)?;
        let second = line.split_to(second_sp).freeze();
        line.advance(1);

        let rest = line.freeze();

        Ok(match self.kind {
            MessageKind::Request => HttpEvent::RequestLine {
                method: first,
                target: second,
                version: rest,
            },
            MessageKind::Response => {
                let status = std::str::from_utf8(&second)
                    .ok()
                    .and_then(|s| s.parse::<u16>().ok())
                    .ok_or(Error::MalformedStartLine)?;
                HttpEvent::StatusLine {
                    version: first,
                    status,
                    reason: rest,
                }
            }
        })
    }

    fn parse_header(&mut self, mut line: BytesMut) -> Result<HttpEvent> {
        let sep = line
            .windows(2)
            .position(|w| w == b": ")
            .ok_or(Error::MalformedHeader)?;
        let name = line.split_to(sep).freeze();
        line.advance(2);
        let value = line.freeze();

        if name.eq_ignore_ascii_case(b"content-length") {
            self.remaining_body = std::str::from_utf8(&value)
                .ok()
                .and_then(|s| s.trim().parse::<usize>().ok())
                .ok_or(Error::InvalidContentLength)?;
        }

        Ok(HttpEvent::Header { name, value })
    }
}
