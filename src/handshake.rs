//! WebSocket opening handshake, both sides.
//!
//! The server side validates an upgrade request and produces the
//! `101 Switching Protocols` response; the client side builds the upgrade
//! request and verifies the server's reply. Both hinge on the
//! `Sec-WebSocket-Accept` derivation from [RFC 6455 Section 4.2.2]: the
//! base64-encoded SHA-1 of the client key concatenated with a fixed GUID.
//!
//! [RFC 6455 Section 4.2.2]: https://datatracker.ietf.org/doc/html/rfc6455#section-4.2.2

use base64::prelude::{Engine as _, BASE64_STANDARD};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use url::Url;

use crate::{
    handler::{Action, FrameHandler, ResponseHandler},
    Error, Result,
};

const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Derives the `Sec-WebSocket-Accept` value for a client key.
pub fn accept_key(key: &[u8]) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key);
    sha1.update(WS_GUID);
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Generates a random 16-byte `Sec-WebSocket-Key`, base64-encoded.
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    BASE64_STANDARD.encode(nonce)
}

/// True when a comma-separated header value contains `token`, ignoring case
/// and surrounding whitespace. `Connection: keep-alive, Upgrade` is the
/// motivating shape.
fn header_contains(value: &[u8], token: &str) -> bool {
    value
        .split(|&b| b == b',')
        .any(|part| part.trim_ascii().eq_ignore_ascii_case(token.as_bytes()))
}

/// Serializes the server's `101 Switching Protocols` response.
fn switching_protocols(accept: &str) -> Bytes {
    Bytes::from(format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    ))
}

/// Serializes a `400 Bad Request` response that also closes the connection.
pub fn bad_request() -> Bytes {
    Bytes::from_static(
        b"HTTP/1.1 400 Bad Request\r\n\
          Connection: close\r\n\
          Content-Length: 0\r\n\r\n",
    )
}

/// Serializes the client's upgrade request for `url` with the given key.
pub fn upgrade_request(url: &Url, key: &str) -> Result<Bytes> {
    let host = url.host_str().ok_or(Error::MissingHost)?;
    let host_header = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target = format!("{target}?{query}");
    }

    Ok(Bytes::from(format!(
        "GET {target} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n"
    )))
}

/// Server-side view of an incoming upgrade request's headers.
///
/// Feed every header through [`observe_header`](Self::observe_header); once
/// the request is complete, [`accept`](Self::accept) either yields the 101
/// response or explains why the handshake is invalid.
#[derive(Debug, Default)]
pub struct UpgradeRequest {
    key: Option<Vec<u8>>,
    version: Option<Vec<u8>>,
    upgrade: Option<Vec<u8>>,
    connection: Option<Vec<u8>>,
}

impl UpgradeRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a header if it participates in the handshake; all others are
    /// ignored.
    pub fn observe_header(&mut self, name: &[u8], value: &[u8]) {
        let slot = if name.eq_ignore_ascii_case(b"Sec-WebSocket-Key") {
            &mut self.key
        } else if name.eq_ignore_ascii_case(b"Sec-WebSocket-Version") {
            &mut self.version
        } else if name.eq_ignore_ascii_case(b"Upgrade") {
            &mut self.upgrade
        } else if name.eq_ignore_ascii_case(b"Connection") {
            &mut self.connection
        } else {
            return;
        };
        *slot = Some(value.trim_ascii().to_vec());
    }

    /// Whether the request asked to become a WebSocket at all.
    pub fn is_upgrade(&self) -> bool {
        self.upgrade
            .as_deref()
            .is_some_and(|v| header_contains(v, "websocket"))
    }

    /// Validates the handshake and returns the serialized 101 response.
    pub fn accept(&self) -> Result<Bytes> {
        if !self.is_upgrade() {
            return Err(Error::InvalidUpgradeHeader);
        }
        if !self
            .connection
            .as_deref()
            .is_some_and(|v| header_contains(v, "upgrade"))
        {
            return Err(Error::InvalidConnectionHeader);
        }
        if let Some(version) = &self.version {
            if version.as_slice() != b"13" {
                return Err(Error::InvalidSecWebSocketVersion);
            }
        }
        let key = self.key.as_deref().ok_or(Error::MissingSecWebSocketKey)?;
        Ok(switching_protocols(&accept_key(key)))
    }
}

/// Client-side view of the server's handshake reply.
#[derive(Debug, Default)]
pub struct HandshakeReply {
    status: u16,
    upgrade: Option<Vec<u8>>,
    connection: Option<Vec<u8>>,
    accept: Option<Vec<u8>>,
}

impl HandshakeReply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn observe_header(&mut self, name: &[u8], value: &[u8]) {
        let slot = if name.eq_ignore_ascii_case(b"Upgrade") {
            &mut self.upgrade
        } else if name.eq_ignore_ascii_case(b"Connection") {
            &mut self.connection
        } else if name.eq_ignore_ascii_case(b"Sec-WebSocket-Accept") {
            &mut self.accept
        } else {
            return;
        };
        *slot = Some(value.trim_ascii().to_vec());
    }

    /// Checks the reply against the key we sent.
    pub fn verify(&self, key: &str) -> Result<()> {
        if self.status != 101 {
            return Err(Error::InvalidStatusCode(self.status));
        }
        if !self
            .upgrade
            .as_deref()
            .is_some_and(|v| header_contains(v, "websocket"))
        {
            return Err(Error::InvalidUpgradeHeader);
        }
        if !self
            .connection
            .as_deref()
            .is_some_and(|v| header_contains(v, "upgrade"))
        {
            return Err(Error::InvalidConnectionHeader);
        }
        if self.accept.as_deref() != Some(accept_key(key.as_bytes()).as_bytes()) {
            return Err(Error::InvalidSecWebSocketAccept);
        }
        Ok(())
    }
}

/// A [`ResponseHandler`] that performs the server-side handshake and, on
/// success, upgrades the connection to the wrapped [`FrameHandler`].
///
/// An invalid handshake answers `400 Bad Request` and closes the connection.
pub struct WsUpgrade<H> {
    request: UpgradeRequest,
    handler: Option<H>,
}

impl<H: FrameHandler + 'static> WsUpgrade<H> {
    pub fn new(handler: H) -> Self {
        Self {
            request: UpgradeRequest::new(),
            handler: Some(handler),
        }
    }
}

impl<H: FrameHandler + 'static> ResponseHandler for WsUpgrade<H> {
    fn on_header(&mut self, name: &[u8], value: &[u8]) {
        self.request.observe_header(name, value);
    }

    fn on_complete(&mut self) -> Result<Action> {
        match self.request.accept() {
            Ok(response) => {
                let handler = self.handler.take().ok_or(Error::ConnectionClosed)?;
                Ok(Action::Upgrade {
                    response,
                    handler: Box::new(handler),
                })
            }
            Err(err) => {
                log::warn!("websocket handshake rejected: {err}");
                Ok(Action::RespondAndClose(bad_request()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Key and accept value from RFC 6455 Section 4.2.2.
    const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
    const SAMPLE_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

    fn valid_request() -> UpgradeRequest {
        let mut req = UpgradeRequest::new();
        req.observe_header(b"Host", b"server.example.com");
        req.observe_header(b"Upgrade", b"websocket");
        req.observe_header(b"Connection", b"Upgrade");
        req.observe_header(b"Sec-WebSocket-Key", SAMPLE_KEY.as_bytes());
        req.observe_header(b"Sec-WebSocket-Version", b"13");
        req
    }

    #[test]
    fn test_accept_key_rfc_vector() {
        assert_eq!(accept_key(SAMPLE_KEY.as_bytes()), SAMPLE_ACCEPT);
    }

    #[test]
    fn test_generate_key_is_16_random_bytes() {
        let key = generate_key();
        let decoded = BASE64_STANDARD.decode(&key).unwrap();
        assert_eq!(decoded.len(), 16);
        assert_ne!(generate_key(), key);
    }

    #[test]
    fn test_accept_builds_101_response() {
        let response = valid_request().accept().unwrap();
        let text = std::str::from_utf8(&response).unwrap();

        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains(&format!("Sec-WebSocket-Accept: {SAMPLE_ACCEPT}\r\n")));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_accept_requires_key() {
        let mut req = valid_request();
        req.key = None;
        assert!(matches!(
            req.accept(),
            Err(Error::MissingSecWebSocketKey)
        ));
    }

    #[test]
    fn test_accept_rejects_wrong_version() {
        let mut req = valid_request();
        req.observe_header(b"Sec-WebSocket-Version", b"8");
        assert!(matches!(
            req.accept(),
            Err(Error::InvalidSecWebSocketVersion)
        ));
    }

    #[test]
    fn test_header_matching_is_case_insensitive() {
        let mut req = UpgradeRequest::new();
        req.observe_header(b"UPGRADE", b"WebSocket");
        req.observe_header(b"connection", b"keep-alive, Upgrade");
        req.observe_header(b"sec-websocket-key", SAMPLE_KEY.as_bytes());
        assert!(req.is_upgrade());
        assert!(req.accept().is_ok());
    }

    #[test]
    fn test_upgrade_request_format() {
        let url: Url = "ws://example.com:9001/chat?room=1".parse().unwrap();
        let request = upgrade_request(&url, SAMPLE_KEY).unwrap();
        let text = std::str::from_utf8(&request).unwrap();

        assert!(text.starts_with("GET /chat?room=1 HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.com:9001\r\n"));
        assert!(text.contains(&format!("Sec-WebSocket-Key: {SAMPLE_KEY}\r\n")));
        assert!(text.contains("Sec-WebSocket-Version: 13\r\n"));
    }

    #[test]
    fn test_upgrade_request_needs_a_host() {
        let url: Url = "data:text/plain,hello".parse().unwrap();
        assert!(matches!(
            upgrade_request(&url, SAMPLE_KEY),
            Err(Error::MissingHost)
        ));
    }

    #[test]
    fn test_reply_verify() {
        let mut reply = HandshakeReply::new();
        reply.set_status(101);
        reply.observe_header(b"Upgrade", b"websocket");
        reply.observe_header(b"Connection", b"Upgrade");
        reply.observe_header(b"Sec-WebSocket-Accept", SAMPLE_ACCEPT.as_bytes());

        assert!(reply.verify(SAMPLE_KEY).is_ok());
        assert!(matches!(
            reply.verify("c29tZSBvdGhlciBub25jZSEh"),
            Err(Error::InvalidSecWebSocketAccept)
        ));

        reply.set_status(200);
        assert!(matches!(
            reply.verify(SAMPLE_KEY),
            Err(Error::InvalidStatusCode(200))
        ));
    }
}
