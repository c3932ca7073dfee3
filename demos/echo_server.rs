//! Serves a plain HTTP page on `/` and echoes WebSocket frames on `/ws`.
//!
//! Run with:
//! ```sh
//! cargo run --example echo_server
//! ```

use std::sync::Arc;

use bytes::Bytes;
use skiff::{
    frame::{Frame, OpCode},
    handler::{Action, FrameHandler, HandlerFactory, ResponseHandler},
    handshake::WsUpgrade,
    outbound::Outbound,
    Config, Server,
};

struct Echo;

impl FrameHandler for Echo {
    fn on_frame(&mut self, frame: Frame, out: &Outbound) {
        log::info!("frame: {:?}, {} bytes", frame.opcode, frame.payload.len());
        let reply = match frame.opcode {
            OpCode::Ping => Frame::pong(frame.payload),
            OpCode::Close => Frame::close(frame.payload),
            _ => Frame::new(frame.fin, frame.opcode, None, frame.payload),
        };
        let _ = out.send_frame(reply);
    }

    fn on_close(&mut self, _out: &Outbound) {
        log::info!("websocket closed");
    }
}

struct Index;

impl ResponseHandler for Index {
    fn on_header(&mut self, _name: &[u8], _value: &[u8]) {}

    fn on_complete(&mut self) -> skiff::Result<Action> {
        let body = "<html><body>Connect a WebSocket to /ws</body></html>";
        Ok(Action::Respond(Bytes::from(format!(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/html\r\n\
             Content-Length: {}\r\n\r\n{body}",
            body.len(),
        ))))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init()?;

    let factory: Arc<dyn HandlerFactory> = Arc::new(
        |_method: &[u8], target: &[u8], _version: &[u8]| -> Option<Box<dyn ResponseHandler>> {
            match target {
                b"/" => Some(Box::new(Index)),
                b"/ws" => Some(Box::new(WsUpgrade::new(Echo))),
                _ => None,
            }
        },
    );

    let server = Server::bind("127.0.0.1:8080", factory, Config::default()).await?;
    log::info!("listening on {}", server.local_addr()?);
    server.run().await?;
    Ok(())
}
