//! Connects to a WebSocket echo endpoint, sends a message and a ping, and
//! prints what comes back.
//!
//! Run with:
//! ```sh
//! cargo run --example echo_client [ws://127.0.0.1:8080/ws]
//! ```

use futures::StreamExt;
use skiff::{
    client::WsClient,
    frame::{Frame, OpCode},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init()?;

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8080/ws".to_string());

    let mut ws = WsClient::connect(url.parse()?).await?;
    ws.send(Frame::text("hello over websocket")).await?;
    ws.send(Frame::ping("anyone home?")).await?;

    let mut pending = 2;
    while let Some(frame) = ws.next().await {
        let frame = frame?;
        match frame.opcode {
            OpCode::Text => {
                log::info!("text: {}", String::from_utf8_lossy(&frame.payload));
            }
            OpCode::Pong => {
                log::info!("pong: {}", String::from_utf8_lossy(&frame.payload));
            }
            OpCode::Close => {
                log::info!("close from server");
                break;
            }
            other => log::info!("frame: {other:?}"),
        }

        pending -= 1;
        if pending == 0 {
            ws.close().await?;
        }
    }

    Ok(())
}
