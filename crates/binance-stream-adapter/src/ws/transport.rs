/*
[INPUT]:  Fully resolved stream address
[OUTPUT]: Live connection yielding message/error/close events
[POS]:    WebSocket layer - transport seam between channels and the socket library
[UPDATE]: When changing the socket library or frame handling
*/

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::http::{Result, StreamError};

/// Event observed on a live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(String),
    Error(String),
    Close,
}

/// Opens connections to stream addresses
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>>;
}

/// One live connection, exclusively owned by the channel that opened it
#[async_trait]
pub trait Connection: Send {
    /// Wait for the next event. After `Error` or `Close` the connection is finished.
    async fn next_event(&mut self) -> TransportEvent;

    async fn close(&mut self);
}

/// Transport backed by tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|err| StreamError::WebSocket(err.to_string()))?;
        Ok(Box::new(TungsteniteConnection { stream }))
    }
}

struct TungsteniteConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for TungsteniteConnection {
    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return TransportEvent::Message(text.as_str().to_string());
                }
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return TransportEvent::Message(text),
                    Err(err) => {
                        warn!(error = %err, bytes = bytes.len(), "ws binary frame is not utf-8; skipped");
                    }
                },
                // tungstenite answers pings on the next read/write
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {}
                Some(Ok(WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(?frame, "ws close frame received");
                    return TransportEvent::Close;
                }
                Some(Err(err)) => return TransportEvent::Error(err.to_string()),
                None => return TransportEvent::Close,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.stream.close(None).await {
            debug!(error = %err, "ws close handshake failed");
        }
    }
}
