// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The link between one client and the tl-relay.
//!
//! The relay speaks JSON text frames over a WebSocket: the client sends
//! `Hello`, `Publish`, `CatchUp` and `Ping`, and the relay answers with
//! `Welcome`, stamped `Event`s, `CatchUpResponse` and `Pong`. The
//! [`EventChannel`](super::EventChannel) only sees whole protocol messages
//! through the [`Transport`] trait, so its reconnect and fallback logic can
//! run against an in-memory relay in tests.

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use tl_core::protocol::{ClientMessage, ServerMessage};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The relay could not be reached or refused the upgrade.
    #[error("cannot reach relay: {0}")]
    ConnectionFailed(String),

    /// No live link, or the relay went away.
    #[error("relay connection closed")]
    ConnectionClosed,

    #[error("sending to relay failed: {0}")]
    SendFailed(String),

    #[error("reading from relay failed: {0}")]
    ReceiveFailed(String),

    /// A frame that is not a protocol message, in either direction.
    #[error("bad relay frame: {0}")]
    Malformed(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = TransportResult<T>> + Send + 'a>>;

/// A reusable link to the relay.
///
/// `connect` may be called again after `disconnect` or after the relay
/// dropped the link. The channel reconnects through the same value.
pub trait Transport: Send + Sync {
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()>;

    fn disconnect(&mut self) -> TransportFuture<'_, ()>;

    fn send(&mut self, msg: ClientMessage) -> TransportFuture<'_, ()>;

    /// Next message from the relay, `None` once the relay closed the link.
    ///
    /// Must be cancel safe: the channel's select loop drops a pending
    /// `recv` whenever a timer or an outbound event wins.
    fn recv(&mut self) -> TransportFuture<'_, Option<ServerMessage>>;

    fn is_connected(&self) -> bool;
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Relay link over tokio-tungstenite.
#[derive(Default)]
pub struct WebSocketTransport {
    link: Option<Link>,
}

struct Link {
    outgoing: SplitSink<Socket, Message>,
    incoming: SplitStream<Socket>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn link(&mut self) -> TransportResult<&mut Link> {
        self.link.as_mut().ok_or(TransportError::ConnectionClosed)
    }
}

fn encode(msg: &ClientMessage) -> TransportResult<Message> {
    let json = msg
        .to_json()
        .map_err(|e| TransportError::Malformed(e.to_string()))?;
    Ok(Message::Text(json.into()))
}

fn decode(text: &str) -> TransportResult<ServerMessage> {
    ServerMessage::from_json(text).map_err(|e| TransportError::Malformed(e.to_string()))
}

impl Link {
    /// Writes one frame and flushes it, so a dead relay fails this send
    /// instead of the next one.
    async fn write(&mut self, frame: Message) -> TransportResult<()> {
        self.outgoing
            .send(frame)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.outgoing
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Reads up to the next text frame. `Ok(None)` means the relay closed.
    async fn read(&mut self) -> TransportResult<Option<String>> {
        while let Some(frame) = self.incoming.next().await {
            match frame.map_err(|e| TransportError::ReceiveFailed(e.to_string()))? {
                Message::Text(text) => return Ok(Some(text.as_str().to_owned())),
                Message::Close(_) => return Ok(None),
                // WebSocket pings are answered by tungstenite; relay
                // heartbeats travel as protocol messages.
                _ => {}
            }
        }
        Ok(None)
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()> {
        let url = url.to_string();
        Box::pin(async move {
            let (socket, _) = tokio_tungstenite::connect_async(&url)
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            let (outgoing, incoming) = socket.split();
            self.link = Some(Link { outgoing, incoming });
            Ok(())
        })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if let Some(mut link) = self.link.take() {
                // The relay may already be gone.
                let _ = link.outgoing.close().await;
            }
            Ok(())
        })
    }

    fn send(&mut self, msg: ClientMessage) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let frame = encode(&msg)?;
            let result = self.link()?.write(frame).await;
            if result.is_err() {
                self.link = None;
            }
            result
        })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<ServerMessage>> {
        Box::pin(async move {
            match self.link()?.read().await {
                Ok(Some(text)) => decode(&text).map(Some),
                Ok(None) => {
                    self.link = None;
                    Ok(None)
                }
                Err(e) => {
                    self.link = None;
                    Err(e)
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}
