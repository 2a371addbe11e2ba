// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket server implementation.
//!
//! Each connection gets its own task. The task forwards relay broadcasts to
//! its client and answers the client's requests directly.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use tl_core::protocol::{ClientMessage, ServerMessage};
use tl_core::{DomainEvent, EventPayload};

use crate::state::RelayState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Run the WebSocket server on the given address.
pub async fn run(addr: SocketAddr, state: RelayState) -> Result<(), BoxError> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on: {}", addr);
    serve(listener, state).await
}

/// Accepts connections on an already bound listener.
pub async fn serve(listener: TcpListener, state: RelayState) -> Result<(), BoxError> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: RelayState,
) -> Result<(), BoxError> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    info!("New WebSocket connection from: {}", peer_addr);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    let (mut broadcast_rx, _) = state.subscribe();
    let mut client_id: Option<String> = None;

    let result: Result<(), BoxError> = async {
        loop {
            tokio::select! {
                msg = ws_stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_message(&text, &state, &mut client_id) {
                            ws_sink.send(Message::Text(reply.to_json()?.into())).await?;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", peer_addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_sink.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", peer_addr, e);
                        break;
                    }
                    None => {
                        info!("Client {} stream ended", peer_addr);
                        break;
                    }
                },
                broadcast = broadcast_rx.recv() => match broadcast {
                    Ok(msg) => {
                        if let Err(e) = ws_sink.send(Message::Text(msg.to_json()?.into())).await {
                            warn!("Failed to send broadcast to {}: {}", peer_addr, e);
                            break;
                        }
                    }
                    // The client notices the gap and catches up on reconnect.
                    Err(RecvError::Lagged(n)) => {
                        warn!("Client {} lagged by {} events, dropping it", peer_addr, n);
                        break;
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        Ok(())
    }
    .await;

    if let Some(id) = client_id {
        if state.leave(&id) {
            info!("{} left ({} peers)", id, state.peer_count());
            state.publish(DomainEvent::new(
                id.clone(),
                EventPayload::PeerLeft { client_id: id },
            ));
        }
    }
    info!("Connection closed: {}", peer_addr);
    result
}

/// Process a client message and return the direct reply, if any.
///
/// Published events are answered through the broadcast instead.
pub(crate) fn handle_client_message(
    text: &str,
    state: &RelayState,
    client_id: &mut Option<String>,
) -> Option<ServerMessage> {
    let msg = match ClientMessage::from_json(text) {
        Ok(msg) => msg,
        Err(e) => return Some(ServerMessage::error(format!("malformed message: {}", e))),
    };

    match msg {
        ClientMessage::Hello { client_id: id } => {
            let latest = state.latest_id();
            let previous = client_id.replace(id.clone());
            if let Some(previous) = previous.filter(|p| *p != id) {
                state.leave(&previous);
            }
            if state.join(&id) {
                info!("{} joined ({} peers)", id, state.peer_count());
                state.publish(DomainEvent::new(
                    id.clone(),
                    EventPayload::PeerJoined {
                        client_id: id.clone(),
                    },
                ));
            }
            Some(ServerMessage::welcome(id, latest))
        }

        ClientMessage::Publish { event } => {
            if client_id.is_none() {
                return Some(ServerMessage::error("publish before hello"));
            }
            let stamped = state.publish(event);
            debug!("relayed {} #{} from {}", stamped.kind(), stamped.id, stamped.origin);
            None
        }

        ClientMessage::CatchUp { after } => {
            let events = state.since(after);
            debug!("catch-up after #{}: {} events", after, events.len());
            Some(ServerMessage::catch_up_response(events))
        }

        ClientMessage::Ping { id } => Some(ServerMessage::pong(id)),
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
