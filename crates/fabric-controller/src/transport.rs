//! The controller's concrete control-channel transport: a WebSocket per
//! router carrying JSON-encoded `ControlMessage`s. Grounded directly on
//! `strata-control/src/ws_agent.rs`'s agent WebSocket handler — same
//! shape (first message is a handshake, then a bidirectional loop fed
//! by an mpsc channel for outgoing traffic), different payloads.
//!
//! This module is plumbing only: `LinkController`/`Network` never see a
//! `WebSocket` directly, only the `ControlChannel` trait.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::StreamExt;
use futures::SinkExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use fabric_common::protocol::{ControlChannel, ControlMessage};
use fabric_common::FabricError;

use crate::accept::{parse_hello, ParsedHello};
use crate::network::Network;

/// `ControlChannel` backed by an mpsc sender into a router's WebSocket
/// write loop. `send` is non-blocking — a full queue surfaces as a send
/// failure rather than blocking the caller, matching spec §7's "no
/// retry at this layer" policy.
pub struct WsControlChannel {
    tx: mpsc::Sender<ControlMessage>,
}

impl ControlChannel for WsControlChannel {
    fn send(&self, msg: ControlMessage) -> Result<(), FabricError> {
        self.tx
            .try_send(msg)
            .map_err(|e| FabricError::ControlChannelSend(e.to_string()))
    }
}

pub async fn handler(
    State(network): State<Arc<Network>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(network, socket))
}

async fn handle_socket(network: Arc<Network>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let first = match ws_rx.next().await {
        Some(Ok(Message::Text(text))) => text,
        _ => return,
    };

    let (router_id, mut outgoing_rx) = match authenticate(&first) {
        Ok((id, parsed, rx, tx)) => {
            let channel: Arc<dyn ControlChannel> = Arc::new(WsControlChannel { tx });
            network.connect_router(
                id.clone(),
                parsed.version,
                parsed.listeners,
                parsed.dialers,
                channel,
            );
            (id, rx)
        }
        Err(err) => {
            warn!(error = %err, "rejecting control channel");
            return;
        }
    };

    info!(router_id = %router_id, "router control channel established");

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_router_message(&network, &text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            msg = outgoing_rx.recv() => {
                match msg {
                    Some(control_msg) => {
                        let json = serde_json::to_string(&control_msg).expect("serializable");
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    network.disconnect_router(&router_id);
    info!(router_id = %router_id, "router control channel closed");
}

/// Decodes and validates the first message of a new connection, which
/// must be a `hello`. Returns the router id, its parsed advertisements,
/// and the receiving/sending halves of the channel `Network` will
/// thread outgoing `Dial`s through.
#[allow(clippy::type_complexity)]
fn authenticate(
    raw: &str,
) -> Result<
    (
        String,
        ParsedHello,
        mpsc::Receiver<ControlMessage>,
        mpsc::Sender<ControlMessage>,
    ),
    FabricError,
> {
    let msg: ControlMessage =
        serde_json::from_str(raw).map_err(|e| FabricError::DecodeFailure(e.to_string()))?;
    let ControlMessage::Hello(headers) = msg else {
        return Err(FabricError::InvalidHello(
            "first message must be hello".into(),
        ));
    };

    // Router id travels out-of-band in real deployments (e.g. from the
    // channel's peer certificate); cryptographic identity is out of scope
    // (spec §1), so the legacy advertisement address stands in as the
    // router's id for this transport.
    let router_id = headers
        .router_advertisement
        .clone()
        .unwrap_or_else(|| "unknown".to_string());

    let parsed = parse_hello(&router_id, headers)?;
    debug!(router_id = %router_id, "hello accepted");

    let (tx, rx) = mpsc::channel(64);
    Ok((router_id, parsed, rx, tx))
}

async fn handle_router_message(network: &Arc<Network>, raw: &str) {
    let msg: ControlMessage = match serde_json::from_str(raw) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "undecodable message from router");
            return;
        }
    };

    match msg {
        ControlMessage::LinkConnected { id } => {
            if let Some(link) = network.link_controller.get(&id) {
                link.add_state(fabric_common::LinkMode::Connected);
                info!(link_id = %id, "link connected");
            }
        }
        ControlMessage::LinkFault { id } => {
            if let Some(link) = network.link_controller.get(&id) {
                link.add_state(fabric_common::LinkMode::Failed);
                network.link_controller.remove(&link);
                warn!(link_id = %id, "link fault reported, removed");
            }
        }
        ControlMessage::RouterLinks(entries) => {
            for entry in entries {
                network.router_reported_link(
                    entry.id,
                    entry.link_protocol,
                    String::new(),
                    entry.dest_router_id,
                );
            }
        }
        other => {
            debug!(?other, "unhandled message from router");
        }
    }
}
