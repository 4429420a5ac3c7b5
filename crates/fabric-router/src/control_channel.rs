//! The router's outbound control channel to the controller: a
//! `tokio-tungstenite` WebSocket client with reconnect-and-backoff,
//! grounded on `strata-agent/src/control.rs`'s agent connection loop.
//! On every successful (re)connect it sends `hello` and then
//! re-announces its current links via `LinkRegistry::notify_of_reconnect`
//! (spec §8 scenario 6), so the controller's view recovers even if a
//! `RouterLinks` message was lost mid-disconnect.

use std::sync::Arc;
use std::time::Duration;

use fabric_common::protocol::{
    ControlChannel, ControlMessage, DialRequest, HelloHeaders, RouterLinkEntry,
};
use fabric_common::{FabricError, RouterId};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::registry::LinkRegistry;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// `ControlChannel` backed by an mpsc sender feeding the WebSocket
/// write half. Outlives any individual connection attempt — messages
/// sent while disconnected queue until the next reconnect picks them
/// up (bounded, so a long outage eventually sheds load rather than
/// growing without limit).
pub struct WsRouterControlChannel {
    tx: mpsc::Sender<ControlMessage>,
}

impl WsRouterControlChannel {
    pub fn new(tx: mpsc::Sender<ControlMessage>) -> Self {
        Self { tx }
    }
}

impl ControlChannel for WsRouterControlChannel {
    fn send(&self, msg: ControlMessage) -> Result<(), FabricError> {
        self.tx
            .try_send(msg)
            .map_err(|e| FabricError::ControlChannelSend(e.to_string()))
    }
}

/// Runs the connect/reconnect loop against `url` until the process
/// shuts down. Hands incoming `Dial` requests to `dial_tx`; drains
/// `outgoing_rx` for outbound messages queued via `WsRouterControlChannel`.
pub async fn run(
    url: String,
    router_id: RouterId,
    hello: HelloHeaders,
    registry: Arc<LinkRegistry>,
    dial_tx: mpsc::Sender<DialRequest>,
    mut outgoing_rx: mpsc::Receiver<ControlMessage>,
) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        info!(%router_id, %url, "connecting to controller");
        match tokio_tungstenite::connect_async(&url).await {
            Ok((stream, _response)) => {
                backoff = INITIAL_BACKOFF;
                let (mut ws_tx, mut ws_rx) = stream.split();

                let hello_json = serde_json::to_string(&ControlMessage::Hello(hello.clone()))
                    .expect("serializable");
                if ws_tx.send(Message::Text(hello_json.into())).await.is_err() {
                    warn!("failed to send hello, reconnecting");
                    sleep_backoff(&mut backoff).await;
                    continue;
                }

                for link in registry.notify_of_reconnect() {
                    let entry = RouterLinkEntry {
                        id: link.id.clone(),
                        dest_router_id: link.dst.clone(),
                        link_protocol: link.protocol.clone(),
                    };
                    let msg = ControlMessage::RouterLinks(vec![entry]);
                    let json = serde_json::to_string(&msg).expect("serializable");
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }

                loop {
                    tokio::select! {
                        incoming = ws_rx.next() => {
                            match incoming {
                                Some(Ok(Message::Text(text))) => {
                                    handle_controller_message(&text, &dial_tx).await;
                                }
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Err(_)) => break,
                                _ => {}
                            }
                        }
                        outgoing = outgoing_rx.recv() => {
                            match outgoing {
                                Some(msg) => {
                                    let json = serde_json::to_string(&msg).expect("serializable");
                                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                        break;
                                    }
                                }
                                None => return,
                            }
                        }
                    }
                }

                warn!(%router_id, "control channel disconnected, will reconnect");
            }
            Err(err) => {
                warn!(%router_id, error = %err, "connect failed");
            }
        }
        sleep_backoff(&mut backoff).await;
    }
}

async fn sleep_backoff(backoff: &mut Duration) {
    tokio::time::sleep(*backoff).await;
    *backoff = (*backoff * 2).min(MAX_BACKOFF);
}

async fn handle_controller_message(raw: &str, dial_tx: &mpsc::Sender<DialRequest>) {
    let msg: ControlMessage = match serde_json::from_str(raw) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "undecodable message from controller");
            return;
        }
    };

    if let ControlMessage::Dial(request) = msg {
        if dial_tx.send(request).await.is_err() {
            warn!("dial worker pool channel closed, dropping dial request");
        }
    }
}
