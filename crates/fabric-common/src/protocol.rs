//! Control-channel messages (spec §6). The wire encoding of the
//! control channel itself is out of scope (spec §1) — this module only
//! fixes the message shapes and the `ControlChannel` trait through
//! which the core interacts with whatever transport carries them.

use serde::{Deserialize, Serialize};

use crate::ids::{LinkId, RouterId};
use crate::model::{Dialer, Listener};

/// Router → controller hello headers sent once at accept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelloHeaders {
    /// `HelloVersionHeader` — required, opaque version blob.
    pub version: Option<Vec<u8>>,
    /// `ListenersHeader` — preferred source of listener advertisements.
    pub listeners: Option<Vec<Listener>>,
    /// `HelloRouterAdvertisementsHeader` — legacy single-address fallback.
    pub router_advertisement: Option<String>,
    /// `DialersHeader`.
    pub dialers: Option<Vec<Dialer>>,
}

/// One entry of a `RouterLinks` re-announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterLinkEntry {
    pub id: LinkId,
    pub dest_router_id: RouterId,
    pub link_protocol: String,
}

/// All control-channel message types exchanged between a router and the
/// controller (spec §6 table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ControlMessage {
    #[serde(rename = "hello")]
    Hello(HelloHeaders),

    #[serde(rename = "dial")]
    Dial(DialRequest),

    #[serde(rename = "link.connected")]
    LinkConnected { id: LinkId },

    #[serde(rename = "router.links")]
    RouterLinks(Vec<RouterLinkEntry>),

    #[serde(rename = "link.fault")]
    LinkFault { id: LinkId },
}

/// Controller → router `Dial` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialRequest {
    pub link_id: LinkId,
    pub router_id: RouterId,
    pub address: String,
    pub link_protocol: String,
    pub group: String,
    pub local_binding: String,
    pub router_version: Option<Vec<u8>>,
}

/// The boundary through which `LinkController` and `LinkRegistry` emit
/// messages to their peer, without depending on how those messages
/// actually cross the wire. `send` is expected to be non-blocking
/// (backed by a bounded queue); callers log and move on on failure per
/// spec §7 — there is no retry at this layer.
pub trait ControlChannel: Send + Sync {
    fn send(&self, msg: ControlMessage) -> Result<(), crate::error::FabricError>;
}
