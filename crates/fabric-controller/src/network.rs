//! `Network`: owns the router table and the `LinkController`, and drives
//! the periodic missing-link scan (spec §2 "Controller.Network").

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fabric_common::config::FabricConfig;
use fabric_common::model::{Dialer, Listener};
use fabric_common::protocol::{ControlChannel, ControlMessage, DialRequest};
use fabric_common::{new_link_id, RouterId};
use tracing::{info, warn};

use crate::link_controller::{LinkController, RouterSnapshot};

/// The controller's view of one connected (or previously-connected)
/// router. Cross-references to links are ids, not owning handles — see
/// `router_links::RouterLinksIndex`.
pub struct RouterHandle {
    pub id: RouterId,
    pub version: RwLock<Vec<u8>>,
    pub listeners: RwLock<Vec<Listener>>,
    pub dialers: RwLock<Vec<Dialer>>,
    pub connect_time: RwLock<Option<DateTime<Utc>>>,
    pub control: RwLock<Option<Arc<dyn ControlChannel>>>,
}

impl RouterHandle {
    fn new(id: RouterId) -> Self {
        Self {
            id,
            version: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            dialers: RwLock::new(Vec::new()),
            connect_time: RwLock::new(None),
            control: RwLock::new(None),
        }
    }

    fn snapshot(&self) -> RouterSnapshot {
        RouterSnapshot {
            id: self.id.clone(),
            listeners: self.listeners.read().expect("poisoned").clone(),
            dialers: self.dialers.read().expect("poisoned").clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.control.read().expect("poisoned").is_some()
    }
}

pub struct Network {
    routers: DashMap<RouterId, Arc<RouterHandle>>,
    pub link_controller: LinkController,
    config: FabricConfig,
}

impl Network {
    pub fn new(config: FabricConfig) -> Self {
        Self {
            routers: DashMap::new(),
            link_controller: LinkController::new(),
            config,
        }
    }

    pub fn router(&self, id: &RouterId) -> Option<Arc<RouterHandle>> {
        self.routers.get(id).map(|e| e.value().clone())
    }

    /// Binds a router to its control channel and the listeners/dialers
    /// parsed from its hello. Equivalent to `Network.ConnectRouter(r)`:
    /// the router becomes visible to the next missing-link scan.
    pub fn connect_router(
        &self,
        id: RouterId,
        version: Vec<u8>,
        listeners: Vec<Listener>,
        dialers: Vec<Dialer>,
        channel: Arc<dyn ControlChannel>,
    ) -> Arc<RouterHandle> {
        let handle = self
            .routers
            .entry(id.clone())
            .or_insert_with(|| Arc::new(RouterHandle::new(id.clone())))
            .clone();

        *handle.version.write().expect("poisoned") = version;
        *handle.listeners.write().expect("poisoned") = listeners;
        *handle.dialers.write().expect("poisoned") = dialers;
        *handle.connect_time.write().expect("poisoned") = Some(Utc::now());
        *handle.control.write().expect("poisoned") = Some(channel);

        info!(router_id = %id, "router connected");
        handle
    }

    pub fn disconnect_router(&self, id: &RouterId) {
        if let Some(handle) = self.routers.get(id) {
            *handle.control.write().expect("poisoned") = None;
            info!(router_id = %id, "router disconnected");
        }
    }

    pub fn router_reported_link(
        &self,
        id: String,
        protocol: impl Into<String>,
        src: RouterId,
        dst: RouterId,
    ) {
        self.link_controller.router_reported_link(id, protocol, src, dst);
    }

    /// Runs one missing-link scan: computes the diff, dispatches a `Dial`
    /// to each source router's control channel, and only adds the
    /// resulting `Pending` link to the table once dispatch succeeds.
    /// Returns the number of links dispatched.
    pub fn run_missing_link_scan(&self) -> usize {
        let snapshots: Vec<RouterSnapshot> =
            self.routers.iter().map(|e| e.value().snapshot()).collect();

        let pending = match self
            .link_controller
            .missing_links(&snapshots, self.config.pending_timeout())
        {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "missing-link scan aborted");
                return 0;
            }
        };

        let mut dispatched = 0;
        for link in pending {
            let Some(src_handle) = self.router(&link.src) else {
                continue;
            };
            let Some(channel) = src_handle.control.read().expect("poisoned").clone() else {
                warn!(src = %link.src, "no control channel for dial source, skipping");
                continue;
            };

            let dial = ControlMessage::Dial(DialRequest {
                link_id: link.id.clone(),
                router_id: link.dst.clone(),
                address: String::new(),
                link_protocol: link.protocol.clone(),
                group: link.group.clone(),
                local_binding: link.local_binding.clone(),
                router_version: None,
            });

            match channel.send(dial) {
                Ok(()) => {
                    info!(link_id = %link.id, src = %link.src, dst = %link.dst, "dial dispatched");
                    self.link_controller.add(link);
                    dispatched += 1;
                }
                Err(err) => {
                    warn!(link_id = %link.id, error = %err, "dial dispatch failed");
                }
            }
        }
        dispatched
    }

    pub fn clear_expired_pending(&self) -> usize {
        self.link_controller
            .clear_expired_pending(self.config.pending_timeout())
            .len()
    }

    pub fn config(&self) -> &FabricConfig {
        &self.config
    }
}

/// Allocates a fresh link id for callers outside this crate that need
/// one without reaching into `fabric_common` directly.
pub fn fresh_link_id() -> String {
    new_link_id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_common::testing::InMemoryControlChannel;

    #[test]
    fn scan_dispatches_dial_and_adds_pending_link() {
        let network = Network::new(FabricConfig::default());
        let r0_channel = Arc::new(InMemoryControlChannel::new());
        network.connect_router(
            "r0".into(),
            vec![],
            vec![],
            vec![Dialer::new("lo", "default")],
            r0_channel.clone(),
        );
        network.connect_router(
            "r1".into(),
            vec![],
            vec![Listener::new("tcp:h:1", "tcp", "default", Default::default())],
            vec![],
            Arc::new(InMemoryControlChannel::new()),
        );

        let dispatched = network.run_missing_link_scan();
        assert_eq!(dispatched, 1);
        assert_eq!(r0_channel.len(), 1);
        assert_eq!(network.link_controller.all().len(), 1);

        // A second scan within the pending window doesn't re-dial.
        let dispatched_again = network.run_missing_link_scan();
        assert_eq!(dispatched_again, 0);
        assert_eq!(r0_channel.len(), 1);
    }

    #[test]
    fn scan_skips_router_with_no_control_channel() {
        let network = Network::new(FabricConfig::default());
        // r0 has never connected, so connect_router was never called —
        // missing_links simply has no snapshot for it and no dial fires.
        let dispatched = network.run_missing_link_scan();
        assert_eq!(dispatched, 0);
    }
}
