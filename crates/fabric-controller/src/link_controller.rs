//! The authoritative registry of links in the fabric (spec §4.1):
//! create/remove, the missing-link scanner, and pending-link expiry.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fabric_common::{model::Dialer, model::Listener, FabricError, Link, LinkId, LinkMode, RouterId};
use tracing::{debug, info, warn};

use crate::link_table::LinkTable;
use crate::router_links::RouterLinksIndex;

/// A router's advertised capabilities, as needed by the missing-link
/// scan. Built by `Network` from its live router table each scan.
#[derive(Debug, Clone)]
pub struct RouterSnapshot {
    pub id: RouterId,
    pub listeners: Vec<Listener>,
    pub dialers: Vec<Dialer>,
}

pub struct LinkController {
    table: LinkTable,
    index: RouterLinksIndex,
    /// Serializes `router_reported_link` against racing reports of the
    /// same id (spec §4.1 "Concurrency").
    report_lock: Mutex<()>,
}

impl Default for LinkController {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkController {
    pub fn new() -> Self {
        Self {
            table: LinkTable::new(),
            index: RouterLinksIndex::new(),
            report_lock: Mutex::new(()),
        }
    }

    /// Inserts `link` into the table and both endpoint indices.
    /// Idempotent only via `has` — callers must check.
    pub fn add(&self, link: Arc<Link>) {
        self.index.add(&link.src, &link.id);
        self.index.add(&link.dst, &link.id);
        self.table.put(link);
    }

    pub fn has(&self, link: &Link) -> bool {
        self.table.contains(&link.id)
    }

    pub fn get(&self, id: &LinkId) -> Option<Arc<Link>> {
        self.table.get(id)
    }

    /// Snapshot list; order unspecified.
    pub fn all(&self) -> Vec<Arc<Link>> {
        self.table.snapshot()
    }

    /// Removes `link` from the table and both endpoint indices. Silent
    /// if absent.
    pub fn remove(&self, link: &Link) {
        self.index.remove(&link.src, &link.id);
        self.index.remove(&link.dst, &link.id);
        self.table.delete(&link.id);
    }

    /// Returns the existing link if `id` is already known, else creates
    /// one born `Connected`. Serialized against concurrent reports of the
    /// same id.
    pub fn router_reported_link(
        &self,
        id: LinkId,
        protocol: impl Into<String>,
        src: RouterId,
        dst: RouterId,
    ) -> (Arc<Link>, bool) {
        let _guard = self.report_lock.lock().expect("report lock poisoned");
        if let Some(existing) = self.table.get(&id) {
            return (existing, false);
        }
        let link = Arc::new(Link::new(
            id.clone(),
            src.clone(),
            dst.clone(),
            protocol,
            fabric_common::model::DEFAULT_GROUP,
            String::new(),
            false,
            0,
        ));
        link.add_state(LinkMode::Connected);
        info!(link_id = %id, %src, %dst, "router-reported link recorded");
        self.add(link.clone());
        (link, true)
    }

    /// Deduplicated list of routers reachable from `router` via any
    /// usable link.
    pub fn connected_neighbors_of_router(&self, router: &RouterId) -> Vec<RouterId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for id in self.index.get_links(router) {
            let Some(link) = self.table.get(&id) else {
                continue;
            };
            if !link.is_usable() {
                continue;
            }
            if let Some(other) = link.other_end(router) {
                if seen.insert(other.clone()) {
                    out.push(other.clone());
                }
            }
        }
        out
    }

    /// The usable link with minimum cost between `a` and `b`, or `None`.
    /// Either endpoint may be named `b` — spec §9 flags the original's
    /// two symmetric branches as collapsible; `Link::connects` already
    /// treats the pair as unordered.
    pub fn least_expensive_link(&self, a: &RouterId, b: &RouterId) -> Option<Arc<Link>> {
        self.index
            .get_links(a)
            .into_iter()
            .filter_map(|id| self.table.get(&id))
            .filter(|link| link.is_usable() && link.connects(a, b))
            .min_by_key(|link| link.get_cost())
    }

    fn has_link(
        &self,
        a: &RouterId,
        b: &RouterId,
        group: &str,
        pending_limit: DateTime<Utc>,
    ) -> bool {
        self.index
            .get_links(a)
            .into_iter()
            .filter_map(|id| self.table.get(&id))
            .any(|link| link.connects(a, b) && link.group == group && link.is_present(pending_limit))
    }

    /// For each ordered pair of distinct routers and each listener the
    /// destination advertises, creates a fresh `Pending` link if one
    /// isn't already present or converging. Does not add the link to the
    /// table — the caller does so after successfully dispatching the
    /// dial command.
    pub fn missing_links(
        &self,
        routers: &[RouterSnapshot],
        pending_timeout: Duration,
    ) -> Result<Vec<Arc<Link>>, FabricError> {
        let pending_limit = Utc::now()
            - chrono::Duration::from_std(pending_timeout).unwrap_or(chrono::Duration::zero());
        let mut created = Vec::new();

        for src in routers {
            for dst in routers {
                if src.id == dst.id {
                    continue;
                }
                for listener in &dst.listeners {
                    if self.has_link(&src.id, &dst.id, &listener.group, pending_limit) {
                        continue;
                    }
                    let dialer = src
                        .dialers
                        .iter()
                        .find(|d| d.group == listener.group)
                        .ok_or_else(|| FabricError::NoDialerAvailable {
                            src: src.id.clone(),
                            dst: dst.id.clone(),
                            group: listener.group.clone(),
                        })?;

                    let link = Arc::new(Link::new(
                        fabric_common::new_link_id(),
                        src.id.clone(),
                        dst.id.clone(),
                        listener.protocol.clone(),
                        listener.group.clone(),
                        dialer.local_binding.clone(),
                        true,
                        0,
                    ));
                    link.add_state(LinkMode::Pending);
                    debug!(src = %src.id, dst = %dst.id, group = %listener.group, link_id = %link.id, "missing link scanned");
                    created.push(link);
                }
            }
        }

        Ok(created)
    }

    /// Removes `Pending` links whose state timestamp is older than
    /// `pending_timeout`.
    pub fn clear_expired_pending(&self, pending_timeout: Duration) -> Vec<Arc<Link>> {
        let pending_limit = Utc::now()
            - chrono::Duration::from_std(pending_timeout).unwrap_or(chrono::Duration::zero());
        let expired: Vec<_> = self
            .all()
            .into_iter()
            .filter(|link| link.is_expired_pending(pending_limit))
            .collect();
        for link in &expired {
            warn!(link_id = %link.id, src = %link.src, dst = %link.dst, "pending link expired");
            self.remove(link);
        }
        expired
    }

    pub fn links_in_mode(&self, mode: LinkMode) -> Vec<Arc<Link>> {
        self.all()
            .into_iter()
            .filter(|link| link.current_state().map(|s| s.mode) == Some(mode))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_common::model::{Dialer, Listener};
    use std::collections::BTreeSet;

    fn snapshot(id: &str, listeners: Vec<Listener>, dialers: Vec<Dialer>) -> RouterSnapshot {
        RouterSnapshot {
            id: id.to_string(),
            listeners,
            dialers,
        }
    }

    #[test]
    fn single_pair_convergence() {
        // Scenario 1 (spec §8): r1 listens, r0 dials, one pending link appears.
        let controller = LinkController::new();
        let r0 = snapshot("r0", vec![], vec![Dialer::new("lo", "default")]);
        let r1 = snapshot(
            "r1",
            vec![Listener::new("tcp:h:1", "tcp", "default", BTreeSet::new())],
            vec![],
        );

        let pending = controller
            .missing_links(&[r0.clone(), r1.clone()], Duration::from_secs(15))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].src, "r0");
        assert_eq!(pending[0].dst, "r1");

        for link in &pending {
            controller.add(link.clone());
        }
        let link = pending[0].clone();
        link.add_state(LinkMode::Connected);

        assert!(controller.get(&link.id).unwrap().is_usable());
        assert_eq!(
            controller.connected_neighbors_of_router(&"r0".to_string()),
            vec!["r1".to_string()]
        );
    }

    #[test]
    fn no_dialer_produces_named_error() {
        // Scenario 4 (spec §8).
        let controller = LinkController::new();
        let r0 = snapshot("r0", vec![], vec![Dialer::new("lo", "a")]);
        let r1 = snapshot(
            "r1",
            vec![Listener::new("tcp:h:1", "tcp", "b", BTreeSet::new())],
            vec![],
        );

        let err = controller
            .missing_links(&[r0, r1], Duration::from_secs(15))
            .unwrap_err();
        match err {
            FabricError::NoDialerAvailable { src, dst, group } => {
                assert_eq!(src, "r0");
                assert_eq!(dst, "r1");
                assert_eq!(group, "b");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(controller.all().is_empty());
    }

    #[test]
    fn pending_link_within_timeout_is_not_rescanned() {
        let controller = LinkController::new();
        let r0 = snapshot("r0", vec![], vec![Dialer::new("lo", "default")]);
        let r1 = snapshot(
            "r1",
            vec![Listener::new("tcp:h:1", "tcp", "default", BTreeSet::new())],
            vec![],
        );

        let first = controller
            .missing_links(&[r0.clone(), r1.clone()], Duration::from_secs(15))
            .unwrap();
        for link in &first {
            controller.add(link.clone());
        }

        let second = controller
            .missing_links(&[r0, r1], Duration::from_secs(15))
            .unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn expired_pending_is_cleared_and_rescanned() {
        // Scenario 3 (spec §8).
        let controller = LinkController::new();
        let link = Arc::new(Link::new(
            fabric_common::new_link_id(),
            "r0".to_string(),
            "r1".to_string(),
            "tcp",
            "default",
            "lo",
            true,
            0,
        ));
        link.add_state(LinkMode::Pending);
        controller.add(link.clone());

        // Simulate staleness: a zero-duration timeout means "now" is
        // already past the limit for any link created before this call.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let expired = controller.clear_expired_pending(Duration::from_millis(1));
        assert_eq!(expired.len(), 1);
        assert!(controller.get(&link.id).is_none());

        let r0 = snapshot("r0", vec![], vec![Dialer::new("lo", "default")]);
        let r1 = snapshot(
            "r1",
            vec![Listener::new("tcp:h:1", "tcp", "default", BTreeSet::new())],
            vec![],
        );
        let rescanned = controller
            .missing_links(&[r0, r1], Duration::from_secs(15))
            .unwrap();
        assert_eq!(rescanned.len(), 1);
        assert_ne!(rescanned[0].id, link.id);
    }

    #[test]
    fn add_remove_keeps_both_endpoint_indices_consistent() {
        let controller = LinkController::new();
        let link = Arc::new(Link::new(
            "link-1".into(),
            "r0".into(),
            "r1".into(),
            "tcp",
            "default",
            "lo",
            true,
            0,
        ));
        controller.add(link.clone());
        assert!(controller
            .connected_neighbors_of_router(&"r0".to_string())
            .is_empty()); // not usable yet (no Connected state)
        link.add_state(LinkMode::Connected);
        assert_eq!(
            controller.connected_neighbors_of_router(&"r0".to_string()),
            vec!["r1".to_string()]
        );
        assert_eq!(
            controller.connected_neighbors_of_router(&"r1".to_string()),
            vec!["r0".to_string()]
        );

        controller.remove(&link);
        assert!(controller.get(&link.id).is_none());
        assert!(controller
            .connected_neighbors_of_router(&"r0".to_string())
            .is_empty());
        assert!(controller
            .connected_neighbors_of_router(&"r1".to_string())
            .is_empty());
    }

    #[test]
    fn router_reported_link_is_idempotent() {
        let controller = LinkController::new();
        let (link1, created1) =
            controller.router_reported_link("link-1".into(), "tcp", "r0".into(), "r1".into());
        assert!(created1);
        let (link2, created2) =
            controller.router_reported_link("link-1".into(), "tcp", "r0".into(), "r1".into());
        assert!(!created2);
        assert_eq!(link1.id, link2.id);
        assert!(link1.is_usable());
    }

    #[test]
    fn least_expensive_link_picks_minimum_cost() {
        let controller = LinkController::new();
        let cheap = Arc::new(Link::new(
            "cheap".into(),
            "r0".into(),
            "r1".into(),
            "tcp",
            "default",
            "a",
            true,
            5,
        ));
        let pricey = Arc::new(Link::new(
            "pricey".into(),
            "r1".into(),
            "r0".into(),
            "tcp",
            "default",
            "b",
            true,
            50,
        ));
        cheap.add_state(LinkMode::Connected);
        pricey.add_state(LinkMode::Connected);
        controller.add(cheap.clone());
        controller.add(pricey);

        let best = controller
            .least_expensive_link(&"r0".to_string(), &"r1".to_string())
            .unwrap();
        assert_eq!(best.id, "cheap");
        // Symmetric lookup.
        let best2 = controller
            .least_expensive_link(&"r1".to_string(), &"r0".to_string())
            .unwrap();
        assert_eq!(best2.id, "cheap");
    }
}
