//! `LinkRegistry` (spec §4.2): the router-side mirror of the
//! controller's link table, plus dial-lock bookkeeping and the
//! duplicate-link tie-break. Structured like `fabric_controller`'s
//! `LinkTable`/`RouterLinksIndex` pair — a `DashMap` keyed by the
//! dial identity, with a secondary index by link id — grounded on the
//! teacher's `dashmap`-backed `AppState`.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use fabric_common::config::{DIAL_LOCK_SWEEP_THRESHOLD, DIAL_LOCK_TTL, DUPLICATE_LINK_CLOSE_DELAY};
use fabric_common::timer::DelayQueue;
use fabric_common::{Link, LinkId, RouterId};
use tracing::{debug, info, warn};

/// `(peerRouterId, protocol, group, localBinding)` joined by a
/// delimiter that cannot appear in any of its parts (router ids and
/// groups are validated identifiers, not free text).
fn dial_key(peer: &RouterId, protocol: &str, group: &str, local_binding: &str) -> String {
    format!("{peer}\u{1f}{protocol}\u{1f}{group}\u{1f}{local_binding}")
}

pub struct LinkRegistry {
    /// Primary index: dial identity -> link.
    by_key: DashMap<String, Arc<Link>>,
    /// Secondary index: link id -> dial identity, so `GetLinkById` and
    /// `LinkClosed` don't need to scan `by_key`.
    key_by_id: DashMap<LinkId, String>,
    /// Outstanding dial locks: dial identity -> when the lock was taken.
    dial_locks: DashMap<String, Instant>,
    /// Deferred closes for links displaced by `applyLink`'s tie-break.
    close_queue: DelayQueue<LinkId>,
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self {
            by_key: DashMap::new(),
            key_by_id: DashMap::new(),
            dial_locks: DashMap::new(),
            close_queue: DelayQueue::new(),
        }
    }

    /// `GetLink(peer, protocol, group, localBinding)`.
    pub fn get_link(
        &self,
        peer: &RouterId,
        protocol: &str,
        group: &str,
        local_binding: &str,
    ) -> Option<Arc<Link>> {
        self.by_key
            .get(&dial_key(peer, protocol, group, local_binding))
            .map(|e| e.value().clone())
    }

    /// `GetLinkById(id)`.
    pub fn get_link_by_id(&self, id: &LinkId) -> Option<Arc<Link>> {
        let key = self.key_by_id.get(id)?;
        self.by_key.get(key.value()).map(|e| e.value().clone())
    }

    /// `GetDialLock`: grants a lock for this dial identity unless a link
    /// already exists there (in which case the caller should re-announce
    /// it instead of dialing again) or a lock was taken too recently.
    /// Sweeps expired locks once the table crosses
    /// `DIAL_LOCK_SWEEP_THRESHOLD` entries, so a long-lived router
    /// doesn't accumulate stale locks forever.
    pub fn get_dial_lock(
        &self,
        peer: &RouterId,
        protocol: &str,
        group: &str,
        local_binding: &str,
    ) -> bool {
        let key = dial_key(peer, protocol, group, local_binding);

        if self.by_key.contains_key(&key) {
            debug!(%key, "dial lock denied: link already exists");
            return false;
        }

        if self.dial_locks.len() > DIAL_LOCK_SWEEP_THRESHOLD {
            self.sweep_expired_locks();
        }

        let now = Instant::now();
        if let Some(existing) = self.dial_locks.get(&key) {
            if now.duration_since(*existing.value()) < DIAL_LOCK_TTL {
                debug!(%key, "dial lock denied: lock held");
                return false;
            }
        }

        self.dial_locks.insert(key, now);
        true
    }

    fn sweep_expired_locks(&self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .dial_locks
            .iter()
            .filter(|e| now.duration_since(*e.value()) >= DIAL_LOCK_TTL)
            .map(|e| e.key().clone())
            .collect();
        for key in expired {
            self.dial_locks.remove(&key);
        }
    }

    /// `DialFailed`: releases the lock so the next scan can retry.
    pub fn dial_failed(&self, peer: &RouterId, protocol: &str, group: &str, local_binding: &str) {
        let key = dial_key(peer, protocol, group, local_binding);
        self.dial_locks.remove(&key);
    }

    /// `DialSucceeded`: releases the lock. The caller is expected to
    /// follow up with `LinkAccepted`/`applyLink` once the connection is
    /// confirmed.
    pub fn dial_succeeded(&self, peer: &RouterId, protocol: &str, group: &str, local_binding: &str) {
        let key = dial_key(peer, protocol, group, local_binding);
        self.dial_locks.remove(&key);
    }

    /// `LinkAccepted`: applies the tie-break rule and installs the
    /// winner in both indices.
    pub fn link_accepted(&self, link: Arc<Link>) -> Arc<Link> {
        self.apply_link(link)
    }

    /// The duplicate-link tie-break (spec §4.2 `applyLink`): when two
    /// links exist for the same dial identity (e.g. both ends dialed
    /// each other at once), the one with the lexicographically greater
    /// id wins and the other is displaced. The loser isn't closed
    /// immediately — a 5-minute grace period lets in-flight circuits
    /// drain, cancelled if the loser already had one scheduled for
    /// another reason.
    fn apply_link(&self, new_link: Arc<Link>) -> Arc<Link> {
        let key = dial_key(
            &new_link.dst,
            &new_link.protocol,
            &new_link.group,
            &new_link.local_binding,
        );

        let winner = match self.by_key.get(&key).map(|e| e.value().clone()) {
            Some(existing) if existing.id != new_link.id => {
                if existing.id > new_link.id {
                    info!(
                        winner = %existing.id, loser = %new_link.id,
                        "duplicate link: keeping existing, deferring close of new"
                    );
                    self.schedule_close(new_link.id.clone());
                    existing
                } else {
                    info!(
                        winner = %new_link.id, loser = %existing.id,
                        "duplicate link: new link wins, deferring close of existing"
                    );
                    self.schedule_close(existing.id.clone());
                    new_link
                }
            }
            _ => new_link,
        };

        self.key_by_id.insert(winner.id.clone(), key.clone());
        self.by_key.insert(key, winner.clone());
        winner
    }

    fn schedule_close(&self, loser_id: LinkId) {
        self.close_queue
            .schedule(loser_id.clone(), DUPLICATE_LINK_CLOSE_DELAY, async move {
                tracing::info!(link_id = %loser_id, "closing displaced duplicate link");
            });
    }

    /// `LinkClosed`: removes a link from both indices, but only if the
    /// entry currently stored under its dial identity is this exact
    /// link — a racing `applyLink` may already have replaced it.
    pub fn link_closed(&self, link: &Link) {
        let key = dial_key(&link.dst, &link.protocol, &link.group, &link.local_binding);
        let is_current = self
            .by_key
            .get(&key)
            .map(|e| e.value().id == link.id)
            .unwrap_or(false);
        if is_current {
            self.by_key.remove(&key);
        }
        self.key_by_id.remove(&link.id);
        self.close_queue.cancel(&link.id);
    }

    /// `Iter`: snapshot of all currently registered links.
    pub fn iter(&self) -> Vec<Arc<Link>> {
        self.by_key.iter().map(|e| e.value().clone()).collect()
    }

    /// `NotifyOfReconnect`: on a fresh control-channel connection, the
    /// router re-announces every link it still holds so the controller
    /// can reconcile its view (spec §8 scenario 6).
    pub fn notify_of_reconnect(&self) -> Vec<Arc<Link>> {
        let links = self.iter();
        if !links.is_empty() {
            info!(count = links.len(), "re-announcing links after reconnect");
        } else {
            warn!("reconnect with no links to announce");
        }
        links
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_common::LinkMode;

    fn link(id: &str, src: &str, dst: &str) -> Arc<Link> {
        let l = Arc::new(Link::new(
            id.to_string(),
            src.to_string(),
            dst.to_string(),
            "tcp",
            "default",
            "lo",
            true,
            0,
        ));
        l.add_state(LinkMode::Connected);
        l
    }

    #[test]
    fn dial_lock_denied_once_link_exists() {
        let reg = LinkRegistry::new();
        let r = "r1".to_string();
        assert!(reg.get_dial_lock(&r, "tcp", "default", "lo"));
        reg.dial_succeeded(&r, "tcp", "default", "lo");
        reg.link_accepted(link("link-1", "r0", "r1"));
        assert!(!reg.get_dial_lock(&r, "tcp", "default", "lo"));
    }

    #[test]
    fn dial_lock_denied_while_held() {
        let reg = LinkRegistry::new();
        let r = "r1".to_string();
        assert!(reg.get_dial_lock(&r, "tcp", "default", "lo"));
        assert!(!reg.get_dial_lock(&r, "tcp", "default", "lo"));
    }

    #[test]
    fn dial_failed_releases_lock_for_retry() {
        let reg = LinkRegistry::new();
        let r = "r1".to_string();
        assert!(reg.get_dial_lock(&r, "tcp", "default", "lo"));
        reg.dial_failed(&r, "tcp", "default", "lo");
        assert!(reg.get_dial_lock(&r, "tcp", "default", "lo"));
    }

    #[test]
    fn get_link_and_get_link_by_id_agree() {
        let reg = LinkRegistry::new();
        let l = link("link-1", "r0", "r1");
        reg.link_accepted(l.clone());
        let by_key = reg.get_link(&"r1".to_string(), "tcp", "default", "lo").unwrap();
        let by_id = reg.get_link_by_id(&"link-1".to_string()).unwrap();
        assert_eq!(by_key.id, by_id.id);
    }

    #[test]
    fn apply_link_tie_break_keeps_higher_id() {
        // Scenario 2 (spec §8): simultaneous dials race to the same identity.
        let reg = LinkRegistry::new();
        let low = link("aaa-low", "r0", "r1");
        let high = link("zzz-high", "r0", "r1");

        reg.link_accepted(low.clone());
        let winner = reg.link_accepted(high.clone());
        assert_eq!(winner.id, "zzz-high");
        assert_eq!(
            reg.get_link(&"r1".to_string(), "tcp", "default", "lo").unwrap().id,
            "zzz-high"
        );

        // Replaying the lower id again does not displace the winner.
        let winner2 = reg.link_accepted(low);
        assert_eq!(winner2.id, "zzz-high");
    }

    #[test]
    fn link_closed_only_removes_matching_identity() {
        let reg = LinkRegistry::new();
        let low = link("aaa-low", "r0", "r1");
        let high = link("zzz-high", "r0", "r1");
        reg.link_accepted(low.clone());
        reg.link_accepted(high.clone());

        // The displaced link closing doesn't remove the winner's entry.
        reg.link_closed(&low);
        assert_eq!(
            reg.get_link(&"r1".to_string(), "tcp", "default", "lo").unwrap().id,
            "zzz-high"
        );

        reg.link_closed(&high);
        assert!(reg.get_link(&"r1".to_string(), "tcp", "default", "lo").is_none());
    }

    #[test]
    fn iter_and_notify_of_reconnect_see_registered_links() {
        let reg = LinkRegistry::new();
        reg.link_accepted(link("link-1", "r0", "r1"));
        assert_eq!(reg.iter().len(), 1);
        assert_eq!(reg.notify_of_reconnect().len(), 1);
    }
}
