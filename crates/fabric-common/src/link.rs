//! The shared link data model (spec §4.5): a link's state stack, cost,
//! and usability check. Identical on both the controller and router
//! side — only which fields are populated (e.g. `dialer_binding`)
//! differs by who created the link.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{LinkId, RouterId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkMode {
    Pending,
    Connected,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinkState {
    pub mode: LinkMode,
    pub timestamp: DateTime<Utc>,
}

impl LinkState {
    pub fn new(mode: LinkMode) -> Self {
        Self {
            mode,
            timestamp: Utc::now(),
        }
    }
}

/// A transport connection between two routers at a specific
/// protocol/group/binding tuple.
///
/// `protocol` and `group` are tracked as two distinct fields (see
/// SPEC_FULL §1): the original conflated them by passing a listener's
/// group where a protocol was expected.
#[derive(Debug)]
pub struct Link {
    pub id: LinkId,
    pub src: RouterId,
    pub dst: RouterId,
    pub protocol: String,
    pub group: String,
    pub local_binding: String,
    /// Set when the link was created by a dialer (either the missing-link
    /// scanner or an outbound dial); `None` for a link the controller only
    /// learned about via `routerReportedLink`.
    pub has_dialer: bool,
    states: RwLock<Vec<LinkState>>,
    cost: AtomicI64,
}

impl Link {
    pub fn new(
        id: LinkId,
        src: RouterId,
        dst: RouterId,
        protocol: impl Into<String>,
        group: impl Into<String>,
        local_binding: impl Into<String>,
        has_dialer: bool,
        cost: i64,
    ) -> Self {
        Self {
            id,
            src,
            dst,
            protocol: protocol.into(),
            group: group.into(),
            local_binding: local_binding.into(),
            has_dialer,
            states: RwLock::new(Vec::new()),
            cost: AtomicI64::new(cost),
        }
    }

    /// Pushes a new state record on top of the stack.
    pub fn add_state(&self, mode: LinkMode) {
        self.states
            .write()
            .expect("link state lock poisoned")
            .push(LinkState::new(mode));
    }

    /// The most recently pushed state, if any.
    pub fn current_state(&self) -> Option<LinkState> {
        self.states
            .read()
            .expect("link state lock poisoned")
            .last()
            .copied()
    }

    pub fn is_usable(&self) -> bool {
        matches!(
            self.current_state(),
            Some(LinkState {
                mode: LinkMode::Connected,
                ..
            })
        )
    }

    /// True if current mode is `Pending` and newer than `pending_limit`,
    /// or current mode is `Connected` — the "link already accounted for"
    /// test used by the missing-link scanner.
    pub fn is_present(&self, pending_limit: DateTime<Utc>) -> bool {
        match self.current_state() {
            Some(LinkState {
                mode: LinkMode::Connected,
                ..
            }) => true,
            Some(LinkState {
                mode: LinkMode::Pending,
                timestamp,
            }) => timestamp > pending_limit,
            _ => false,
        }
    }

    /// True if current mode is `Pending` and older than `pending_limit` —
    /// the sweeper's removal criterion.
    pub fn is_expired_pending(&self, pending_limit: DateTime<Utc>) -> bool {
        matches!(
            self.current_state(),
            Some(LinkState {
                mode: LinkMode::Pending,
                timestamp,
            }) if timestamp < pending_limit
        )
    }

    pub fn get_cost(&self) -> i64 {
        self.cost.load(Ordering::Relaxed)
    }

    pub fn set_cost(&self, cost: i64) {
        self.cost.store(cost, Ordering::Relaxed);
    }

    /// The endpoint of this link that is not `router`, if `router` is one
    /// of the two endpoints.
    pub fn other_end(&self, router: &str) -> Option<&RouterId> {
        if self.src == router {
            Some(&self.dst)
        } else if self.dst == router {
            Some(&self.src)
        } else {
            None
        }
    }

    /// True if `{a, b}` are this link's two endpoints, in either order —
    /// collapses the two symmetric branches spec.md §9 flags in
    /// `leastExpensiveLink`.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.src == a && self.dst == b) || (self.src == b && self.dst == a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> Link {
        Link::new(
            "link-1".into(),
            "r0".into(),
            "r1".into(),
            "tcp",
            "default",
            "lo",
            true,
            0,
        )
    }

    #[test]
    fn new_link_has_no_state() {
        let l = link();
        assert!(l.current_state().is_none());
        assert!(!l.is_usable());
    }

    #[test]
    fn connected_link_is_usable() {
        let l = link();
        l.add_state(LinkMode::Pending);
        assert!(!l.is_usable());
        l.add_state(LinkMode::Connected);
        assert!(l.is_usable());
    }

    #[test]
    fn current_state_is_most_recent() {
        let l = link();
        l.add_state(LinkMode::Pending);
        l.add_state(LinkMode::Failed);
        assert_eq!(l.current_state().unwrap().mode, LinkMode::Failed);
    }

    #[test]
    fn connects_is_order_independent() {
        let l = link();
        assert!(l.connects("r0", "r1"));
        assert!(l.connects("r1", "r0"));
        assert!(!l.connects("r0", "r2"));
    }

    #[test]
    fn other_end_resolves_from_either_side() {
        let l = link();
        assert_eq!(l.other_end("r0").unwrap(), "r1");
        assert_eq!(l.other_end("r1").unwrap(), "r0");
        assert!(l.other_end("r2").is_none());
    }
}
