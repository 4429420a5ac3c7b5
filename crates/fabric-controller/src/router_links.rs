//! `routerLinks`: a derived index from router id to the set of link ids
//! it participates in. Per spec §9's "cyclic references" note, this is
//! an index looked up on demand rather than a field embedded in a
//! `Router` struct — there is no `Router` owning `Link`s or vice versa,
//! only ids crossing the boundary.

use dashmap::{DashMap, DashSet};
use fabric_common::{LinkId, RouterId};

#[derive(Default)]
pub struct RouterLinksIndex {
    by_router: DashMap<RouterId, DashSet<LinkId>>,
}

impl RouterLinksIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Add(link, peer)` — records that `owner` participates in `link_id`.
    pub fn add(&self, owner: &RouterId, link_id: &LinkId) {
        self.by_router
            .entry(owner.clone())
            .or_default()
            .insert(link_id.clone());
    }

    /// `Remove(link, peer)`.
    pub fn remove(&self, owner: &RouterId, link_id: &LinkId) {
        if let Some(set) = self.by_router.get(owner) {
            set.remove(link_id);
        }
    }

    /// `GetLinks()` — flat list of all links `owner` participates in.
    pub fn get_links(&self, owner: &RouterId) -> Vec<LinkId> {
        self.by_router
            .get(owner)
            .map(|set| set.iter().map(|id| id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, owner: &RouterId, link_id: &LinkId) -> bool {
        self.by_router
            .get(owner)
            .map(|set| set.contains(link_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get_links_round_trips() {
        let idx = RouterLinksIndex::new();
        idx.add(&"r0".to_string(), &"link-1".to_string());
        idx.add(&"r0".to_string(), &"link-2".to_string());
        let mut links = idx.get_links(&"r0".to_string());
        links.sort();
        assert_eq!(links, vec!["link-1".to_string(), "link-2".to_string()]);
    }

    #[test]
    fn remove_drops_only_that_link() {
        let idx = RouterLinksIndex::new();
        idx.add(&"r0".to_string(), &"link-1".to_string());
        idx.add(&"r0".to_string(), &"link-2".to_string());
        idx.remove(&"r0".to_string(), &"link-1".to_string());
        assert_eq!(idx.get_links(&"r0".to_string()), vec!["link-2".to_string()]);
    }

    #[test]
    fn unknown_router_has_no_links() {
        let idx = RouterLinksIndex::new();
        assert!(idx.get_links(&"ghost".to_string()).is_empty());
    }
}
