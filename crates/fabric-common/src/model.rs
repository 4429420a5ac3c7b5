//! Router-advertised capabilities: listeners (accept-side) and dialers
//! (connect-side).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Group normalized when absent — the equivalence class a dialer and a
/// listener must share to be paired.
pub const DEFAULT_GROUP: &str = "default";

pub fn normalize_group(group: &str) -> String {
    if group.is_empty() {
        DEFAULT_GROUP.to_string()
    } else {
        group.to_string()
    }
}

/// An accept-side advertisement: "I can be dialed at this address for
/// this protocol/group, at this cost."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    pub address: String,
    pub protocol: String,
    pub group: String,
    #[serde(default)]
    pub cost_tags: BTreeSet<String>,
}

impl Listener {
    /// Builds a listener, normalizing an empty group to `"default"`.
    pub fn new(
        address: impl Into<String>,
        protocol: impl Into<String>,
        group: impl Into<String>,
        cost_tags: BTreeSet<String>,
    ) -> Self {
        Self {
            address: address.into(),
            protocol: protocol.into(),
            group: normalize_group(&group.into()),
            cost_tags,
        }
    }
}

/// A connect-side advertisement: "I can dial out from this local
/// binding for this group."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialer {
    pub local_binding: String,
    pub group: String,
}

impl Dialer {
    pub fn new(local_binding: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            local_binding: local_binding.into(),
            group: normalize_group(&group.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_group_normalizes_to_default() {
        let l = Listener::new("tcp:h:1", "tcp", "", BTreeSet::new());
        assert_eq!(l.group, "default");
        let d = Dialer::new("lo", "");
        assert_eq!(d.group, "default");
    }

    #[test]
    fn explicit_group_preserved() {
        let l = Listener::new("tcp:h:1", "tcp", "video", BTreeSet::new());
        assert_eq!(l.group, "video");
    }
}
