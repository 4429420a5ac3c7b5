//! Identifier types shared by the controller and router sides.
//!
//! Routers and links are arena entries keyed by these ids rather than
//! linked by owning references, so `Link` can name both of its
//! endpoints without creating a reference cycle (see `routerLinks` in
//! `fabric_controller::router_links`).

use uuid::Uuid;

/// Opaque router identifier, as advertised by the router itself.
pub type RouterId = String;

/// Globally unique link identifier.
pub type LinkId = String;

/// Allocates a fresh link id.
pub fn new_link_id() -> LinkId {
    Uuid::new_v4().to_string()
}
