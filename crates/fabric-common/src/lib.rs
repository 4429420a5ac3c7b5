//! Shared types for the fabric control plane.
//!
//! This crate contains:
//! - **Data model** — `Router`/`Listener`/`Dialer` advertisements and the
//!   `Link`/`LinkState` stack (`model`, `link`)
//! - **Protocol messages** — control-channel message types and the
//!   `ControlChannel` trait both sides talk through (`protocol`)
//! - **Config** — tunable parameters (`config`)
//! - **Errors** — domain error kinds (`error`)
//! - **Deferred work** — the one-shot cancellable timer used for the
//!   duplicate-link close delay (`timer`)
//! - **Test doubles** — an in-memory `ControlChannel` (`testing`)

pub mod config;
pub mod error;
pub mod ids;
pub mod link;
pub mod model;
pub mod protocol;
pub mod testing;
pub mod timer;

pub use error::FabricError;
pub use ids::{new_link_id, LinkId, RouterId};
pub use link::{Link, LinkMode, LinkState};
pub use model::{Dialer, Listener};
