//! Domain error kinds (spec §7). Local failures are logged and reported
//! to the peer as a protocol message; they are never propagated as
//! exceptions across the control channel.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FabricError {
    #[error("no dialer on {src} matches group {group:?} required to reach {dst}")]
    NoDialerAvailable {
        src: String,
        dst: String,
        group: String,
    },

    #[error("duplicate link: {loser} displaced by {winner}")]
    DuplicateLink { winner: String, loser: String },

    #[error("invalid hello: {0}")]
    InvalidHello(String),

    #[error("decode failure: {0}")]
    DecodeFailure(String),

    #[error("control channel send failed: {0}")]
    ControlChannelSend(String),
}
