//! Router-side dial handling (spec §4.4): a bounded worker pool pulls
//! `Dial` commands off the control channel and attempts to establish
//! the requested outbound connection, reporting the outcome back.
//!
//! Actual transport establishment is out of scope (spec §1) — `Dialer`
//! is the trait boundary, the same role `ControlChannel` plays for the
//! control-plane wire.

use std::sync::Arc;

use fabric_common::protocol::{ControlChannel, ControlMessage, DialRequest};
use fabric_common::{FabricError, Link, LinkMode};
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use crate::registry::LinkRegistry;

/// Establishes the actual outbound connection for a dial request.
/// Out of scope per spec §1; implementations live outside this crate
/// in production, with `NullDialer`/a test double standing in here.
#[async_trait::async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, address: &str) -> Result<(), FabricError>;
}

/// Consumes `Dial` requests from `rx` with at most `worker_count`
/// dials in flight at once, matching spec §4.4's bounded worker pool.
/// Runs until `rx` closes.
pub struct DialWorkerPool {
    registry: Arc<LinkRegistry>,
    dialer: Arc<dyn Dialer>,
    control: Arc<dyn ControlChannel>,
    semaphore: Arc<Semaphore>,
}

impl DialWorkerPool {
    pub fn new(
        registry: Arc<LinkRegistry>,
        dialer: Arc<dyn Dialer>,
        control: Arc<dyn ControlChannel>,
        worker_count: usize,
    ) -> Self {
        Self {
            registry,
            dialer,
            control,
            semaphore: Arc::new(Semaphore::new(worker_count.max(1))),
        }
    }

    /// Drives the pool until the request channel closes. Each accepted
    /// request spawns on a tracked permit; the loop itself never blocks
    /// on an individual dial's completion.
    pub async fn run(&self, mut rx: mpsc::Receiver<DialRequest>) {
        while let Some(request) = rx.recv().await {
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let registry = self.registry.clone();
            let dialer = self.dialer.clone();
            let control = self.control.clone();
            tokio::spawn(async move {
                let _permit = permit;
                process_dial(registry, dialer, control, request).await;
            });
        }
    }
}

/// The per-request algorithm (spec §4.4): take the dial lock, attempt
/// the connection, and report success or failure. A denied lock means
/// another worker (or the existing link itself) already owns this
/// identity, so the request is dropped silently rather than retried.
async fn process_dial(
    registry: Arc<LinkRegistry>,
    dialer: Arc<dyn Dialer>,
    control: Arc<dyn ControlChannel>,
    request: DialRequest,
) {
    let DialRequest {
        link_id,
        router_id: peer,
        address,
        link_protocol,
        group,
        local_binding,
        ..
    } = request;

    if !registry.get_dial_lock(&peer, &link_protocol, &group, &local_binding) {
        info!(%link_id, %peer, "dial skipped: lock denied");
        return;
    }

    match dialer.dial(&address).await {
        Ok(()) => {
            registry.dial_succeeded(&peer, &link_protocol, &group, &local_binding);
            let link = Arc::new(Link::new(
                link_id.clone(),
                String::new(),
                peer.clone(),
                link_protocol,
                group,
                local_binding,
                true,
                0,
            ));
            link.add_state(LinkMode::Connected);
            registry.link_accepted(link);

            if let Err(err) = control.send(ControlMessage::LinkConnected { id: link_id.clone() }) {
                warn!(%link_id, error = %err, "failed to report link connected");
            }
        }
        Err(err) => {
            registry.dial_failed(&peer, &link_protocol, &group, &local_binding);
            warn!(%link_id, %peer, error = %err, "dial failed");
            if let Err(send_err) = control.send(ControlMessage::LinkFault { id: link_id.clone() }) {
                warn!(%link_id, error = %send_err, "failed to report link fault");
            }
        }
    }
}

/// A `Dialer` that always succeeds immediately, for local testing
/// without a real transport. Mirrors the teacher's `--simulate`
/// fake-hardware dialer.
pub struct NullDialer;

#[async_trait::async_trait]
impl Dialer for NullDialer {
    async fn dial(&self, _address: &str) -> Result<(), FabricError> {
        Ok(())
    }
}
