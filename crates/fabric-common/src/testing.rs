//! In-memory test doubles, grounded on the teacher's own `--simulate`
//! fake-hardware path (`strata-agent/src/hardware.rs`): exercise the
//! real control flow without a real socket.

use std::sync::Mutex;

use crate::error::FabricError;
use crate::protocol::{ControlChannel, ControlMessage};

/// A `ControlChannel` that records every message sent to it instead of
/// transmitting anything.
#[derive(Default)]
pub struct InMemoryControlChannel {
    sent: Mutex<Vec<ControlMessage>>,
    /// When set, every `send` fails with this message instead of
    /// recording — used to exercise `ControlChannelSendFailure` paths.
    fail_with: Mutex<Option<String>>,
}

impl InMemoryControlChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Mutex::new(Some(reason.into())),
        }
    }

    pub fn sent(&self) -> Vec<ControlMessage> {
        self.sent.lock().expect("poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().expect("poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ControlChannel for InMemoryControlChannel {
    fn send(&self, msg: ControlMessage) -> Result<(), FabricError> {
        if let Some(reason) = self.fail_with.lock().expect("poisoned").clone() {
            return Err(FabricError::ControlChannelSend(reason));
        }
        self.sent.lock().expect("poisoned").push(msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_sent_messages() {
        let chan = InMemoryControlChannel::new();
        chan.send(ControlMessage::LinkFault { id: "l1".into() })
            .unwrap();
        assert_eq!(chan.len(), 1);
    }

    #[test]
    fn failing_channel_returns_error() {
        let chan = InMemoryControlChannel::failing("queue closed");
        let err = chan
            .send(ControlMessage::LinkFault { id: "l1".into() })
            .unwrap_err();
        assert!(matches!(err, FabricError::ControlChannelSend(_)));
        assert!(chan.is_empty());
    }
}
