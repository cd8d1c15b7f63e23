//! Relay lifecycle events
//!
//! The engine reports coarse lifecycle transitions over an unbounded
//! channel so the host can observe relay activity without polling.
//! Emission never blocks and a missing subscriber is not an error.

use tokio::sync::mpsc;
use tracing::debug;

use crate::message::CallId;
use crate::session::BranchId;

/// Events emitted by the relay engine
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A call gained relay state
    ContextCreated { call_id: CallId },
    /// A branch session was created inside a call's context
    SessionCreated { call_id: CallId, branch: BranchId },
    /// A backend was engaged for a call
    Engaged {
        call_id: CallId,
        backend: String,
        branch: BranchId,
    },
    /// A call's relay state was released
    ContextDestroyed { call_id: CallId },
}

/// Cloneable sender half of the engine's event channel
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: mpsc::UnboundedSender<RelayEvent>,
}

impl EventHub {
    /// Create the hub together with its receiver
    pub fn channel() -> (EventHub, mpsc::UnboundedReceiver<RelayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventHub { tx }, rx)
    }

    /// Emit an event; dropped receivers are ignored
    pub fn emit(&self, event: RelayEvent) {
        if self.tx.send(event).is_err() {
            debug!("relay event dropped: no subscriber");
        }
    }
}
