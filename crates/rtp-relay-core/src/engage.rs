//! Engage coordination
//!
//! [`RelayEngine`] ties the pieces together: the backend registry, the
//! per-call context registry, the engine configuration and the event
//! hub. Engaging a relay validates the initial-INVITE precondition,
//! takes the call's lock, dispatches to the backend and records what it
//! reports into the branch session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::{BackendRegistry, RelayBackend};
use crate::config::RelayConfig;
use crate::context::{resolve_branch, BranchSelector, ContextRegistry};
use crate::error::{RelayError, Result};
use crate::events::{EventHub, RelayEvent};
use crate::flags::resolve_direction;
use crate::message::{CallId, ProxyRole, RelayMessage};
use crate::vars::{read_var, write_var, VarSpec, VarValue};

/// The relay coordination engine
///
/// One instance serves the whole proxy process. Backends register at
/// startup; message-processing workers then call into the engine
/// concurrently, serialized per call by the context locks.
#[derive(Debug)]
pub struct RelayEngine {
    config: RelayConfig,
    backends: BackendRegistry,
    contexts: ContextRegistry,
    events: EventHub,
    event_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<RelayEvent>>>,
}

impl RelayEngine {
    pub fn new(config: RelayConfig) -> Self {
        let (events, event_rx) = EventHub::channel();
        RelayEngine {
            config,
            backends: BackendRegistry::new(),
            contexts: ContextRegistry::new(events.clone()),
            events,
            event_rx: parking_lot::Mutex::new(Some(event_rx)),
        }
    }

    /// Validate the configuration against the registered backends.
    /// Call after all backends have registered, before serving traffic.
    pub fn validate(&self) -> Result<()> {
        self.config.validate(&self.backends)
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    pub fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }

    /// Take the engine's event receiver. Yields `None` after the first
    /// call.
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<RelayEvent>> {
        self.event_rx.lock().take()
    }

    /// Resolve a backend name at setup time.
    ///
    /// An unknown name is a configuration error for the caller being
    /// wired up, not a per-message condition.
    pub fn resolve_backend(&self, name: &str) -> Result<Arc<dyn RelayBackend>> {
        self.backends.lookup(name).ok_or_else(|| {
            warn!(backend = name, "no relay backend registered under this name");
            RelayError::UnknownBackend {
                name: name.to_string(),
            }
        })
    }

    /// Engage a relay backend for the call carrying `msg`.
    ///
    /// Only meaningful while a new call is being set up: the message
    /// must be an initial INVITE (no to-tag). Violations reject
    /// permanently without touching any state. The backend runs with
    /// the call's lock held; its failure classification is surfaced
    /// verbatim and never retried here.
    pub async fn engage(
        &self,
        msg: &RelayMessage,
        backend: &Arc<dyn RelayBackend>,
        set: Option<u32>,
    ) -> Result<()> {
        if !msg.is_initial_invite() {
            warn!(
                call_id = %msg.call_id,
                "relay can only be engaged on initial INVITEs"
            );
            return Err(RelayError::not_initial(if !msg.is_request() {
                "message is a response"
            } else if msg.to_tag.as_deref().map_or(false, |t| !t.is_empty()) {
                "request already belongs to a dialog"
            } else {
                "method is not INVITE"
            }));
        }

        let set = set.or(self.config.default_set);
        let ctx = self.contexts.get_or_create(&msg.call_id);
        let mut ctx = ctx.lock().await;

        let branch = resolve_branch(BranchSelector::Auto, msg);
        let session = ctx.session_or_create(branch, &self.events);

        if session.disabled {
            debug!(
                call_id = %msg.call_id,
                %branch,
                "relay disabled for this branch, skipping engage"
            );
            return Ok(());
        }

        let offer = resolve_direction(msg.is_request(), msg.role == ProxyRole::Downstream, false);
        debug!(
            call_id = %msg.call_id,
            backend = backend.name(),
            %branch,
            direction = ?offer,
            "engaging relay backend"
        );

        let report = backend.engage(msg, session, set).await.map_err(|source| {
            warn!(
                call_id = %msg.call_id,
                backend = backend.name(),
                error = %source,
                "relay backend engage failed"
            );
            RelayError::EngageFailed {
                backend: backend.name().to_string(),
                source,
            }
        })?;

        for (direction, kind, value) in report.cells {
            session.set_flag(direction, kind, Some(value));
        }
        session.disabled = report.disabled;

        let backend_name = backend.name().to_string();
        ctx.record_engaged(backend_name.clone(), set);
        info!(
            call_id = %msg.call_id,
            backend = %backend_name,
            %branch,
            "relay engaged"
        );
        self.events.emit(RelayEvent::Engaged {
            call_id: msg.call_id.clone(),
            backend: backend_name,
            branch,
        });
        Ok(())
    }

    /// Engage by backend name: resolve (failing fast on unknown names),
    /// then engage
    pub async fn engage_named(
        &self,
        msg: &RelayMessage,
        name: &str,
        set: Option<u32>,
    ) -> Result<()> {
        let backend = self.resolve_backend(name)?;
        self.engage(msg, &backend, set).await
    }

    /// Read a relay variable (see [`crate::vars::read_var`])
    pub async fn read(
        &self,
        spec: &VarSpec,
        msg: &RelayMessage,
        selector: BranchSelector,
    ) -> Option<String> {
        read_var(&self.contexts, spec, msg, selector).await
    }

    /// Write a relay variable (see [`crate::vars::write_var`])
    pub async fn write(
        &self,
        spec: &VarSpec,
        msg: &RelayMessage,
        selector: BranchSelector,
        value: VarValue,
    ) {
        write_var(&self.contexts, &self.events, spec, msg, selector, value).await
    }

    /// Dialog-lifecycle callback: the call is gone, release its relay
    /// state
    pub async fn on_dialog_destroyed(&self, call_id: &CallId) -> bool {
        self.contexts.on_dialog_destroyed(call_id).await
    }
}
