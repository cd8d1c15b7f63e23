//! Pluggable relay backend contract and registry
//!
//! A backend owns the actual media-relay negotiation (talking to an
//! rtpproxy-style daemon, rewriting SDP, ...). The engine only knows
//! the capability contract: engage a message against a session's flags
//! and report back what to record. Backends register themselves by name
//! at startup; lookups race with live traffic, so the registry is a
//! read-mostly map behind a read-write lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

use crate::error::{RelayError, Result};
use crate::flags::{FlagKind, MediaDirection};
use crate::message::RelayMessage;
use crate::session::RelaySession;

/// Negotiation failure, classified by the backend itself
#[derive(Debug, Error)]
pub enum BackendError {
    /// The negotiation may succeed if retried later (relay daemon
    /// unreachable, timeout, ...)
    #[error("temporary failure: {0}")]
    Temporary(String),

    /// Retrying cannot help (unsupported media, rejected offer, ...)
    #[error("permanent failure: {0}")]
    Permanent(String),
}

/// State a backend reports back from a successful engage
#[derive(Debug, Clone, Default)]
pub struct EngageReport {
    /// Flag cells to record into the branch session
    pub cells: Vec<(MediaDirection, FlagKind, String)>,
    /// Whether the backend disabled relaying for this branch
    pub disabled: bool,
}

impl EngageReport {
    pub fn new() -> Self {
        EngageReport::default()
    }

    /// Record one flag cell in the report
    pub fn with_cell(
        mut self,
        direction: MediaDirection,
        kind: FlagKind,
        value: impl Into<String>,
    ) -> Self {
        self.cells.push((direction, kind, value.into()));
        self
    }
}

/// Capability contract implemented by every relay backend
///
/// `engage` runs while the call's context lock is held; a slow backend
/// delays other access to the same call, never to other calls. The
/// engine never retries a failed engage and provides no cancellation;
/// timeouts are the backend's responsibility.
#[async_trait::async_trait]
pub trait RelayBackend: Send + Sync {
    /// Name this backend registers under
    fn name(&self) -> &str;

    /// Negotiate the relay for an initial request against the branch
    /// session's current flags
    async fn engage(
        &self,
        msg: &RelayMessage,
        session: &RelaySession,
        set: Option<u32>,
    ) -> std::result::Result<EngageReport, BackendError>;
}

/// Process-wide map of registered relay backends
pub struct BackendRegistry {
    backends: RwLock<HashMap<String, Arc<dyn RelayBackend>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        BackendRegistry {
            backends: RwLock::new(HashMap::new()),
        }
    }

    /// Register a backend under its own name.
    ///
    /// Duplicate registration is a startup configuration error and
    /// fails instead of replacing the existing backend.
    pub fn register(&self, backend: Arc<dyn RelayBackend>) -> Result<()> {
        let name = backend.name().to_string();
        let mut backends = self.backends.write();
        if backends.contains_key(&name) {
            return Err(RelayError::DuplicateBackend { name });
        }
        info!(backend = %name, "registered relay backend");
        backends.insert(name, backend);
        Ok(())
    }

    /// Look up a backend by name
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn RelayBackend>> {
        self.backends.read().get(name).cloned()
    }

    /// Names of all registered backends
    pub fn names(&self) -> Vec<String> {
        self.backends.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
