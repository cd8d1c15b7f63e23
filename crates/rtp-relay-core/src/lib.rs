//! # RTP Relay Core: Per-Call Media Relay Coordination
//!
//! This library implements the relay coordination engine of a SIP proxy
//! pipeline: for each leg of a signaling transaction it decides whether
//! and how to steer the call's media through an external relay backend.
//!
//! ## What it does
//!
//! - **Per-call state**: one [`RelayContext`](context::RelayContext)
//!   per call, holding branch-indexed
//!   [`RelaySession`](session::RelaySession)s behind a single lock:
//!   serialize within a call, parallelize across calls.
//! - **Offer/answer resolution**: a single source of truth
//!   ([`flags::resolve_direction`]) labels every access with the media
//!   direction it targets, regardless of which leg or message kind
//!   triggered it.
//! - **Pluggable backends**: relay implementations register by name in
//!   the [`BackendRegistry`](backend::BackendRegistry) and are engaged
//!   through the [`RelayBackend`](backend::RelayBackend) capability
//!   trait.
//! - **Variable front-end**: the host's read/write accesses on relay
//!   variables resolve through [`vars`] into flag-store cells, with
//!   degrade-and-warn handling of malformed addressing.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use rtp_relay_core::prelude::*;
//!
//! # struct MyBackend;
//! # #[async_trait::async_trait]
//! # impl RelayBackend for MyBackend {
//! #     fn name(&self) -> &str { "rtpproxy" }
//! #     async fn engage(
//! #         &self,
//! #         _msg: &RelayMessage,
//! #         _session: &RelaySession,
//! #         _set: Option<u32>,
//! #     ) -> Result<EngageReport, BackendError> { Ok(EngageReport::new()) }
//! # }
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> rtp_relay_core::Result<()> {
//! let engine = RelayEngine::new(RelayConfig::default());
//! engine.backends().register(Arc::new(MyBackend))?;
//! engine.validate()?;
//!
//! let msg = RelayMessage::initial_invite("a84b4c76e66710");
//! engine.engage_named(&msg, "rtpproxy", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod engage;
pub mod error;
pub mod events;
pub mod flags;
pub mod message;
pub mod session;
pub mod vars;

// Re-export commonly used types
pub use backend::{BackendError, BackendRegistry, EngageReport, RelayBackend};
pub use config::RelayConfig;
pub use context::{BranchSelector, ContextRegistry, EngagedRelay, RelayContext};
pub use engage::RelayEngine;
pub use error::{RelayError, Result};
pub use events::{EventHub, RelayEvent};
pub use flags::{resolve_direction, FlagKind, FlagStore, MediaDirection};
pub use message::{CallId, MessageKind, Method, ProcessingStage, ProxyRole, RelayMessage};
pub use session::{BranchId, RelaySession};
pub use vars::{FlagName, FlagNameResolver, VarSpec, VarValue};

/// Version information for the relay engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commonly used imports for hosts and backends
pub mod prelude {
    pub use crate::backend::{BackendError, EngageReport, RelayBackend};
    pub use crate::config::RelayConfig;
    pub use crate::context::BranchSelector;
    pub use crate::engage::RelayEngine;
    pub use crate::flags::{FlagKind, MediaDirection};
    pub use crate::message::{CallId, Method, ProcessingStage, ProxyRole, RelayMessage};
    pub use crate::session::{BranchId, RelaySession};
    pub use crate::vars::{VarSpec, VarValue};
}
