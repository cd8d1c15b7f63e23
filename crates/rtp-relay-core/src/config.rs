//! Engine configuration
//!
//! Mirrors the module-parameter surface a host pipeline exposes for the
//! relay engine. Validation runs at startup so a misconfigured default
//! backend fails the process before any message is handled.

use serde::{Deserialize, Serialize};

use crate::backend::BackendRegistry;
use crate::error::{RelayError, Result};

/// Configuration for the relay engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Backend engaged when the caller names none
    pub default_backend: Option<String>,
    /// Backend set id used when the caller supplies none
    pub default_set: Option<u32>,
}

impl RelayConfig {
    /// Check the configuration against the registered backends.
    ///
    /// A default backend that is not registered is a fatal startup
    /// error, matching the fail-fast policy for unknown backend names.
    pub fn validate(&self, backends: &BackendRegistry) -> Result<()> {
        if let Some(name) = &self.default_backend {
            if backends.lookup(name).is_none() {
                return Err(RelayError::invalid_config(format!(
                    "default backend '{}' is not registered",
                    name
                )));
            }
        }
        Ok(())
    }
}
