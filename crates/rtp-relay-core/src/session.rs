//! Per-branch relay session state
//!
//! A relay session holds the flag values and the disabled bit for one
//! branch of a call (or for the shared all-branches slot). Sessions are
//! owned exclusively by their call's [`RelayContext`](crate::context::RelayContext)
//! and are only ever created on write access: a read that finds no
//! session observes "absent" rather than materializing an empty one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::flags::{FlagKind, FlagStore, MediaDirection};

/// Branch addressed by a relay session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchId {
    /// The shared session covering every branch without one of its own
    All,
    /// One specific fork of the transaction
    Branch(u32),
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchId::All => write!(f, "*"),
            BranchId::Branch(idx) => write!(f, "{}", idx),
        }
    }
}

/// Relay state of one branch: its flags and whether relaying is disabled
#[derive(Debug, Clone)]
pub struct RelaySession {
    /// Branch this session belongs to
    pub branch: BranchId,
    /// Per-direction flag values
    pub flags: FlagStore,
    /// Relaying disabled for this branch
    pub disabled: bool,
}

impl RelaySession {
    pub(crate) fn new(branch: BranchId) -> Self {
        RelaySession {
            branch,
            flags: FlagStore::new(),
            disabled: false,
        }
    }

    /// Read a flag cell for the given direction
    pub fn flag(&self, direction: MediaDirection, kind: FlagKind) -> Option<&str> {
        self.flags.get(direction, kind)
    }

    /// Write a flag cell for the given direction
    pub fn set_flag(&mut self, direction: MediaDirection, kind: FlagKind, value: Option<String>) {
        self.flags.set(direction, kind, value);
    }
}
