//! Per-session relay flags and offer/answer direction resolution
//!
//! Flags are small string-valued settings a relay backend consumes when
//! negotiating media (target IP, relay type, interface, ...). Each
//! session keeps one value per flag kind and media direction. The
//! direction itself is not stored: it is derived per access from the
//! message kind and the proxy's position, so that every accessor agrees
//! on what "my offer" and "the peer's answer" mean within a
//! transaction.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Media negotiation direction of a flag access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaDirection {
    Offer,
    Answer,
}

/// The recognized relay flag kinds
///
/// `Own` holds the generic relay flags of the queried leg (the `flags`
/// token in variable names); `Disabled` is represented by the session's
/// boolean rather than a stored string; `Unknown` is the parse result
/// for unrecognized names and is resolved to `Own` before any store
/// access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagKind {
    /// Relay flags for the queried leg (`flags`)
    Own,
    /// Relay flags for the opposite leg (`peer`)
    Peer,
    /// Relay target IP (`ip`)
    Ip,
    /// Relay type (`type`)
    Type,
    /// Relay interface (`iface`)
    Iface,
    /// Relaying disabled for the session (`disabled`)
    Disabled,
    /// Unrecognized flag name
    Unknown,
}

impl FlagKind {
    /// Parse a flag name, case-insensitively. Unrecognized names parse
    /// to [`FlagKind::Unknown`]; rejecting them is the caller's call.
    pub fn parse(name: &str) -> FlagKind {
        if name.eq_ignore_ascii_case("flags") {
            FlagKind::Own
        } else if name.eq_ignore_ascii_case("peer") {
            FlagKind::Peer
        } else if name.eq_ignore_ascii_case("ip") {
            FlagKind::Ip
        } else if name.eq_ignore_ascii_case("type") {
            FlagKind::Type
        } else if name.eq_ignore_ascii_case("iface") {
            FlagKind::Iface
        } else if name.eq_ignore_ascii_case("disabled") {
            FlagKind::Disabled
        } else {
            FlagKind::Unknown
        }
    }

    /// Canonical token for this kind, as used in variable names and logs
    pub fn token(&self) -> &'static str {
        match self {
            FlagKind::Own => "flags",
            FlagKind::Peer => "peer",
            FlagKind::Ip => "ip",
            FlagKind::Type => "type",
            FlagKind::Iface => "iface",
            FlagKind::Disabled => "disabled",
            FlagKind::Unknown => "unknown",
        }
    }

    /// Storage slot for kinds kept as string cells; `Disabled` and
    /// `Unknown` have no cell of their own
    fn slot(&self) -> Option<usize> {
        match self {
            FlagKind::Own => Some(0),
            FlagKind::Peer => Some(1),
            FlagKind::Ip => Some(2),
            FlagKind::Type => Some(3),
            FlagKind::Iface => Some(4),
            FlagKind::Disabled | FlagKind::Unknown => None,
        }
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Number of flag kinds stored as string cells
const STORED_FLAGS: usize = 5;

/// Fixed direction-by-kind table of flag values for one relay session
#[derive(Debug, Clone, Default)]
pub struct FlagStore {
    cells: [[Option<String>; STORED_FLAGS]; 2],
}

impl FlagStore {
    pub fn new() -> Self {
        FlagStore::default()
    }

    fn row(direction: MediaDirection) -> usize {
        match direction {
            MediaDirection::Offer => 0,
            MediaDirection::Answer => 1,
        }
    }

    /// Read a stored cell. Kinds without a cell read as absent.
    pub fn get(&self, direction: MediaDirection, kind: FlagKind) -> Option<&str> {
        let slot = kind.slot()?;
        self.cells[Self::row(direction)][slot].as_deref()
    }

    /// Replace a stored cell, dropping any previous value. `None`
    /// clears the cell. Writes to kinds without a cell are ignored.
    pub fn set(&mut self, direction: MediaDirection, kind: FlagKind, value: Option<String>) {
        if let Some(slot) = kind.slot() {
            self.cells[Self::row(direction)][slot] = value;
        }
    }
}

/// Resolve the media direction of a flag access.
///
/// Starting from the message kind, a peer-targeted query flips the
/// request bit; the proxy's position then decides whether a request
/// maps to the offer or the answer side.
pub fn resolve_direction(is_request: bool, downstream: bool, for_peer: bool) -> MediaDirection {
    let req = if for_peer { !is_request } else { is_request };
    if downstream {
        if req {
            MediaDirection::Offer
        } else {
            MediaDirection::Answer
        }
    } else if req {
        MediaDirection::Answer
    } else {
        MediaDirection::Offer
    }
}
