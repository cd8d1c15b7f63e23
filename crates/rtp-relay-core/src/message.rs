//! Boundary representation of a proxied SIP message
//!
//! The engine never parses SIP. The host pipeline hands it a
//! [`RelayMessage`] carrying the handful of facts the coordination
//! logic inspects: message kind, method, call identity, the to-tag
//! (dialog binding), the processing stage, the proxy's position
//! relative to the querying leg, and the opaque SDP body for backends.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Stable identity of the call/dialog a message belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(String);

impl CallId {
    /// Create a call identity from the host's Call-ID value
    pub fn new(id: impl Into<String>) -> Self {
        CallId(id.into())
    }

    /// The raw identity string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        CallId::new(id)
    }
}

impl From<String> for CallId {
    fn from(id: String) -> Self {
        CallId::new(id)
    }
}

/// Request or response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Request,
    Response,
}

/// SIP method of the message (or of the transaction it answers)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Update,
    Other(String),
}

/// The proxy's position relative to the leg a query originates from
///
/// Downstream means the proxy sits between the querying leg and the
/// callee; upstream means the caller side. The offer/answer resolver
/// uses this to label media directions consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyRole {
    Downstream,
    Upstream,
}

/// Which pipeline stage is currently processing the message
///
/// Branch-stage processing carries the index of the active fork, which
/// the engine substitutes when a query supplies no branch selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStage {
    /// Initial request processing
    Request,
    /// Failure handling after a negative final response
    Failure,
    /// Per-branch fan-out processing
    Branch(u32),
    /// Response processing
    Response,
}

/// A proxied message as seen by the relay engine
#[derive(Debug, Clone)]
pub struct RelayMessage {
    /// Request or response
    pub kind: MessageKind,
    /// Method of the enclosing transaction
    pub method: Method,
    /// Call identity the message belongs to
    pub call_id: CallId,
    /// To-tag, present once the request is bound to a dialog
    pub to_tag: Option<String>,
    /// Pipeline stage currently processing this message
    pub stage: ProcessingStage,
    /// Proxy position relative to the querying leg
    pub role: ProxyRole,
    /// Opaque message body (SDP), consumed by backends only
    pub body: Bytes,
}

impl RelayMessage {
    /// Build an initial INVITE in request-stage processing, the shape
    /// engage expects
    pub fn initial_invite(call_id: impl Into<CallId>) -> Self {
        RelayMessage {
            kind: MessageKind::Request,
            method: Method::Invite,
            call_id: call_id.into(),
            to_tag: None,
            stage: ProcessingStage::Request,
            role: ProxyRole::Downstream,
            body: Bytes::new(),
        }
    }

    pub fn is_request(&self) -> bool {
        self.kind == MessageKind::Request
    }

    /// Whether this is a dialog-establishing INVITE: a request with no
    /// to-tag yet
    pub fn is_initial_invite(&self) -> bool {
        self.is_request()
            && self.method == Method::Invite
            && self.to_tag.as_deref().map_or(true, str::is_empty)
    }

    /// The active branch index when in branch-stage processing
    pub fn active_branch(&self) -> Option<u32> {
        match self.stage {
            ProcessingStage::Branch(idx) => Some(idx),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_invite_detection() {
        let mut msg = RelayMessage::initial_invite("call-1");
        assert!(msg.is_initial_invite());

        // an empty to-tag still counts as initial
        msg.to_tag = Some(String::new());
        assert!(msg.is_initial_invite());

        msg.to_tag = Some("as7d9".into());
        assert!(!msg.is_initial_invite());

        let mut resp = RelayMessage::initial_invite("call-2");
        resp.kind = MessageKind::Response;
        assert!(!resp.is_initial_invite());
    }

    #[test]
    fn active_branch_only_in_branch_stage() {
        let mut msg = RelayMessage::initial_invite("call-3");
        assert_eq!(msg.active_branch(), None);
        msg.stage = ProcessingStage::Branch(2);
        assert_eq!(msg.active_branch(), Some(2));
    }
}
