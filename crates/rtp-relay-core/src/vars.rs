//! Variable accessor front-end
//!
//! Translates the host's read/write requests on relay variables into
//! flag-store accesses through the call's context. A variable spec is
//! parsed once at configuration time; each access then resolves the
//! flag kind (possibly through a host-supplied name resolver), the
//! branch and the media direction before touching the store.
//!
//! Addressing mistakes degrade instead of failing the transaction: a
//! malformed branch index falls back to the all-branches session and an
//! unknown dynamic flag name falls back to the plain `flags` cell, each
//! with a warning.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::context::{resolve_branch, BranchSelector, ContextRegistry};
use crate::error::{RelayError, Result};
use crate::events::EventHub;
use crate::flags::{resolve_direction, FlagKind, MediaDirection};
use crate::message::{ProxyRole, RelayMessage};
use crate::session::BranchId;

/// Host callback resolving a dynamic variable name against a message
///
/// Stands in for the host's expression evaluator: the engine hands it
/// the message and gets back the flag name to use for this access.
pub trait FlagNameResolver: Send + Sync {
    fn resolve(&self, msg: &RelayMessage) -> Option<String>;
}

impl<F> FlagNameResolver for F
where
    F: Fn(&RelayMessage) -> Option<String> + Send + Sync,
{
    fn resolve(&self, msg: &RelayMessage) -> Option<String> {
        self(msg)
    }
}

/// The flag a variable addresses: fixed at parse time or resolved per
/// access
#[derive(Clone)]
pub enum FlagName {
    Known(FlagKind),
    Dynamic(Arc<dyn FlagNameResolver>),
}

impl fmt::Debug for FlagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagName::Known(kind) => f.debug_tuple("Known").field(kind).finish(),
            FlagName::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// A parsed relay variable: which flag it addresses and whether it
/// targets the peer leg
#[derive(Debug, Clone)]
pub struct VarSpec {
    name: FlagName,
    peer: bool,
}

impl VarSpec {
    /// Parse a fixed variable name at configuration time.
    ///
    /// An empty name is a configuration error. An unrecognized name
    /// degrades to the plain `flags` cell with a warning; addressing
    /// mistakes never block the transaction later.
    pub fn parse(name: &str, peer: bool) -> Result<VarSpec> {
        if name.is_empty() {
            return Err(RelayError::invalid_config("empty relay variable name"));
        }
        let kind = match FlagKind::parse(name) {
            FlagKind::Unknown => {
                warn!(
                    name,
                    fallback = %FlagKind::Own,
                    "unknown relay variable name, using default"
                );
                FlagKind::Own
            }
            kind => kind,
        };
        Ok(VarSpec {
            name: FlagName::Known(kind),
            peer,
        })
    }

    /// Build a variable whose flag name is resolved on every access
    pub fn dynamic(resolver: Arc<dyn FlagNameResolver>, peer: bool) -> VarSpec {
        VarSpec {
            name: FlagName::Dynamic(resolver),
            peer,
        }
    }

    pub fn is_peer(&self) -> bool {
        self.peer
    }

    /// Resolve the flag kind for one access.
    ///
    /// A dynamic name that is missing or unrecognized degrades to the
    /// plain `flags` cell with a warning.
    fn kind(&self, msg: &RelayMessage) -> FlagKind {
        match &self.name {
            FlagName::Known(kind) => *kind,
            FlagName::Dynamic(resolver) => {
                let kind = match resolver.resolve(msg) {
                    Some(name) => FlagKind::parse(&name),
                    None => {
                        warn!(call_id = %msg.call_id, "cannot resolve relay variable name");
                        FlagKind::Unknown
                    }
                };
                if kind == FlagKind::Unknown {
                    warn!(
                        call_id = %msg.call_id,
                        fallback = %FlagKind::Own,
                        "unknown relay variable name, using default"
                    );
                    FlagKind::Own
                } else {
                    kind
                }
            }
        }
    }

    fn direction(&self, msg: &RelayMessage) -> MediaDirection {
        resolve_direction(
            msg.is_request(),
            msg.role == ProxyRole::Downstream,
            self.peer,
        )
    }
}

/// A value written to a relay variable, mirroring the host's typed
/// variable values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarValue {
    Null,
    Int(i64),
    Str(String),
}

impl VarValue {
    /// Truth value used by the `disabled` flag: null and empty strings
    /// are false, integers use their truth value, any other string is
    /// true
    fn truthy(&self) -> bool {
        match self {
            VarValue::Null => false,
            VarValue::Int(i) => *i != 0,
            VarValue::Str(s) => !s.is_empty(),
        }
    }

    /// Stored form for regular flag cells: null clears, integers are
    /// written in decimal
    fn into_cell(self) -> Option<String> {
        match self {
            VarValue::Null => None,
            VarValue::Int(i) => Some(i.to_string()),
            VarValue::Str(s) => Some(s),
        }
    }
}

/// Read a relay variable for the given message.
///
/// Returns `None` when the call has no relay context, the addressed
/// branch has no session, or the cell is empty. Reads never create
/// state.
pub async fn read_var(
    contexts: &ContextRegistry,
    spec: &VarSpec,
    msg: &RelayMessage,
    selector: BranchSelector,
) -> Option<String> {
    let ctx = contexts.try_get(&msg.call_id)?;
    let ctx = ctx.lock().await;

    // a branch without a session of its own reads through the shared
    // all-branches session
    let branch = resolve_branch(selector, msg);
    let session = ctx.session(branch).or_else(|| match branch {
        BranchId::All => None,
        BranchId::Branch(_) => ctx.session(BranchId::All),
    })?;

    let kind = spec.kind(msg);
    if kind == FlagKind::Disabled {
        return Some(if session.disabled {
            "disabled".to_string()
        } else {
            "enabled".to_string()
        });
    }
    let direction = spec.direction(msg);
    session.flag(direction, kind).map(str::to_string)
}

/// Write a relay variable for the given message.
///
/// The write path creates the call's context and the branch session as
/// needed; this is the only implicit session-creation point besides
/// engage.
pub async fn write_var(
    contexts: &ContextRegistry,
    events: &EventHub,
    spec: &VarSpec,
    msg: &RelayMessage,
    selector: BranchSelector,
    value: VarValue,
) {
    let ctx = contexts.get_or_create(&msg.call_id);
    let mut ctx = ctx.lock().await;

    let branch = resolve_branch(selector, msg);
    let kind = spec.kind(msg);
    let direction = spec.direction(msg);
    let session = ctx.session_or_create(branch, events);

    if kind == FlagKind::Disabled {
        session.disabled = value.truthy();
        return;
    }
    session.set_flag(direction, kind, value.into_cell());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CallId, MessageKind};

    fn setup() -> (ContextRegistry, EventHub) {
        let (events, _rx) = EventHub::channel();
        let registry = ContextRegistry::new(events.clone());
        (registry, events)
    }

    #[test]
    fn spec_parsing() {
        assert!(VarSpec::parse("flags", false).is_ok());
        assert!(VarSpec::parse("DISABLED", true).is_ok());
        assert!(VarSpec::parse("", false).is_err());
        // unknown names degrade instead of failing setup
        assert!(VarSpec::parse("bogus", false).is_ok());
    }

    #[tokio::test]
    async fn unknown_fixed_name_reads_the_flags_cell() {
        let (contexts, events) = setup();
        let msg = RelayMessage::initial_invite("call-bogus");

        let plain = VarSpec::parse("flags", false).unwrap();
        write_var(
            &contexts,
            &events,
            &plain,
            &msg,
            BranchSelector::Auto,
            VarValue::Str("a=sendrecv".into()),
        )
        .await;

        let bogus = VarSpec::parse("bogus", false).unwrap();
        assert_eq!(
            read_var(&contexts, &bogus, &msg, BranchSelector::Auto).await,
            read_var(&contexts, &plain, &msg, BranchSelector::Auto).await,
        );
        assert_eq!(
            read_var(&contexts, &bogus, &msg, BranchSelector::Auto).await,
            Some("a=sendrecv".to_string())
        );
    }

    #[tokio::test]
    async fn branch_reads_fall_back_to_the_shared_session() {
        let (contexts, events) = setup();
        let spec = VarSpec::parse("type", false).unwrap();
        let msg = RelayMessage::initial_invite("call-fallback");

        // a value written to the shared session is visible from any
        // branch that has no session of its own
        write_var(
            &contexts,
            &events,
            &spec,
            &msg,
            BranchSelector::All,
            VarValue::Str("shared".into()),
        )
        .await;
        assert_eq!(
            read_var(&contexts, &spec, &msg, BranchSelector::Index(3)).await,
            Some("shared".to_string())
        );

        // once the branch has its own session, that session wins
        write_var(
            &contexts,
            &events,
            &spec,
            &msg,
            BranchSelector::Index(3),
            VarValue::Str("own".into()),
        )
        .await;
        assert_eq!(
            read_var(&contexts, &spec, &msg, BranchSelector::Index(3)).await,
            Some("own".to_string())
        );
        assert_eq!(
            read_var(&contexts, &spec, &msg, BranchSelector::All).await,
            Some("shared".to_string())
        );
    }

    #[tokio::test]
    async fn read_never_creates_state() {
        let (contexts, _events) = setup();
        let spec = VarSpec::parse("ip", false).unwrap();
        let msg = RelayMessage::initial_invite("quiet-call");

        assert_eq!(
            read_var(&contexts, &spec, &msg, BranchSelector::Auto).await,
            None
        );
        assert!(contexts.is_empty());
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let (contexts, events) = setup();
        let msg = RelayMessage::initial_invite("call-rt");

        for name in ["flags", "peer", "ip", "type", "iface"] {
            let spec = VarSpec::parse(name, false).unwrap();
            write_var(
                &contexts,
                &events,
                &spec,
                &msg,
                BranchSelector::Auto,
                VarValue::Str(format!("v-{}", name)),
            )
            .await;
            assert_eq!(
                read_var(&contexts, &spec, &msg, BranchSelector::Auto).await,
                Some(format!("v-{}", name))
            );

            // null clears the cell
            write_var(
                &contexts,
                &events,
                &spec,
                &msg,
                BranchSelector::Auto,
                VarValue::Null,
            )
            .await;
            assert_eq!(
                read_var(&contexts, &spec, &msg, BranchSelector::Auto).await,
                None
            );
        }
    }

    #[tokio::test]
    async fn integers_are_written_in_decimal() {
        let (contexts, events) = setup();
        let spec = VarSpec::parse("type", false).unwrap();
        let msg = RelayMessage::initial_invite("call-int");

        write_var(
            &contexts,
            &events,
            &spec,
            &msg,
            BranchSelector::Auto,
            VarValue::Int(42),
        )
        .await;
        assert_eq!(
            read_var(&contexts, &spec, &msg, BranchSelector::Auto).await,
            Some("42".to_string())
        );
    }

    #[tokio::test]
    async fn disabled_coercion() {
        let (contexts, events) = setup();
        let spec = VarSpec::parse("disabled", false).unwrap();
        let msg = RelayMessage::initial_invite("call-dis");

        // fresh session reads enabled
        write_var(
            &contexts,
            &events,
            &spec,
            &msg,
            BranchSelector::Auto,
            VarValue::Null,
        )
        .await;
        assert_eq!(
            read_var(&contexts, &spec, &msg, BranchSelector::Auto).await,
            Some("enabled".to_string())
        );

        for (value, expected) in [
            (VarValue::Str("yes".into()), "disabled"),
            (VarValue::Str(String::new()), "enabled"),
            (VarValue::Int(1), "disabled"),
            (VarValue::Int(0), "enabled"),
            (VarValue::Null, "enabled"),
        ] {
            write_var(
                &contexts,
                &events,
                &spec,
                &msg,
                BranchSelector::Auto,
                value,
            )
            .await;
            assert_eq!(
                read_var(&contexts, &spec, &msg, BranchSelector::Auto).await,
                Some(expected.to_string())
            );
        }
    }

    #[tokio::test]
    async fn branch_sessions_are_isolated() {
        let (contexts, events) = setup();
        let spec = VarSpec::parse("ip", false).unwrap();
        let msg = RelayMessage::initial_invite("call-iso");

        write_var(
            &contexts,
            &events,
            &spec,
            &msg,
            BranchSelector::Index(1),
            VarValue::Str("10.0.0.1".into()),
        )
        .await;

        assert_eq!(
            read_var(&contexts, &spec, &msg, BranchSelector::Index(1)).await,
            Some("10.0.0.1".to_string())
        );
        assert_eq!(
            read_var(&contexts, &spec, &msg, BranchSelector::Index(2)).await,
            None
        );
        // no all-branches session was created either
        assert_eq!(
            read_var(&contexts, &spec, &msg, BranchSelector::All).await,
            None
        );
    }

    #[tokio::test]
    async fn unknown_dynamic_name_falls_back_to_flags() {
        let (contexts, events) = setup();
        let msg = RelayMessage::initial_invite("call-dyn");

        let plain = VarSpec::parse("flags", false).unwrap();
        write_var(
            &contexts,
            &events,
            &plain,
            &msg,
            BranchSelector::Auto,
            VarValue::Str("a=rtcp".into()),
        )
        .await;

        let bogus = VarSpec::dynamic(Arc::new(|_: &RelayMessage| Some("bogus".to_string())), false);
        assert_eq!(
            read_var(&contexts, &bogus, &msg, BranchSelector::Auto).await,
            Some("a=rtcp".to_string())
        );

        let unresolved = VarSpec::dynamic(Arc::new(|_: &RelayMessage| None), false);
        assert_eq!(
            read_var(&contexts, &unresolved, &msg, BranchSelector::Auto).await,
            Some("a=rtcp".to_string())
        );
    }

    #[tokio::test]
    async fn dynamic_name_resolving_to_known_kind() {
        let (contexts, events) = setup();
        let msg = RelayMessage::initial_invite("call-dyn2");

        let dynamic = VarSpec::dynamic(Arc::new(|_: &RelayMessage| Some("ip".to_string())), false);
        write_var(
            &contexts,
            &events,
            &dynamic,
            &msg,
            BranchSelector::Auto,
            VarValue::Str("192.0.2.7".into()),
        )
        .await;

        let fixed = VarSpec::parse("ip", false).unwrap();
        assert_eq!(
            read_var(&contexts, &fixed, &msg, BranchSelector::Auto).await,
            Some("192.0.2.7".to_string())
        );
    }

    #[tokio::test]
    async fn peer_variable_addresses_the_opposite_direction() {
        let (contexts, events) = setup();
        let msg = RelayMessage::initial_invite("call-peer");

        // downstream request: self -> offer, peer -> answer
        let own = VarSpec::parse("ip", false).unwrap();
        let peer = VarSpec::parse("ip", true).unwrap();

        write_var(
            &contexts,
            &events,
            &own,
            &msg,
            BranchSelector::Auto,
            VarValue::Str("left".into()),
        )
        .await;
        write_var(
            &contexts,
            &events,
            &peer,
            &msg,
            BranchSelector::Auto,
            VarValue::Str("right".into()),
        )
        .await;

        assert_eq!(
            read_var(&contexts, &own, &msg, BranchSelector::Auto).await,
            Some("left".to_string())
        );
        assert_eq!(
            read_var(&contexts, &peer, &msg, BranchSelector::Auto).await,
            Some("right".to_string())
        );

        // the peer view of a response within the same transaction sees
        // what the request's self view wrote
        let mut resp = msg.clone();
        resp.kind = MessageKind::Response;
        assert_eq!(
            read_var(&contexts, &peer, &resp, BranchSelector::Auto).await,
            Some("left".to_string())
        );
    }

    #[tokio::test]
    async fn missing_context_reads_as_absent_for_disabled_too() {
        let (contexts, _events) = setup();
        let spec = VarSpec::parse("disabled", false).unwrap();
        let msg = RelayMessage {
            call_id: CallId::new("no-ctx"),
            ..RelayMessage::initial_invite("no-ctx")
        };
        assert_eq!(
            read_var(&contexts, &spec, &msg, BranchSelector::Auto).await,
            None
        );
    }
}
