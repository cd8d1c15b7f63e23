//! Per-call relay context and the cross-call context registry
//!
//! A [`RelayContext`] is the unit of mutual exclusion: every worker
//! touching any branch of the same call goes through the context's one
//! lock, while unrelated calls never contend. The registry maps call
//! identities to their contexts, creates them lazily on write paths,
//! and releases them when the dialog layer reports the call gone.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::events::{EventHub, RelayEvent};
use crate::message::{CallId, RelayMessage};
use crate::session::{BranchId, RelaySession};

/// Record of the backend engaged for a call
#[derive(Debug, Clone)]
pub struct EngagedRelay {
    /// Name the backend was registered under
    pub backend: String,
    /// Optional backend-defined set id selected at engage time
    pub set: Option<u32>,
}

/// Relay state of one call: its branch sessions and engagement record
///
/// Sessions keep insertion order; there is at most one session per
/// branch value, including the all-branches slot.
#[derive(Debug)]
pub struct RelayContext {
    call_id: CallId,
    sessions: Vec<RelaySession>,
    engaged: Option<EngagedRelay>,
}

impl RelayContext {
    fn new(call_id: CallId) -> Self {
        RelayContext {
            call_id,
            sessions: Vec::new(),
            engaged: None,
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// Pure lookup; never creates
    pub fn session(&self, branch: BranchId) -> Option<&RelaySession> {
        self.sessions.iter().find(|s| s.branch == branch)
    }

    /// Mutable lookup; never creates
    pub fn session_mut(&mut self, branch: BranchId) -> Option<&mut RelaySession> {
        self.sessions.iter_mut().find(|s| s.branch == branch)
    }

    /// Fetch the branch's session, creating it if absent. Only write
    /// paths may call this; reads observe missing sessions as absent.
    pub fn session_or_create(&mut self, branch: BranchId, events: &EventHub) -> &mut RelaySession {
        if let Some(pos) = self.sessions.iter().position(|s| s.branch == branch) {
            return &mut self.sessions[pos];
        }
        debug!(call_id = %self.call_id, %branch, "creating relay session");
        self.sessions.push(RelaySession::new(branch));
        events.emit(RelayEvent::SessionCreated {
            call_id: self.call_id.clone(),
            branch,
        });
        self.sessions.last_mut().unwrap()
    }

    /// Number of sessions held by this context
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Branches with a session, in creation order
    pub fn branches(&self) -> impl Iterator<Item = BranchId> + '_ {
        self.sessions.iter().map(|s| s.branch)
    }

    /// The engagement record, if a backend was engaged for this call
    pub fn engaged(&self) -> Option<&EngagedRelay> {
        self.engaged.as_ref()
    }

    pub(crate) fn record_engaged(&mut self, backend: String, set: Option<u32>) {
        self.engaged = Some(EngagedRelay { backend, set });
    }
}

/// Branch selector supplied with a variable access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchSelector {
    /// No selector: substitute the active branch in branch-stage
    /// processing, the all-branches slot otherwise
    Auto,
    /// The wildcard selector
    All,
    /// An explicit index; negative values degrade to the wildcard
    Index(i64),
}

/// Resolve a selector to a branch, degrading malformed input to the
/// all-branches slot with a warning rather than failing the access.
pub fn resolve_branch(selector: BranchSelector, msg: &RelayMessage) -> BranchId {
    match selector {
        BranchSelector::Auto => match msg.active_branch() {
            Some(idx) => BranchId::Branch(idx),
            None => BranchId::All,
        },
        BranchSelector::All => BranchId::All,
        BranchSelector::Index(idx) if idx >= 0 && idx <= u32::MAX as i64 => {
            BranchId::Branch(idx as u32)
        }
        BranchSelector::Index(idx) => {
            warn!(
                call_id = %msg.call_id,
                index = idx,
                "only positive integer relay branches or '*' are allowed, ignoring"
            );
            BranchId::All
        }
    }
}

/// Cross-call map of relay contexts
///
/// Lookups of different calls proceed in parallel; all access within a
/// call serializes on the context's own lock.
#[derive(Debug)]
pub struct ContextRegistry {
    contexts: DashMap<CallId, Arc<Mutex<RelayContext>>>,
    events: EventHub,
}

impl ContextRegistry {
    pub fn new(events: EventHub) -> Self {
        ContextRegistry {
            contexts: DashMap::new(),
            events,
        }
    }

    /// Pure lookup; never creates a context
    pub fn try_get(&self, call_id: &CallId) -> Option<Arc<Mutex<RelayContext>>> {
        self.contexts.get(call_id).map(|entry| entry.value().clone())
    }

    /// Fetch the call's context, creating it if absent
    pub fn get_or_create(&self, call_id: &CallId) -> Arc<Mutex<RelayContext>> {
        if let Some(ctx) = self.try_get(call_id) {
            return ctx;
        }
        let entry = self
            .contexts
            .entry(call_id.clone())
            .or_insert_with(|| {
                debug!(%call_id, "creating relay context");
                self.events.emit(RelayEvent::ContextCreated {
                    call_id: call_id.clone(),
                });
                Arc::new(Mutex::new(RelayContext::new(call_id.clone())))
            });
        entry.value().clone()
    }

    /// Release the call's relay state.
    ///
    /// Invoked from the dialog layer's destruction callback. The
    /// context lock is taken before the state is dropped so no accessor
    /// can observe the context mid-teardown.
    pub async fn on_dialog_destroyed(&self, call_id: &CallId) -> bool {
        let Some((_, ctx)) = self.contexts.remove(call_id) else {
            return false;
        };
        {
            let guard = ctx.lock().await;
            debug!(
                %call_id,
                sessions = guard.session_count(),
                "destroying relay context"
            );
        }
        self.events.emit(RelayEvent::ContextDestroyed {
            call_id: call_id.clone(),
        });
        true
    }

    /// Number of calls currently holding relay state
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ProcessingStage;

    fn registry() -> ContextRegistry {
        let (events, _rx) = EventHub::channel();
        ContextRegistry::new(events)
    }

    #[tokio::test]
    async fn try_get_never_creates() {
        let reg = registry();
        assert!(reg.try_get(&CallId::new("c1")).is_none());
        assert!(reg.is_empty());

        reg.get_or_create(&CallId::new("c1"));
        assert!(reg.try_get(&CallId::new("c1")).is_some());
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn contexts_are_per_call() {
        let reg = registry();
        let a = reg.get_or_create(&CallId::new("a"));
        let b = reg.get_or_create(&CallId::new("b"));
        assert!(!Arc::ptr_eq(&a, &b));
        let a2 = reg.get_or_create(&CallId::new("a"));
        assert!(Arc::ptr_eq(&a, &a2));
    }

    #[tokio::test]
    async fn one_session_per_branch() {
        let (events, _rx) = EventHub::channel();
        let mut ctx = RelayContext::new(CallId::new("c1"));
        ctx.session_or_create(BranchId::Branch(0), &events);
        ctx.session_or_create(BranchId::Branch(0), &events);
        ctx.session_or_create(BranchId::All, &events);
        assert_eq!(ctx.session_count(), 2);
        assert_eq!(
            ctx.branches().collect::<Vec<_>>(),
            vec![BranchId::Branch(0), BranchId::All]
        );
    }

    #[tokio::test]
    async fn dialog_destroyed_releases_the_context() {
        let reg = registry();
        let call = CallId::new("gone");
        reg.get_or_create(&call);
        assert!(reg.on_dialog_destroyed(&call).await);
        assert!(reg.try_get(&call).is_none());
        // second callback for the same call is a no-op
        assert!(!reg.on_dialog_destroyed(&call).await);
    }

    #[test]
    fn branch_resolution_policy() {
        let mut msg = RelayMessage::initial_invite("c1");

        // no selector outside branch processing -> all branches
        assert_eq!(resolve_branch(BranchSelector::Auto, &msg), BranchId::All);

        // no selector inside branch processing -> active branch
        msg.stage = ProcessingStage::Branch(4);
        assert_eq!(
            resolve_branch(BranchSelector::Auto, &msg),
            BranchId::Branch(4)
        );

        // explicit index wins over the active branch
        assert_eq!(
            resolve_branch(BranchSelector::Index(1), &msg),
            BranchId::Branch(1)
        );

        // wildcard
        assert_eq!(resolve_branch(BranchSelector::All, &msg), BranchId::All);

        // malformed index degrades to all branches
        assert_eq!(resolve_branch(BranchSelector::Index(-2), &msg), BranchId::All);
    }
}
