//! Action manager
//!
//! Owns every started action and advances them once per `update(dt)`.
//! Actions are addressed by [`ActionId`] and tagged with scope names for bulk
//! control.
//!
//! # Features
//!
//! - Idempotent `start`: a running action keeps its progress, a paused one is resumed
//! - Scope tagging with stacked or independent [`ScopePolicy`]
//! - Keyed pause/resume per action or per scope; actions started in a paused
//!   scope start paused
//! - Reentrancy safe: callbacks may start, stop or query actions of the
//!   manager that is currently updating them
//!
//! Starting an action while the manager is updating (from any callback)
//! parks it in a pending table. It is started right away but only joins the
//! main table at the beginning of the next `update`, and receives its first
//! time on the update after that.
//!
//! `Manager` is a cheap handle; clones share the same state.
//!
//! The free functions [`push`], [`pop`] and [`current`] manage the thread's
//! manager stack used by the crate-level façade.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::action::{Action, ActionId, State};
use crate::error::{Result, SeqError};
use crate::global;
use crate::inspector::InspectSnapshot;
use crate::scope::{ScopePolicy, ScopeStack};

/// Step used to drive an action to completion in `stop_and_finish`
const FINISH_STEP: Duration = Duration::from_secs(99 * 60 * 60);

/// A started action plus its bookkeeping
struct Entry {
    action: Action,
    scopes: SmallVec<[String; 2]>,
    /// Non-zero while this entry's update is on the call stack
    depth: Cell<u32>,
}

impl Entry {
    fn in_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Run `f` with the reentrancy guard raised
    fn guarded<R>(&self, f: impl FnOnce(&Action) -> R) -> R {
        self.depth.set(self.depth.get() + 1);
        let result = f(&self.action);
        self.depth.set(self.depth.get() - 1);
        result
    }
}

type EntryMap = IndexMap<ActionId, Rc<Entry>, FxBuildHasher>;

#[derive(Default)]
struct ManagerInner {
    actions: RefCell<EntryMap>,
    pending: RefCell<EntryMap>,
    scopes: RefCell<ScopeStack>,
    paused_scopes: RefCell<BTreeSet<(String, String)>>,
    /// Nesting level of `update` calls in progress
    updating: Cell<u32>,
}

/// Owner of started actions
///
/// No internal borrow is held while user callbacks run, so every method may
/// be called from inside `on_begin`/`on_step`/`on_update`/`on_end`.
#[derive(Clone, Default)]
pub struct Manager {
    inner: Rc<ManagerInner>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether both handles point at the same manager
    pub fn ptr_eq(&self, other: &Manager) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    fn find(&self, id: ActionId) -> Option<Rc<Entry>> {
        if let Some(entry) = self.inner.pending.borrow().get(&id) {
            return Some(entry.clone());
        }
        self.inner.actions.borrow().get(&id).cloned()
    }

    /// Snapshot of all entries, main table first
    fn entries(&self) -> Vec<Rc<Entry>> {
        let mut entries: Vec<Rc<Entry>> = self.inner.actions.borrow().values().cloned().collect();
        entries.extend(self.inner.pending.borrow().values().cloned());
        entries
    }

    fn entries_in_scope(&self, scope: &str) -> Vec<Rc<Entry>> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.in_scope(scope))
            .collect()
    }

    fn with_action<R>(&self, id: ActionId, default: R, f: impl FnOnce(&Action) -> R) -> R {
        match self.find(id) {
            Some(entry) => f(&entry.action),
            None => default,
        }
    }

    // ========================================================================
    // Starting
    // ========================================================================

    /// Start `action`, tagging it according to `policy`
    ///
    /// Returns the action's id. Invalid actions are ignored and yield
    /// [`ActionId::INVALID`].
    pub fn start(&self, action: Action, policy: impl Into<ScopePolicy>) -> ActionId {
        let id = action.id();
        if !action.is_valid() {
            tracing::warn!("Manager: ignoring start of an invalid action");
            return ActionId::INVALID;
        }

        if let Some(existing) = self.find(id) {
            match existing.action.state() {
                State::Running => return id,
                State::Paused => {
                    existing.action.resume("", false);
                    return id;
                }
                State::Finished => {}
            }
        }

        let policy = policy.into();
        let scopes = policy.resolve(&self.inner.scopes.borrow());
        let entry = Rc::new(Entry {
            action,
            scopes: SmallVec::from_vec(scopes),
            depth: Cell::new(0),
        });

        let deferred =
            self.inner.updating.get() > 0 || self.inner.actions.borrow().contains_key(&id);
        if deferred {
            self.inner.pending.borrow_mut().insert(id, entry.clone());
        } else {
            self.inner.actions.borrow_mut().insert(id, entry.clone());
        }
        tracing::debug!(
            "Manager: start {} (scopes={:?}, deferred={})",
            id,
            entry.scopes,
            deferred
        );

        self.start_entry(&entry);
        id
    }

    fn start_entry(&self, entry: &Entry) {
        let scope_key = self
            .inner
            .paused_scopes
            .borrow()
            .iter()
            .find(|(scope, _)| entry.in_scope(scope))
            .map(|(_, key)| key.clone());

        entry.guarded(Action::start);

        if let Some(key) = scope_key {
            if !entry.action.is_finished() {
                entry.action.pause_forced(&key);
            }
        }
    }

    // ========================================================================
    // Per-Action Control
    // ========================================================================

    /// Interrupt an action; `on_end` does not fire
    pub fn stop(&self, id: ActionId) {
        let pending = self.inner.pending.borrow_mut().shift_remove(&id);
        if let Some(entry) = pending {
            entry.action.stop();
        }
        let tracked = self.inner.actions.borrow().get(&id).cloned();
        if let Some(entry) = tracked {
            entry.action.stop();
        }
    }

    pub fn pause(&self, id: ActionId) {
        self.with_action(id, (), |action| action.pause(""));
    }

    /// Resume an action paused without a key
    pub fn resume(&self, id: ActionId) {
        self.with_action(id, (), |action| action.resume("", false));
    }

    /// Ask an action to finish gracefully at its next natural boundary
    pub fn stop_when_finished(&self, id: ActionId) {
        self.with_action(id, (), |action| action.stop_when_finished(true));
    }

    /// Drive an action to completion right now
    ///
    /// Returns [`SeqError::ReentrantStopAndFinish`] when called from inside
    /// the action's own update; the action is stopped in that case. An
    /// action that can never finish (an endless repeat of something that
    /// ignores wind-down requests) makes this loop forever.
    pub fn stop_and_finish(&self, id: ActionId) -> Result<()> {
        let Some(entry) = self.find(id) else {
            return Ok(());
        };
        if entry.action.is_finished() {
            return Ok(());
        }

        if entry.depth.get() > 0 {
            entry.action.stop();
            tracing::error!("Manager: stop_and_finish on {} from its own callbacks", id);
            return Err(SeqError::ReentrantStopAndFinish(id));
        }

        entry.action.stop_and_finished(true);
        entry.action.stop_when_finished(true);
        loop {
            entry.action.resume("", true);
            if entry.guarded(|action| action.update(FINISH_STEP)) == State::Finished {
                break;
            }
        }
        tracing::debug!("Manager: stop_and_finish {}", id);
        Ok(())
    }

    pub fn set_speed_multiplier(&self, id: ActionId, multiplier: f32) {
        self.with_action(id, (), |action| action.set_speed_multiplier(multiplier));
    }

    /// Seek an action
    pub fn set_elapsed(&self, id: ActionId, elapsed: Duration) {
        self.with_action(id, (), |action| action.set_elapsed(elapsed));
    }

    /// Advance a single action outside the regular tick
    ///
    /// Finished actions stay tracked until the next `update`.
    pub fn update_action(&self, id: ActionId, dt: Duration) {
        if let Some(entry) = self.find(id) {
            if entry.depth.get() == 0 {
                entry.guarded(|action| action.update(dt));
            }
        }
    }

    // ========================================================================
    // Scope Control
    // ========================================================================

    pub fn stop_all(&self, scope: &str) {
        for entry in self.entries_in_scope(scope) {
            entry.action.stop();
        }
        self.inner
            .pending
            .borrow_mut()
            .retain(|_, entry| !entry.in_scope(scope));
        tracing::debug!("Manager: stop_all '{}'", scope);
    }

    /// Pause every action in `scope` with `key`
    ///
    /// Actions started in `scope` afterwards start paused with the same key,
    /// until `resume_all(scope, key)`.
    pub fn pause_all(&self, scope: &str, key: &str) {
        self.inner
            .paused_scopes
            .borrow_mut()
            .insert((scope.to_string(), key.to_string()));
        for entry in self.entries_in_scope(scope) {
            entry.action.pause_forced(key);
        }
        tracing::debug!("Manager: pause_all '{}' (key='{}')", scope, key);
    }

    pub fn resume_all(&self, scope: &str, key: &str) {
        self.inner
            .paused_scopes
            .borrow_mut()
            .remove(&(scope.to_string(), key.to_string()));
        for entry in self.entries_in_scope(scope) {
            entry.action.resume(key, false);
        }
        tracing::debug!("Manager: resume_all '{}' (key='{}')", scope, key);
    }

    pub fn stop_when_finished_all(&self, scope: &str) {
        for entry in self.entries_in_scope(scope) {
            entry.action.stop_when_finished(true);
        }
    }

    /// [`stop_and_finish`](Self::stop_and_finish) every action in `scope`
    ///
    /// Keeps going after a failure and reports the first error.
    pub fn stop_and_finish_all(&self, scope: &str) -> Result<()> {
        let mut result = Ok(());
        for entry in self.entries_in_scope(scope) {
            if let Err(err) = self.stop_and_finish(entry.action.id()) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    pub fn has_action_with_scope(&self, scope: &str) -> bool {
        self.entries().iter().any(|entry| entry.in_scope(scope))
    }

    pub fn ids_in_scope(&self, scope: &str) -> Vec<ActionId> {
        self.entries_in_scope(scope)
            .iter()
            .map(|entry| entry.action.id())
            .collect()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn is_running(&self, id: ActionId) -> bool {
        self.with_action(id, false, Action::is_running)
    }

    pub fn is_paused(&self, id: ActionId) -> bool {
        self.with_action(id, false, Action::is_paused)
    }

    /// Unknown ids count as finished
    pub fn is_finished(&self, id: ActionId) -> bool {
        self.with_action(id, true, Action::is_finished)
    }

    pub fn is_stopping(&self, id: ActionId) -> bool {
        self.with_action(id, false, Action::is_stopping)
    }

    pub fn get_elapsed(&self, id: ActionId) -> Duration {
        self.with_action(id, Duration::ZERO, Action::elapsed)
    }

    pub fn get_duration(&self, id: ActionId) -> Duration {
        self.with_action(id, Duration::ZERO, Action::duration)
    }

    pub fn get_overflow(&self, id: ActionId) -> Duration {
        self.with_action(id, Duration::ZERO, Action::overflow)
    }

    pub fn get_speed_multiplier(&self, id: ActionId) -> f32 {
        self.with_action(id, 1.0, Action::speed_multiplier)
    }

    /// Elapsed fraction of the duration, zero for unknown or zero-length actions
    pub fn get_percent(&self, id: ActionId) -> f32 {
        self.with_action(id, 0.0, Action::progress)
    }

    pub fn contains(&self, id: ActionId) -> bool {
        self.find(id).is_some()
    }

    /// Ids of tracked actions, main table first
    pub fn ids(&self) -> Vec<ActionId> {
        self.entries().iter().map(|entry| entry.action.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.actions.borrow().len() + self.inner.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inspector snapshots of every tracked action
    pub fn inspect(&self) -> Vec<InspectSnapshot> {
        self.entries()
            .iter()
            .filter_map(|entry| entry.action.info().cloned())
            .map(|info| InspectSnapshot::capture(&info.borrow()))
            .collect()
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance every tracked action by `dt`
    pub fn update(&self, dt: Duration) {
        let inner = &self.inner;

        let merged: Vec<(ActionId, Rc<Entry>)> = inner.pending.borrow_mut().drain(..).collect();
        if !merged.is_empty() {
            let mut actions = inner.actions.borrow_mut();
            for (id, entry) in &merged {
                actions.insert(*id, entry.clone());
            }
        }

        let snapshot: Vec<(ActionId, Rc<Entry>)> = inner
            .actions
            .borrow()
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect();
        tracing::trace!(
            "Manager: update dt={:?} actions={} merged={}",
            dt,
            snapshot.len(),
            merged.len()
        );

        inner.updating.set(inner.updating.get() + 1);
        for (id, entry) in snapshot {
            if merged.iter().any(|(_, m)| Rc::ptr_eq(m, &entry)) {
                continue;
            }
            if entry.depth.get() > 0 || !self.is_tracked(id, &entry) {
                continue;
            }

            let state = entry.guarded(|action| action.update(dt));
            if state == State::Finished {
                let mut actions = inner.actions.borrow_mut();
                if actions.get(&id).is_some_and(|e| Rc::ptr_eq(e, &entry)) {
                    actions.shift_remove(&id);
                    tracing::debug!("Manager: {} finished", id);
                }
            }
        }
        inner.updating.set(inner.updating.get() - 1);
    }

    fn is_tracked(&self, id: ActionId, entry: &Rc<Entry>) -> bool {
        self.inner
            .actions
            .borrow()
            .get(&id)
            .is_some_and(|e| Rc::ptr_eq(e, entry))
    }

    // ========================================================================
    // Scope Stack
    // ========================================================================

    /// Open a scope for subsequently started actions
    pub fn push_scope(&self, name: &str) -> Result<()> {
        let result = self.inner.scopes.borrow_mut().push(name);
        match &result {
            Ok(()) => tracing::debug!("Manager: push_scope '{}'", name),
            Err(err) => tracing::error!("Manager: push_scope failed: {}", err),
        }
        result
    }

    /// Close the innermost scope
    pub fn pop_scope(&self) -> Result<String> {
        let result = self.inner.scopes.borrow_mut().pop();
        match &result {
            Ok(name) => tracing::debug!("Manager: pop_scope '{}'", name),
            Err(err) => tracing::error!("Manager: pop_scope failed: {}", err),
        }
        result
    }

    /// Close `name` and every scope opened after it
    pub fn close_scope(&self, name: &str) {
        self.inner.scopes.borrow_mut().close(name);
    }

    pub fn clear_scopes(&self) {
        self.inner.scopes.borrow_mut().clear();
    }

    pub fn current_scope(&self) -> String {
        self.inner.scopes.borrow().current().to_string()
    }

    pub fn scopes(&self) -> Vec<String> {
        self.inner.scopes.borrow().names().to_vec()
    }

    /// Drop every action, open scope and scope pause
    pub fn clear(&self) {
        let actions = std::mem::take(&mut *self.inner.actions.borrow_mut());
        let pending = std::mem::take(&mut *self.inner.pending.borrow_mut());
        self.inner.scopes.borrow_mut().clear();
        self.inner.paused_scopes.borrow_mut().clear();
        tracing::debug!(
            "Manager: cleared {} actions",
            actions.len() + pending.len()
        );
        // Actions drop here, after every borrow is released
        drop(actions);
        drop(pending);
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("actions", &self.inner.actions.borrow().len())
            .field("pending", &self.inner.pending.borrow().len())
            .field("scopes", &self.inner.scopes.borrow().names())
            .finish()
    }
}

// ============================================================================
// Manager Stack
// ============================================================================

/// Route the crate-level free functions to `manager` until it is popped
pub fn push(manager: Manager) {
    global::push_manager(manager);
}

/// Remove the top manager; the thread's default manager is never removed
pub fn pop() -> Option<Manager> {
    global::pop_manager()
}

/// The manager that currently receives free-function calls
pub fn current() -> Manager {
    global::manager()
}
