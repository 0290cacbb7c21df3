//! Thread-wide façade
//!
//! Each thread owns a stack of [`Manager`]s whose bottom is a default manager
//! created on first use. The free functions here (re-exported at the crate
//! root) address whichever manager is on top, so a host can redirect every
//! call site to a scene-local manager with [`crate::manager::push`].
//!
//! ```rust
//! use cadence_seq::{delay, Manager};
//! use std::time::Duration;
//!
//! let scene = Manager::new();
//! cadence_seq::manager::push(scene.clone());
//!
//! let id = cadence_seq::start(delay(Duration::from_millis(100)));
//! cadence_seq::update(Duration::from_millis(40));
//! assert!((cadence_seq::get_percent(id) - 0.4).abs() < 1e-6);
//! assert!(scene.contains(id));
//!
//! cadence_seq::manager::pop();
//! ```

use std::cell::RefCell;
use std::panic::Location;
use std::time::Duration;

use crate::action::{Action, ActionId};
use crate::error::Result;
use crate::inspector;
use crate::manager::Manager;
use crate::scope::ScopePolicy;

std::thread_local! {
    static MANAGERS: RefCell<Vec<Manager>> = RefCell::new(vec![Manager::new()]);
}

/// The manager on top of this thread's stack
pub(crate) fn manager() -> Manager {
    MANAGERS.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(top) = stack.last() {
            return top.clone();
        }
        let manager = Manager::new();
        stack.push(manager.clone());
        manager
    })
}

pub(crate) fn push_manager(manager: Manager) {
    MANAGERS.with(|stack| stack.borrow_mut().push(manager));
}

pub(crate) fn pop_manager() -> Option<Manager> {
    MANAGERS.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.len() > 1 {
            stack.pop()
        } else {
            None
        }
    })
}

// ============================================================================
// Free Functions
// ============================================================================

/// Start `action` on the current manager within the open scopes
#[track_caller]
pub fn start(action: Action) -> ActionId {
    let location = Location::caller();
    inspector::set_location(&action, location);
    manager().start(action, ScopePolicy::default())
}

/// Start `action` on the current manager with an explicit scope policy
#[track_caller]
pub fn start_in(action: Action, policy: impl Into<ScopePolicy>) -> ActionId {
    let location = Location::caller();
    inspector::set_location(&action, location);
    manager().start(action, policy)
}

pub fn stop(id: ActionId) {
    manager().stop(id)
}

pub fn pause(id: ActionId) {
    manager().pause(id)
}

pub fn resume(id: ActionId) {
    manager().resume(id)
}

pub fn stop_when_finished(id: ActionId) {
    manager().stop_when_finished(id)
}

/// See [`Manager::stop_and_finish`]
pub fn stop_and_finish(id: ActionId) -> Result<()> {
    manager().stop_and_finish(id)
}

/// Advance the current manager by `dt`
pub fn update(dt: Duration) {
    manager().update(dt)
}

pub fn update_action(id: ActionId, dt: Duration) {
    manager().update_action(id, dt)
}

pub fn is_running(id: ActionId) -> bool {
    manager().is_running(id)
}

pub fn is_paused(id: ActionId) -> bool {
    manager().is_paused(id)
}

pub fn is_finished(id: ActionId) -> bool {
    manager().is_finished(id)
}

pub fn is_stopping(id: ActionId) -> bool {
    manager().is_stopping(id)
}

pub fn get_elapsed(id: ActionId) -> Duration {
    manager().get_elapsed(id)
}

pub fn get_duration(id: ActionId) -> Duration {
    manager().get_duration(id)
}

pub fn get_overflow(id: ActionId) -> Duration {
    manager().get_overflow(id)
}

pub fn get_speed_multiplier(id: ActionId) -> f32 {
    manager().get_speed_multiplier(id)
}

pub fn set_speed_multiplier(id: ActionId, multiplier: f32) {
    manager().set_speed_multiplier(id, multiplier)
}

pub fn set_elapsed(id: ActionId, elapsed: Duration) {
    manager().set_elapsed(id, elapsed)
}

/// Elapsed fraction of the duration; zero for zero-length or unknown actions
pub fn get_percent(id: ActionId) -> f32 {
    manager().get_percent(id)
}

pub fn has_action_with_scope(scope: &str) -> bool {
    manager().has_action_with_scope(scope)
}

/// Tear down this thread's default manager and drop any pushed managers
pub fn shutdown() {
    let dropped =
        MANAGERS.with(|stack| std::mem::replace(&mut *stack.borrow_mut(), vec![Manager::new()]));
    for manager in &dropped {
        manager.clear();
    }
    tracing::debug!("cadence_seq: shutdown ({} managers released)", dropped.len());
}
