//! Named groups of actions
//!
//! Every started action is tagged with a list of scope names, taken from the
//! manager's stack of open scopes and the [`ScopePolicy`] passed to `start`.
//! Bulk operations (`pause_all`, `resume_all`, `stop_all`, ...) then address
//! all actions carrying a name.
//!
//! The free functions in this module act on the manager at the top of the
//! thread's manager stack (see [`crate::manager`]).
//!
//! ```rust
//! use cadence_seq::{delay, scope, start, Manager};
//! use std::time::Duration;
//!
//! cadence_seq::manager::push(Manager::new());
//!
//! scope::push("hud").unwrap();
//! let id = start(delay(Duration::from_secs(1)));
//! scope::pop().unwrap();
//!
//! scope::pause_all("hud");
//! assert!(cadence_seq::is_paused(id));
//!
//! cadence_seq::manager::pop();
//! ```

use crate::action::ActionId;
use crate::error::{Result, SeqError};
use crate::global;

/// How a `start` call combines its scope with the open scope stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Open scopes followed by the policy's own scope
    #[default]
    Stacked,
    /// Only the policy's own scope
    Independent,
}

/// Scope name plus [`Policy`] for a `start` call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopePolicy {
    pub scope: String,
    pub policy: Policy,
}

impl ScopePolicy {
    pub fn new(scope: impl Into<String>, policy: Policy) -> Self {
        Self {
            scope: scope.into(),
            policy,
        }
    }

    pub fn stacked(scope: impl Into<String>) -> Self {
        Self::new(scope, Policy::Stacked)
    }

    pub fn independent(scope: impl Into<String>) -> Self {
        Self::new(scope, Policy::Independent)
    }

    /// Scope list for an action started under this policy
    pub(crate) fn resolve(&self, stack: &ScopeStack) -> Vec<String> {
        let mut scopes = match self.policy {
            Policy::Stacked => stack.names().to_vec(),
            Policy::Independent => Vec::new(),
        };
        if !self.scope.is_empty() {
            scopes.push(self.scope.clone());
        }
        scopes
    }
}

impl From<&str> for ScopePolicy {
    fn from(scope: &str) -> Self {
        Self::stacked(scope)
    }
}

impl From<String> for ScopePolicy {
    fn from(scope: String) -> Self {
        Self::stacked(scope)
    }
}

/// Stack of open scope names
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    names: Vec<String>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `name`; empty names are ignored, names already open are rejected
    pub fn push(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        if self.contains(name) {
            return Err(SeqError::ScopeAlreadyOpen(name.to_string()));
        }
        self.names.push(name.to_string());
        Ok(())
    }

    pub fn pop(&mut self) -> Result<String> {
        self.names.pop().ok_or(SeqError::NoOpenScope)
    }

    /// Close `name` and every scope opened after it
    pub fn close(&mut self, name: &str) {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            self.names.truncate(pos);
        }
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    /// Innermost open scope, empty when none is open
    pub fn current(&self) -> &str {
        self.names.last().map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ============================================================================
// Free Functions
// ============================================================================

/// Open a scope on the current manager
pub fn push(name: &str) -> Result<()> {
    global::manager().push_scope(name)
}

pub fn pop() -> Result<String> {
    global::manager().pop_scope()
}

pub fn close(name: &str) {
    global::manager().close_scope(name)
}

pub fn clear() {
    global::manager().clear_scopes()
}

pub fn current() -> String {
    global::manager().current_scope()
}

pub fn stop_all(scope: &str) {
    global::manager().stop_all(scope)
}

pub fn stop_when_finished_all(scope: &str) {
    global::manager().stop_when_finished_all(scope)
}

pub fn stop_and_finish_all(scope: &str) -> Result<()> {
    global::manager().stop_and_finish_all(scope)
}

pub fn pause_all(scope: &str) {
    global::manager().pause_all(scope, "")
}

pub fn pause_all_with_key(scope: &str, key: &str) {
    global::manager().pause_all(scope, key)
}

pub fn resume_all(scope: &str) {
    global::manager().resume_all(scope, "")
}

pub fn resume_all_with_key(scope: &str, key: &str) {
    global::manager().resume_all(scope, key)
}

/// Whether any tracked action of the current manager carries `scope`
pub fn has_action_with_scope(scope: &str) -> bool {
    global::manager().has_action_with_scope(scope)
}

/// Ids of the current manager's actions carrying `scope`
pub fn actions(scope: &str) -> Vec<ActionId> {
    global::manager().ids_in_scope(scope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop() {
        let mut stack = ScopeStack::new();
        stack.push("a").unwrap();
        stack.push("b").unwrap();
        assert_eq!(stack.current(), "b");
        assert_eq!(stack.len(), 2);

        assert_eq!(stack.pop().unwrap(), "b");
        assert_eq!(stack.pop().unwrap(), "a");
        assert_eq!(stack.pop(), Err(SeqError::NoOpenScope));
        assert_eq!(stack.current(), "");
    }

    #[test]
    fn test_duplicate_push_is_rejected() {
        let mut stack = ScopeStack::new();
        stack.push("menu").unwrap();
        assert_eq!(
            stack.push("menu"),
            Err(SeqError::ScopeAlreadyOpen("menu".to_string()))
        );
        assert_eq!(stack.names(), ["menu".to_string()]);

        // Empty names never open a scope
        stack.push("").unwrap();
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_close_truncates() {
        let mut stack = ScopeStack::new();
        for name in ["a", "b", "c"] {
            stack.push(name).unwrap();
        }
        stack.close("missing");
        assert_eq!(stack.len(), 3);

        stack.close("b");
        assert_eq!(stack.names(), ["a".to_string()]);

        stack.clear();
        assert!(stack.is_empty());
    }

    #[test]
    fn test_policy_resolution() {
        let mut stack = ScopeStack::new();
        stack.push("scene").unwrap();
        stack.push("hud").unwrap();

        assert_eq!(ScopePolicy::from("").resolve(&stack), vec!["scene", "hud"]);
        assert_eq!(
            ScopePolicy::from("fade").resolve(&stack),
            vec!["scene", "hud", "fade"]
        );
        assert_eq!(
            ScopePolicy::independent("fade").resolve(&stack),
            vec!["fade"]
        );
        assert!(ScopePolicy::independent("").resolve(&stack).is_empty());
    }
}
