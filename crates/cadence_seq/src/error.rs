//! Error types for cadence_seq

use crate::action::ActionId;
use thiserror::Error;

/// Errors reported by the scheduler
///
/// Only caller bugs surface as errors. Operations on stale or unknown ids are
/// silent no-ops, since ids routinely outlive the actions they name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeqError {
    /// `stop_and_finish` was invoked while the action's own update was on the stack
    #[error("cannot call stop_and_finish on action {0} from inside its own callbacks")]
    ReentrantStopAndFinish(ActionId),

    /// A scope name was pushed while already open
    #[error("scope '{0}' is already open")]
    ScopeAlreadyOpen(String),

    /// `pop_scope` with nothing on the scope stack
    #[error("no scope is open")]
    NoOpenScope,
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SeqError>;
