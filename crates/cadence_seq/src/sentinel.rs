//! Liveness tokens
//!
//! A [`Sentinel`] answers one question: is the thing this action mutates still
//! alive? It never owns the target, so holding one can't keep a dropped object
//! around, and querying it never panics.
//!
//! ```rust
//! use cadence_seq::Sentinel;
//! use std::rc::Rc;
//!
//! let target = Rc::new(5.0_f32);
//! let sentinel = Sentinel::watch(&target);
//! assert!(!sentinel.is_expired());
//!
//! drop(target);
//! assert!(sentinel.is_expired());
//! ```

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

#[derive(Clone, Default)]
enum Probe {
    #[default]
    Eternal,
    Weak(Weak<dyn Any>),
    Fn(Rc<dyn Fn() -> bool>),
}

/// A cheap "is my target still alive" check
#[derive(Clone, Default)]
pub struct Sentinel {
    probe: Probe,
}

impl Sentinel {
    /// A sentinel that never expires (structural and delay actions)
    pub fn eternal() -> Self {
        Self {
            probe: Probe::Eternal,
        }
    }

    /// Expires when the last strong reference to `target` is dropped
    pub fn watch<T: 'static>(target: &Rc<T>) -> Self {
        let weak: Weak<T> = Rc::downgrade(target);
        let weak: Weak<dyn Any> = weak;
        Self {
            probe: Probe::Weak(weak),
        }
    }

    /// Expires when `is_expired` returns true
    pub fn from_fn<F>(is_expired: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        Self {
            probe: Probe::Fn(Rc::new(is_expired)),
        }
    }

    pub fn is_expired(&self) -> bool {
        match &self.probe {
            Probe::Eternal => false,
            Probe::Weak(weak) => weak.strong_count() == 0,
            Probe::Fn(f) => f(),
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.is_expired()
    }
}

impl fmt::Debug for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.probe {
            Probe::Eternal => "eternal",
            Probe::Weak(_) => "weak",
            Probe::Fn(_) => "fn",
        };
        f.debug_struct("Sentinel")
            .field("kind", &kind)
            .field("expired", &self.is_expired())
            .finish()
    }
}

/// Owned liveness token for targets that are not behind an `Rc`
///
/// Hand out sentinels with [`Lifeline::sentinel`]; they all expire when the
/// lifeline is dropped or explicitly expired.
#[derive(Debug)]
pub struct Lifeline {
    alive: Rc<Cell<bool>>,
}

impl Lifeline {
    pub fn new() -> Self {
        Self {
            alive: Rc::new(Cell::new(true)),
        }
    }

    pub fn sentinel(&self) -> Sentinel {
        let alive = Rc::downgrade(&self.alive);
        Sentinel::from_fn(move || alive.upgrade().map_or(true, |a| !a.get()))
    }

    /// Expire every sentinel handed out so far, without dropping the lifeline
    pub fn expire(&self) {
        self.alive.set(false);
    }

    pub fn is_expired(&self) -> bool {
        !self.alive.get()
    }
}

impl Default for Lifeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Lifeline {
    fn drop(&mut self) {
        self.alive.set(false);
    }
}
