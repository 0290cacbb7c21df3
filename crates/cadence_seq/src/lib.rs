//! Cadence Action Scheduler
//!
//! Frame-driven tweens and composite actions: describe time-bounded changes
//! to values, compose them, then push time through them with `update(dt)`.
//!
//! # Features
//!
//! - **Leaf Mutators**: `from_to`, `to` and `by` write eased values into a target
//! - **Combinators**: `sequence`, `together`, `delay` and `repeat`, with precise
//!   variants that carry sub-tick overflow across boundaries
//! - **Liveness Sentinels**: actions stop touching targets that were dropped
//! - **Manager**: id-addressed start/stop/pause/resume, keyed pauses, scopes
//! - **Reentrancy Safe**: callbacks may start, stop and query actions mid-update
//! - **Thread Façade**: free functions over a per-thread manager stack
//! - **Inspector**: optional per-action diagnostic records (feature `inspector`)
//!
//! # Example
//!
//! ```rust
//! use cadence_seq::{delay, from_to, sequence, Easing, Manager};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let x = Rc::new(RefCell::new(0.0_f32));
//! let manager = Manager::new();
//!
//! let id = manager.start(
//!     sequence([
//!         delay(Duration::from_millis(100)),
//!         from_to(&x, 0.0, 50.0, Duration::from_millis(200), Easing::Linear),
//!     ]),
//!     "",
//! );
//!
//! let frame = Duration::from_millis(50);
//! while !manager.is_finished(id) {
//!     manager.update(frame);
//! }
//! assert_eq!(*x.borrow(), 50.0);
//! ```

pub mod action;
pub mod combinators;
pub mod ease;
pub mod error;
pub mod event;
mod global;
pub mod inspector;
pub mod manager;
pub mod math;
pub mod mutators;
pub mod scope;
pub mod sentinel;

pub use action::{Action, ActionId, Creator, State, Updater, MAX_SPEED_MULTIPLIER};
pub use combinators::{delay, repeat, repeat_precise, sequence, sequence_precise, together};
pub use ease::{Ease, Easing};
pub use error::{Result, SeqError};
pub use event::Event;
pub use global::{
    get_duration, get_elapsed, get_overflow, get_percent, get_speed_multiplier,
    has_action_with_scope, is_finished, is_paused, is_running, is_stopping, pause, resume,
    set_elapsed, set_speed_multiplier, shutdown, start, start_in, stop, stop_and_finish,
    stop_when_finished, update, update_action,
};
pub use inspector::{InspectInfo, InspectSnapshot};
pub use manager::Manager;
pub use math::{lerp, range_map, Interpolate};
pub use mutators::{by, by_with, from_to, from_to_with, to, to_with};
pub use scope::{Policy, ScopePolicy, ScopeStack};
pub use sentinel::{Lifeline, Sentinel};
