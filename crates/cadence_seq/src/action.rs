//! The schedulable unit
//!
//! An [`Action`] pairs a factory (`creator`) with the timing state and state
//! machine shared by every kind of action. On start the factory produces an
//! updater closure which then receives every tick:
//!
//! ```text
//! Finished --start--> Running --pause--> Paused
//!                        ^                  |
//!                        +-----resume-------+
//! Running --updater reports done / stop--> Finished
//! ```
//!
//! Leaves ([`crate::mutators`]) and combinators ([`crate::combinators`]) are
//! both plain actions; only their updater differs.
//!
//! All state lives in cells so that lifecycle calls take `&self`. Callbacks
//! fired from inside an update may query or stop the very action that is
//! running them.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::event::Event;
use crate::inspector::{self, InfoRef};
use crate::sentinel::Sentinel;

/// Per-run update closure: receives the scaled tick and the owning action
pub type Updater = Box<dyn FnMut(Duration, &Action) -> State>;

/// Factory invoked once per start to produce a fresh [`Updater`]
pub type Creator = Rc<dyn Fn() -> Updater>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide action identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct ActionId(u64);

impl ActionId {
    /// Identifier of empty actions
    pub const INVALID: ActionId = ActionId(0);

    fn next() -> Self {
        ActionId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Running,
    Paused,
    #[default]
    Finished,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::Running => "running",
            State::Paused => "paused",
            State::Finished => "finished",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper bound for [`Action::speed_multiplier`]
pub const MAX_SPEED_MULTIPLIER: f32 = 100.0;

/// A time-bounded unit of work driven by `update(dt)`
pub struct Action {
    id: ActionId,
    duration: Duration,
    creator: Option<Creator>,
    updater: RefCell<Option<Updater>>,
    state: Cell<State>,
    elapsed: Cell<Duration>,
    elapsed_unclamped: Cell<Duration>,
    pause_key: RefCell<String>,
    stop_when_finished: Cell<bool>,
    stop_and_finished: Cell<bool>,
    speed_multiplier: Cell<f32>,
    sentinel: Sentinel,
    info: Option<InfoRef>,

    /// Fired on start, before the first zero-length update
    pub on_begin: Rc<Event>,
    /// Fired by the updater whenever the displayed value may have changed
    pub on_step: Rc<Event>,
    /// Fired after every update that leaves the action running
    pub on_update: Rc<Event>,
    /// Fired on natural completion while the sentinel is alive
    pub on_end: Rc<Event>,
}

impl Action {
    /// Build an action from a factory
    ///
    /// The factory runs on every start and must return an updater that
    /// reports `Finished` once it is done. A zero-length update is issued
    /// right after creation.
    pub fn new<F>(creator: F, duration: Duration, sentinel: Sentinel) -> Self
    where
        F: Fn() -> Updater + 'static,
    {
        let id = ActionId::next();
        Self {
            id,
            duration,
            creator: Some(Rc::new(creator)),
            updater: RefCell::new(None),
            state: Cell::new(State::Finished),
            elapsed: Cell::new(Duration::ZERO),
            elapsed_unclamped: Cell::new(Duration::ZERO),
            pause_key: RefCell::new(String::new()),
            stop_when_finished: Cell::new(false),
            stop_and_finished: Cell::new(false),
            speed_multiplier: Cell::new(1.0),
            sentinel,
            info: inspector::record(id, duration),
            on_begin: Rc::new(Event::new()),
            on_step: Rc::new(Event::new()),
            on_update: Rc::new(Event::new()),
            on_end: Rc::new(Event::new()),
        }
    }

    /// Rebind the liveness token
    pub fn with_sentinel(mut self, sentinel: Sentinel) -> Self {
        self.sentinel = sentinel;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> ActionId {
        self.id
    }

    /// False for the empty action returned by failed constructions
    pub fn is_valid(&self) -> bool {
        self.id.is_valid() && self.creator.is_some()
    }

    pub fn state(&self) -> State {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state.get() == State::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state.get() == State::Paused
    }

    pub fn is_finished(&self) -> bool {
        self.state.get() == State::Finished
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    /// Time received beyond the duration, zero for zero-length actions
    pub fn overflow(&self) -> Duration {
        let unclamped = self.elapsed_unclamped.get();
        if !self.duration.is_zero() && unclamped >= self.duration {
            unclamped - self.duration
        } else {
            Duration::ZERO
        }
    }

    /// `elapsed / duration`, or zero for zero-length actions
    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            0.0
        } else {
            (self.elapsed.get().as_secs_f64() / self.duration.as_secs_f64()) as f32
        }
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.speed_multiplier.get()
    }

    /// Whether a graceful wind-down has been requested
    pub fn is_stopping(&self) -> bool {
        self.stop_when_finished.get()
    }

    /// Whether the manager is forcing this action to completion
    pub fn is_finishing(&self) -> bool {
        self.stop_and_finished.get()
    }

    pub fn sentinel(&self) -> &Sentinel {
        &self.sentinel
    }

    pub fn info(&self) -> Option<&InfoRef> {
        self.info.as_ref()
    }

    // ========================================================================
    // Elapsed Accounting
    // ========================================================================

    /// Advance both elapsed counters by `dt`; `elapsed` saturates at the duration
    pub fn update_elapsed(&self, dt: Duration) {
        let unclamped = self.elapsed_unclamped.get().saturating_add(dt);
        self.elapsed_unclamped.set(unclamped);
        self.elapsed.set(unclamped.min(self.duration));
    }

    /// Seek both elapsed counters to `value`
    pub fn set_elapsed(&self, value: Duration) {
        self.elapsed_unclamped.set(value);
        self.elapsed.set(value.min(self.duration));
    }

    pub fn set_speed_multiplier(&self, multiplier: f32) {
        let multiplier = if multiplier.is_nan() { 1.0 } else { multiplier };
        self.speed_multiplier
            .set(multiplier.clamp(0.0, MAX_SPEED_MULTIPLIER));
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub(crate) fn start(&self) {
        let Some(creator) = self.creator.clone() else {
            return;
        };

        self.state.set(State::Running);
        self.elapsed.set(Duration::ZERO);
        self.elapsed_unclamped.set(Duration::ZERO);
        self.pause_key.borrow_mut().clear();

        self.on_begin.emit();

        let mut updater = creator();
        let state = updater(Duration::ZERO, self);
        *self.updater.borrow_mut() = Some(updater);
        self.settle(state);

        if self.is_finished() && self.sentinel.is_alive() {
            self.on_end.emit();
        }
        inspector::refresh(self);
    }

    pub(crate) fn update(&self, dt: Duration) -> State {
        if self.state.get() != State::Running {
            return self.state.get();
        }

        let dt = scale(dt, self.speed_multiplier.get());

        // The slot is empty while this action's updater is on the stack
        let Some(mut updater) = self.updater.borrow_mut().take() else {
            return self.state.get();
        };
        let state = updater(dt, self);
        {
            let mut slot = self.updater.borrow_mut();
            if slot.is_none() {
                *slot = Some(updater);
            }
        }
        self.settle(state);

        match self.state.get() {
            State::Finished => {
                if self.sentinel.is_alive() {
                    self.on_end.emit();
                }
            }
            State::Running => self.on_update.emit(),
            State::Paused => {}
        }
        inspector::refresh(self);
        self.state.get()
    }

    // A stop or pause issued from a callback during the updater wins over
    // the state the updater reports.
    fn settle(&self, reported: State) {
        if self.state.get() == State::Running {
            self.state.set(reported);
        }
    }

    pub(crate) fn pause(&self, key: &str) {
        if self.state.get() == State::Running {
            self.pause_forced(key);
        }
    }

    /// Pause from any live state, replacing the pause key
    pub(crate) fn pause_forced(&self, key: &str) {
        if self.state.get() == State::Finished {
            return;
        }
        self.state.set(State::Paused);
        *self.pause_key.borrow_mut() = key.to_string();
        inspector::refresh(self);
    }

    pub(crate) fn resume(&self, key: &str, force: bool) {
        if self.state.get() != State::Paused {
            return;
        }
        if !force && *self.pause_key.borrow() != key {
            return;
        }
        self.pause_key.borrow_mut().clear();
        self.state.set(State::Running);
        inspector::refresh(self);
    }

    /// Interrupt: finish immediately without firing `on_end`
    pub(crate) fn stop(&self) {
        self.state.set(State::Finished);
        inspector::refresh(self);
    }

    pub(crate) fn stop_when_finished(&self, value: bool) {
        self.stop_when_finished.set(value);
    }

    pub(crate) fn stop_and_finished(&self, value: bool) {
        self.stop_and_finished.set(value);
    }
}

/// Scale `dt` by `speed`, truncated to thousandths
fn scale(dt: Duration, speed: f32) -> Duration {
    if speed == 1.0 {
        return dt;
    }
    let milli = (speed * 1000.0).max(0.0) as u128;
    let nanos = dt.as_nanos() * milli / 1000;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

impl Default for Action {
    /// The empty, invalid action
    fn default() -> Self {
        Self {
            id: ActionId::INVALID,
            duration: Duration::ZERO,
            creator: None,
            updater: RefCell::new(None),
            state: Cell::new(State::Finished),
            elapsed: Cell::new(Duration::ZERO),
            elapsed_unclamped: Cell::new(Duration::ZERO),
            pause_key: RefCell::new(String::new()),
            stop_when_finished: Cell::new(false),
            stop_and_finished: Cell::new(false),
            speed_multiplier: Cell::new(1.0),
            sentinel: Sentinel::eternal(),
            info: None,
            on_begin: Rc::new(Event::new()),
            on_step: Rc::new(Event::new()),
            on_update: Rc::new(Event::new()),
            on_end: Rc::new(Event::new()),
        }
    }
}

impl Clone for Action {
    /// An unstarted copy sharing id, factory, sentinel, subscribers and record
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            duration: self.duration,
            creator: self.creator.clone(),
            updater: RefCell::new(None),
            state: Cell::new(State::Finished),
            elapsed: Cell::new(Duration::ZERO),
            elapsed_unclamped: Cell::new(Duration::ZERO),
            pause_key: RefCell::new(String::new()),
            stop_when_finished: Cell::new(false),
            stop_and_finished: Cell::new(false),
            speed_multiplier: Cell::new(self.speed_multiplier.get()),
            sentinel: self.sentinel.clone(),
            info: self.info.clone(),
            on_begin: self.on_begin.clone(),
            on_step: self.on_step.clone(),
            on_update: self.on_update.clone(),
            on_end: self.on_end.clone(),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("elapsed", &self.elapsed.get())
            .field("duration", &self.duration)
            .field("speed_multiplier", &self.speed_multiplier.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Finishes when elapsed reaches the duration, counting updater calls
    fn timer(duration: Duration, calls: Rc<Cell<u32>>) -> Action {
        Action::new(
            move || {
                let calls = calls.clone();
                Box::new(move |dt: Duration, this: &Action| {
                    calls.set(calls.get() + 1);
                    this.update_elapsed(dt);
                    if this.elapsed() == this.duration() {
                        State::Finished
                    } else {
                        State::Running
                    }
                })
            },
            duration,
            Sentinel::eternal(),
        )
    }

    #[test]
    fn test_ids_are_unique() {
        let done = || -> Updater { Box::new(|_: Duration, _: &Action| State::Finished) };
        let a = Action::new(done, Duration::ZERO, Sentinel::eternal());
        let b = Action::new(done, Duration::ZERO, Sentinel::eternal());
        assert!(a.id().is_valid());
        assert_ne!(a.id(), b.id());
        assert!(!Action::default().is_valid());
        assert_eq!(Action::default().id(), ActionId::INVALID);
    }

    #[test]
    fn test_start_runs_zero_length_update() {
        let calls = Rc::new(Cell::new(0));
        let action = timer(Duration::from_millis(100), calls.clone());
        assert!(action.is_finished());

        action.start();
        assert!(action.is_running());
        assert_eq!(calls.get(), 1);
        assert_eq!(action.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_event_order() {
        let calls = Rc::new(Cell::new(0));
        let action = timer(Duration::from_millis(100), calls);
        let log = Rc::new(RefCell::new(Vec::new()));

        for (event, name) in [
            (&action.on_begin, "begin"),
            (&action.on_update, "update"),
            (&action.on_end, "end"),
        ] {
            let log = log.clone();
            event.connect(move || log.borrow_mut().push(name));
        }

        action.start();
        action.update(Duration::from_millis(60));
        action.update(Duration::from_millis(60));
        action.update(Duration::from_millis(60));

        assert_eq!(*log.borrow(), vec!["begin", "update", "end"]);
    }

    #[test]
    fn test_zero_duration_finishes_on_start() {
        let ended = Rc::new(Cell::new(false));
        let action = timer(Duration::ZERO, Rc::new(Cell::new(0)));
        let e = ended.clone();
        action.on_end.connect(move || e.set(true));

        action.start();
        assert!(action.is_finished());
        assert!(ended.get());
    }

    #[test]
    fn test_elapsed_accounting() {
        let action = timer(Duration::from_millis(1000), Rc::new(Cell::new(0)));
        action.start();

        assert_eq!(action.update(Duration::from_millis(400)), State::Running);
        assert_eq!(action.elapsed(), Duration::from_millis(400));

        assert_eq!(action.update(Duration::from_millis(700)), State::Finished);
        assert_eq!(action.elapsed(), Duration::from_millis(1000));
        assert_eq!(action.overflow(), Duration::from_millis(100));

        action.set_elapsed(Duration::from_millis(250));
        assert_eq!(action.elapsed(), Duration::from_millis(250));
        assert_eq!(action.overflow(), Duration::ZERO);
    }

    #[test]
    fn test_pause_and_resume_keys() {
        let calls = Rc::new(Cell::new(0));
        let action = timer(Duration::from_millis(100), calls.clone());
        action.start();

        action.pause("menu");
        assert!(action.is_paused());
        assert_eq!(action.update(Duration::from_millis(50)), State::Paused);
        assert_eq!(calls.get(), 1);

        action.resume("other", false);
        assert!(action.is_paused());
        action.resume("menu", false);
        assert!(action.is_running());

        action.pause("a");
        action.resume("", true);
        assert!(action.is_running());

        // Unforced pause only applies to running actions
        action.stop();
        action.pause("a");
        assert!(action.is_finished());
        action.pause_forced("a");
        assert!(action.is_finished());
    }

    #[test]
    fn test_stop_does_not_fire_end() {
        let ended = Rc::new(Cell::new(false));
        let action = timer(Duration::from_millis(100), Rc::new(Cell::new(0)));
        let e = ended.clone();
        action.on_end.connect(move || e.set(true));

        action.start();
        action.stop();
        assert!(action.is_finished());
        assert_eq!(action.update(Duration::from_secs(1)), State::Finished);
        assert!(!ended.get());
    }

    #[test]
    fn test_expired_sentinel_suppresses_end() {
        let target = Rc::new(());
        let ended = Rc::new(Cell::new(false));
        let action = timer(Duration::from_millis(10), Rc::new(Cell::new(0)))
            .with_sentinel(Sentinel::watch(&target));
        let e = ended.clone();
        action.on_end.connect(move || e.set(true));

        action.start();
        drop(target);
        action.update(Duration::from_millis(10));
        assert!(action.is_finished());
        assert!(!ended.get());
    }

    #[test]
    fn test_speed_multiplier() {
        let action = timer(Duration::from_secs(10), Rc::new(Cell::new(0)));
        action.set_speed_multiplier(2.5);
        action.start();
        action.update(Duration::from_millis(100));
        assert_eq!(action.elapsed(), Duration::from_millis(250));

        action.set_speed_multiplier(500.0);
        assert_eq!(action.speed_multiplier(), MAX_SPEED_MULTIPLIER);
        action.set_speed_multiplier(-1.0);
        assert_eq!(action.speed_multiplier(), 0.0);
        action.update(Duration::from_millis(100));
        assert_eq!(action.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn test_scale_truncates_to_thousandths() {
        assert_eq!(scale(Duration::from_secs(1), 0.0015), Duration::from_millis(1));
        assert_eq!(scale(Duration::from_secs(1), 1.0), Duration::from_secs(1));
    }

    #[test]
    fn test_clone_is_unstarted() {
        let calls = Rc::new(Cell::new(0));
        let action = timer(Duration::from_millis(100), calls);
        action.start();
        action.update(Duration::from_millis(30));

        let copy = action.clone();
        assert_eq!(copy.id(), action.id());
        assert!(copy.is_finished());
        assert_eq!(copy.elapsed(), Duration::ZERO);

        copy.start();
        copy.update(Duration::from_millis(10));
        assert_eq!(copy.elapsed(), Duration::from_millis(10));
        assert_eq!(action.elapsed(), Duration::from_millis(30));
    }

    #[test]
    fn test_stop_from_callback_wins() {
        let action = Rc::new(timer(Duration::from_secs(1), Rc::new(Cell::new(0))));
        let weak = Rc::downgrade(&action);
        action.on_update.connect(move || {
            if let Some(a) = weak.upgrade() {
                a.stop();
            }
        });

        action.start();
        action.update(Duration::from_millis(10));
        assert!(action.is_finished());
    }
}
