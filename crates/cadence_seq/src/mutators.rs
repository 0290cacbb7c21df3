//! Leaf actions that write an interpolated value into a target
//!
//! Three flavours share one shape:
//! - [`from_to`] writes `begin` on start, then eases towards `end`
//! - [`to`] snapshots the target's value on start as `begin`
//! - [`by`] adds an eased delta incrementally, so writes made to the target by
//!   someone else between ticks are preserved
//!
//! Targets are either an `Rc<RefCell<T>>` (the liveness token is derived
//! from the `Rc`) or a getter/setter pair with an explicit [`Sentinel`]
//! (`*_with` variants). A target that is already gone at construction yields
//! an invalid action; one that disappears later makes the action finish
//! without writing.
//!
//! # Example
//!
//! ```rust
//! use cadence_seq::{from_to, Easing, Manager};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let opacity = Rc::new(RefCell::new(0.0_f32));
//! let manager = Manager::new();
//! manager.start(
//!     from_to(&opacity, 0.0, 1.0, Duration::from_millis(200), Easing::QuadOut),
//!     "",
//! );
//! manager.update(Duration::from_millis(200));
//! assert_eq!(*opacity.borrow(), 1.0);
//! ```

use std::cell::RefCell;
use std::fmt::Debug;
use std::ops::{Add, Sub};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::action::{Action, State, Updater};
use crate::ease::Ease;
use crate::inspector;
use crate::math::{self, Interpolate};
use crate::sentinel::Sentinel;

/// Read/write access to a mutated value
struct Access<T> {
    get: Rc<dyn Fn() -> Option<T>>,
    set: Rc<dyn Fn(T)>,
}

impl<T> Clone for Access<T> {
    fn clone(&self) -> Self {
        Self {
            get: self.get.clone(),
            set: self.set.clone(),
        }
    }
}

impl<T: Clone + 'static> Access<T> {
    fn cell(target: &Rc<RefCell<T>>) -> Self {
        let read: Weak<RefCell<T>> = Rc::downgrade(target);
        let write = read.clone();
        Self {
            get: Rc::new(move || {
                let target = read.upgrade()?;
                let value = target.try_borrow().ok().map(|t| t.clone());
                value
            }),
            set: Rc::new(move |value| {
                if let Some(target) = write.upgrade() {
                    if let Ok(mut slot) = target.try_borrow_mut() {
                        *slot = value;
                    }
                }
            }),
        }
    }

    fn with<G, S>(getter: G, setter: S) -> Self
    where
        G: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Self {
            get: Rc::new(move || Some(getter())),
            set: Rc::new(setter),
        }
    }
}

/// Linear progress in `[0, 1]`; zero-length leaves jump to the end
fn progress(this: &Action) -> f32 {
    if this.duration().is_zero() {
        1.0
    } else {
        math::clamp(this.progress(), 0.0, 1.0)
    }
}

fn finished_when_elapsed(this: &Action) -> State {
    if this.elapsed() == this.duration() {
        State::Finished
    } else {
        State::Running
    }
}

fn leaf<F>(
    kind: &'static str,
    type_name: &'static str,
    creator: F,
    duration: Duration,
    sentinel: Sentinel,
) -> Action
where
    F: Fn() -> Updater + 'static,
{
    let action = Action::new(creator, duration, sentinel);
    inspector::describe(&action, kind, type_name);
    action
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

// ============================================================================
// from_to
// ============================================================================

/// Ease `target` from `begin` to `end` over `duration`
pub fn from_to<T>(
    target: &Rc<RefCell<T>>,
    begin: T,
    end: T,
    duration: Duration,
    ease: impl Into<Ease>,
) -> Action
where
    T: Interpolate + Debug,
{
    build_from_to(
        Sentinel::watch(target),
        Access::cell(target),
        begin,
        end,
        duration,
        ease.into(),
    )
}

/// [`from_to`] through a setter, guarded by `sentinel`
pub fn from_to_with<T, S>(
    sentinel: Sentinel,
    setter: S,
    begin: T,
    end: T,
    duration: Duration,
    ease: impl Into<Ease>,
) -> Action
where
    T: Interpolate + Debug,
    S: Fn(T) + 'static,
{
    // from_to never reads the target
    let access = Access {
        get: Rc::new(|| -> Option<T> { None }),
        set: Rc::new(setter),
    };
    build_from_to(sentinel, access, begin, end, duration, ease.into())
}

fn build_from_to<T>(
    sentinel: Sentinel,
    access: Access<T>,
    begin: T,
    end: T,
    duration: Duration,
    ease: Ease,
) -> Action
where
    T: Interpolate + Debug,
{
    if sentinel.is_expired() {
        return Action::default();
    }

    let (b, e) = (begin.clone(), end.clone());
    let creator = move || -> Updater {
        let set = access.set.clone();
        let begin = begin.clone();
        let end = end.clone();
        let ease = ease.clone();
        let mut primed = false;

        Box::new(move |dt: Duration, this: &Action| {
            if this.sentinel().is_expired() {
                return State::Finished;
            }
            if !primed {
                primed = true;
                set(begin.clone());
            }

            this.update_elapsed(dt);
            let next = math::lerp(&begin, &end, progress(this), &ease);
            inspector::set_current(this, &next);
            set(next);
            this.on_step.emit();

            finished_when_elapsed(this)
        })
    };

    let action = leaf("from_to", short_type_name::<T>(), creator, duration, sentinel);
    inspector::set_range(&action, Some(&b), Some(&e));
    action
}

// ============================================================================
// to
// ============================================================================

/// Ease `target` from its value at start time to `end`
pub fn to<T>(target: &Rc<RefCell<T>>, end: T, duration: Duration, ease: impl Into<Ease>) -> Action
where
    T: Interpolate + Debug,
{
    build_to(
        Sentinel::watch(target),
        Access::cell(target),
        end,
        duration,
        ease.into(),
    )
}

/// [`to`] through a getter/setter pair, guarded by `sentinel`
pub fn to_with<T, G, S>(
    sentinel: Sentinel,
    getter: G,
    setter: S,
    end: T,
    duration: Duration,
    ease: impl Into<Ease>,
) -> Action
where
    T: Interpolate + Debug,
    G: Fn() -> T + 'static,
    S: Fn(T) + 'static,
{
    build_to(
        sentinel,
        Access::with(getter, setter),
        end,
        duration,
        ease.into(),
    )
}

fn build_to<T>(sentinel: Sentinel, access: Access<T>, end: T, duration: Duration, ease: Ease) -> Action
where
    T: Interpolate + Debug,
{
    if sentinel.is_expired() {
        return Action::default();
    }

    let e = end.clone();
    let creator = move || -> Updater {
        let access = access.clone();
        let end = end.clone();
        let ease = ease.clone();
        let mut begin: Option<T> = None;

        Box::new(move |dt: Duration, this: &Action| {
            if this.sentinel().is_expired() {
                return State::Finished;
            }
            if begin.is_none() {
                // Target busy: wait for a tick where it can be read
                let Some(current) = (access.get)() else {
                    return State::Running;
                };
                inspector::set_range(this, Some(&current), None);
                begin = Some(current);
            }
            let Some(start) = begin.as_ref() else {
                return State::Finished;
            };

            this.update_elapsed(dt);
            let next = math::lerp(start, &end, progress(this), &ease);
            inspector::set_current(this, &next);
            (access.set)(next);
            this.on_step.emit();

            finished_when_elapsed(this)
        })
    };

    let action = leaf("to", short_type_name::<T>(), creator, duration, sentinel);
    inspector::set_range(&action, None, Some(&e));
    action
}

// ============================================================================
// by
// ============================================================================

/// Add `amount` to `target` over `duration`, one eased delta per tick
pub fn by<T>(target: &Rc<RefCell<T>>, amount: T, duration: Duration, ease: impl Into<Ease>) -> Action
where
    T: Interpolate + Debug + Default + Add<Output = T> + Sub<Output = T>,
{
    build_by(
        Sentinel::watch(target),
        Access::cell(target),
        amount,
        duration,
        ease.into(),
    )
}

/// [`by`] through a getter/setter pair, guarded by `sentinel`
pub fn by_with<T, G, S>(
    sentinel: Sentinel,
    getter: G,
    setter: S,
    amount: T,
    duration: Duration,
    ease: impl Into<Ease>,
) -> Action
where
    T: Interpolate + Debug + Default + Add<Output = T> + Sub<Output = T>,
    G: Fn() -> T + 'static,
    S: Fn(T) + 'static,
{
    build_by(
        sentinel,
        Access::with(getter, setter),
        amount,
        duration,
        ease.into(),
    )
}

fn build_by<T>(sentinel: Sentinel, access: Access<T>, amount: T, duration: Duration, ease: Ease) -> Action
where
    T: Interpolate + Debug + Default + Add<Output = T> + Sub<Output = T>,
{
    if sentinel.is_expired() {
        return Action::default();
    }

    let a = amount.clone();
    let creator = move || -> Updater {
        let access = access.clone();
        let amount = amount.clone();
        let ease = ease.clone();
        let mut applied = T::default();

        Box::new(move |dt: Duration, this: &Action| {
            if this.sentinel().is_expired() {
                return State::Finished;
            }

            let Some(current) = (access.get)() else {
                return State::Running;
            };
            this.update_elapsed(dt);
            let next = math::lerp(&T::default(), &amount, progress(this), &ease);
            let delta = next.clone() - applied.clone();
            let value = current + delta;
            inspector::set_current(this, &value);
            (access.set)(value);
            applied = next;
            this.on_step.emit();

            finished_when_elapsed(this)
        })
    };

    let action = leaf("by", short_type_name::<T>(), creator, duration, sentinel);
    inspector::set_range(&action, Some(&T::default()), Some(&a));
    action
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ease::Easing;
    use std::cell::Cell;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_from_to_reaches_end() {
        for (duration, ticks) in [(0, 1), (100, 1), (100, 3), (1000, 7), (250, 10)] {
            let target = Rc::new(RefCell::new(-5.0_f32));
            let action = from_to(&target, 2.0, 12.0, ms(duration), Easing::CubicInOut);
            action.start();
            if duration == 0 {
                assert!(action.is_finished());
            }

            let step = ms(duration) / ticks;
            let mut spent = Duration::ZERO;
            for _ in 0..ticks {
                action.update(step);
                spent += step;
            }
            // Leftover nanoseconds from the integer division
            action.update(ms(duration) - spent);

            assert!(action.is_finished(), "duration {duration}ms");
            assert!((*target.borrow() - 12.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_from_to_writes_begin_on_start() {
        let target = Rc::new(RefCell::new(99.0_f32));
        let action = from_to(&target, 10.0, 20.0, ms(100), Ease::linear());
        assert_eq!(*target.borrow(), 99.0);

        action.start();
        assert_eq!(*target.borrow(), 10.0);

        action.update(ms(50));
        assert!((*target.borrow() - 15.0).abs() < 1e-4);
    }

    #[test]
    fn test_to_snapshots_begin_at_start() {
        let target = Rc::new(RefCell::new(0.0_f32));
        let action = to(&target, 100.0, ms(100), Ease::linear());

        *target.borrow_mut() = 50.0;
        action.start();
        action.update(ms(50));
        assert!((*target.borrow() - 75.0).abs() < 1e-4);

        action.update(ms(50));
        assert!(action.is_finished());
        assert_eq!(*target.borrow(), 100.0);
    }

    #[test]
    fn test_busy_target_stalls_instead_of_panicking() {
        let target = Rc::new(RefCell::new(20.0_f32));
        let action = to(&target, 100.0, ms(100), Ease::linear());
        {
            let _busy = target.borrow_mut();
            action.start();
            assert_eq!(action.update(ms(50)), State::Running);
            assert_eq!(action.elapsed(), Duration::ZERO);
        }
        action.update(ms(50));
        assert!((*target.borrow() - 60.0).abs() < 1e-4);

        let counter = Rc::new(RefCell::new(0_i32));
        let action = by(&counter, 10, ms(20), Ease::linear());
        action.start();
        action.update(ms(10));
        {
            let _busy = counter.borrow_mut();
            assert_eq!(action.update(ms(10)), State::Running);
        }
        assert_eq!(*counter.borrow(), 5);
        assert_eq!(action.update(ms(10)), State::Finished);
        assert_eq!(*counter.borrow(), 10);
    }

    #[test]
    fn test_by_respects_external_writes() {
        let target = Rc::new(RefCell::new(10_i32));
        let action = by(&target, 100, ms(100), Ease::linear());
        action.start();
        assert_eq!(*target.borrow(), 10);

        action.update(ms(50));
        assert_eq!(*target.borrow(), 60);

        *target.borrow_mut() += 1000;
        action.update(ms(50));
        assert!(action.is_finished());
        assert_eq!(*target.borrow(), 1110);
    }

    #[test]
    fn test_expired_target_yields_invalid_action() {
        let lifeline = crate::Lifeline::new();
        let sentinel = lifeline.sentinel();
        lifeline.expire();

        let action = from_to_with(sentinel, |_: f32| {}, 0.0, 1.0, ms(10), Ease::linear());
        assert!(!action.is_valid());
    }

    #[test]
    fn test_target_dropped_mid_flight() {
        let target = Rc::new(RefCell::new(0.0_f32));
        let action = from_to(&target, 0.0, 1.0, ms(100), Ease::linear());
        let ended = Rc::new(Cell::new(false));
        let e = ended.clone();
        action.on_end.connect(move || e.set(true));

        action.start();
        action.update(ms(10));
        drop(target);

        assert_eq!(action.update(ms(10)), State::Finished);
        assert!(!ended.get());
    }

    #[test]
    fn test_sentinel_expiring_during_step_stops_writes() {
        let value = Rc::new(Cell::new(0.0_f32));
        let writes = Rc::new(Cell::new(0));
        let lifeline = Rc::new(crate::Lifeline::new());

        let (v, w) = (value.clone(), writes.clone());
        let action = to_with(
            lifeline.sentinel(),
            {
                let v = value.clone();
                move || v.get()
            },
            move |x| {
                v.set(x);
                w.set(w.get() + 1);
            },
            1.0,
            ms(100),
            Ease::linear(),
        );

        let l = lifeline.clone();
        action.on_step.connect(move || l.expire());

        action.start();
        assert_eq!(writes.get(), 1);
        assert_eq!(action.update(ms(10)), State::Finished);
        assert_eq!(writes.get(), 1);
        assert_eq!(value.get(), 0.0);
    }

    #[test]
    fn test_sentinel_expiring_in_on_begin() {
        let target = Rc::new(RefCell::new(3.0_f32));
        let lifeline = Rc::new(crate::Lifeline::new());
        let t = target.clone();
        let action = from_to_with(
            lifeline.sentinel(),
            move |x| *t.borrow_mut() = x,
            0.0,
            1.0,
            ms(100),
            Ease::linear(),
        );
        let l = lifeline.clone();
        action.on_begin.connect(move || l.expire());

        action.start();
        assert!(action.is_finished());
        assert_eq!(*target.borrow(), 3.0);
    }

    #[test]
    fn test_array_target() {
        let color = Rc::new(RefCell::new([0.0_f32; 4]));
        let action = from_to(&color, [0.0; 4], [1.0, 0.5, 0.25, 1.0], ms(10), Ease::linear());
        action.start();
        action.update(ms(10));
        assert_eq!(*color.borrow(), [1.0, 0.5, 0.25, 1.0]);
    }
}
