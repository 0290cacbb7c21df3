//! Structural actions
//!
//! Combinators are ordinary [`Action`]s whose updater drives child actions
//! through the same lifecycle calls the [`Manager`](crate::Manager) uses, so
//! they nest freely and look like leaves from the outside.
//!
//! | Combinator | Duration | Finishes when |
//! |---|---|---|
//! | [`sequence`] | sum of children | the last child finishes |
//! | [`together`] | longest child | every child has finished |
//! | [`delay`] | as given | the duration has elapsed |
//! | [`repeat`] | `times` x child, 0 if endless | `times` cycles ran |
//!
//! The `_precise` variants carry the time a child received beyond its own
//! duration into the next child (or the next cycle) instead of dropping it.
//!
//! A wind-down request ([`Manager::stop_when_finished`](crate::Manager::stop_when_finished))
//! is forwarded to the running child of a sequence and to every live child of
//! the other combinators. A repeat that has been asked to wind down finishes
//! with its current cycle instead of starting another.
//!
//! Children are templates: every start of the parent drives fresh copies.

use std::rc::Rc;
use std::time::Duration;

use crate::action::{Action, State, Updater};
use crate::inspector;
use crate::sentinel::Sentinel;

fn structural<F>(kind: &'static str, creator: F, duration: Duration, children: &[Action]) -> Action
where
    F: Fn() -> Updater + 'static,
{
    let action = Action::new(creator, duration, Sentinel::eternal());
    inspector::describe(&action, kind, "");
    for child in children {
        inspector::add_child(&action, child);
    }
    action
}

// ============================================================================
// Sequence
// ============================================================================

/// Run `actions` one after another
pub fn sequence(actions: impl IntoIterator<Item = Action>) -> Action {
    build_sequence(actions.into_iter().collect(), false)
}

/// [`sequence`] that carries each child's overflow into the next child
pub fn sequence_precise(actions: impl IntoIterator<Item = Action>) -> Action {
    build_sequence(actions.into_iter().collect(), true)
}

fn build_sequence(templates: Vec<Action>, precise: bool) -> Action {
    if templates.is_empty() {
        return Action::default();
    }

    let duration = templates
        .iter()
        .map(Action::duration)
        .fold(Duration::ZERO, Duration::saturating_add);
    let templates: Rc<[Action]> = templates.into();
    let linked = templates.clone();

    let creator = move || -> Updater {
        let children: Vec<Action> = templates.iter().cloned().collect();
        let mut index = 0;
        let mut start_required = true;
        let mut prev_elapsed = Duration::ZERO;
        let mut prev_overflow = Duration::ZERO;
        let mut finished = false;

        Box::new(move |dt: Duration, this: &Action| {
            if finished {
                return State::Finished;
            }
            if this.sentinel().is_expired() {
                finished = true;
                return State::Finished;
            }

            let current = &children[index];
            if start_required {
                current.start();
                prev_elapsed = Duration::ZERO;
                start_required = false;
            }
            if this.is_stopping() {
                current.stop_when_finished(true);
            }
            if this.is_finishing() {
                current.stop_and_finished(true);
            }

            let dt = if precise { dt.saturating_add(prev_overflow) } else { dt };
            let state = current.update(dt);

            let elapsed = current.elapsed();
            this.update_elapsed(elapsed.saturating_sub(prev_elapsed));
            prev_elapsed = elapsed;
            this.on_step.emit();

            prev_overflow = Duration::ZERO;
            if state == State::Finished {
                prev_overflow = current.overflow();
                index += 1;
                if index == children.len() {
                    this.update_elapsed(prev_overflow);
                    finished = true;
                    return State::Finished;
                }
                start_required = true;
            }
            State::Running
        })
    };

    structural("sequence", creator, duration, &linked)
}

// ============================================================================
// Together
// ============================================================================

/// Run `actions` side by side
pub fn together(actions: impl IntoIterator<Item = Action>) -> Action {
    let templates: Vec<Action> = actions.into_iter().collect();
    if templates.is_empty() {
        return Action::default();
    }

    let duration = templates
        .iter()
        .map(Action::duration)
        .max()
        .unwrap_or_default();
    let templates: Rc<[Action]> = templates.into();
    let linked = templates.clone();

    let creator = move || -> Updater {
        let children: Vec<Action> = templates.iter().cloned().collect();
        let mut start_required = true;
        let mut finished = false;

        Box::new(move |dt: Duration, this: &Action| {
            if finished {
                return State::Finished;
            }
            if this.sentinel().is_expired() {
                finished = true;
                return State::Finished;
            }

            if start_required {
                for child in &children {
                    child.start();
                }
                start_required = false;
            }
            for child in children.iter().filter(|c| !c.is_finished()) {
                if this.is_stopping() {
                    child.stop_when_finished(true);
                }
                if this.is_finishing() {
                    child.stop_and_finished(true);
                }
            }

            let mut all_finished = true;
            for child in &children {
                all_finished &= child.update(dt) == State::Finished;
            }

            this.update_elapsed(dt);
            this.on_step.emit();

            if all_finished {
                finished = true;
                return State::Finished;
            }
            State::Running
        })
    };

    structural("together", creator, duration, &linked)
}

// ============================================================================
// Delay
// ============================================================================

/// Wait for `duration`
pub fn delay(duration: Duration) -> Action {
    let creator = || -> Updater {
        let mut finished = false;
        Box::new(move |dt: Duration, this: &Action| {
            if finished {
                return State::Finished;
            }
            if this.sentinel().is_expired() {
                finished = true;
                return State::Finished;
            }

            this.update_elapsed(dt);
            this.on_step.emit();

            if this.elapsed() == this.duration() {
                finished = true;
                return State::Finished;
            }
            State::Running
        })
    };

    structural("delay", creator, duration, &[])
}

// ============================================================================
// Repeat
// ============================================================================

/// Run `action` `times` times; `0` repeats until asked to stop
pub fn repeat(action: Action, times: usize) -> Action {
    build_repeat(action, times, false)
}

/// [`repeat`] that carries each cycle's overflow into the next cycle
pub fn repeat_precise(action: Action, times: usize) -> Action {
    build_repeat(action, times, true)
}

fn build_repeat(template: Action, times: usize, precise: bool) -> Action {
    if !template.is_valid() {
        return Action::default();
    }

    let duration = if times > 0 {
        let times = u32::try_from(times).unwrap_or(u32::MAX);
        template.duration().saturating_mul(times)
    } else {
        Duration::ZERO
    };
    let linked = template.clone();

    let creator = move || -> Updater {
        let child = template.clone();
        let mut cycles = 0;
        let mut prev_elapsed = Duration::ZERO;
        let mut prev_overflow = Duration::ZERO;
        let mut finished = false;

        Box::new(move |dt: Duration, this: &Action| {
            if finished {
                return State::Finished;
            }
            if this.sentinel().is_expired() {
                finished = true;
                return State::Finished;
            }

            if cycles > 0 {
                if this.is_stopping() {
                    child.stop_when_finished(true);
                }
                if this.is_finishing() {
                    child.stop_and_finished(true);
                }
            }

            let dt = if precise { dt.saturating_add(prev_overflow) } else { dt };
            let state = child.update(dt);

            let elapsed = child.elapsed();
            this.update_elapsed(elapsed.saturating_sub(prev_elapsed));
            prev_elapsed = elapsed;
            this.on_step.emit();

            prev_overflow = Duration::ZERO;
            if state == State::Finished {
                prev_overflow = child.overflow();
                let done = (cycles > 0 && this.is_stopping()) || (times > 0 && cycles >= times);
                if done {
                    this.update_elapsed(prev_overflow);
                    finished = true;
                    return State::Finished;
                }

                child.start();
                prev_elapsed = Duration::ZERO;
                cycles += 1;
            }
            State::Running
        })
    };

    structural("repeat", creator, duration, std::slice::from_ref(&linked))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ease::Ease;
    use crate::mutators::from_to;
    use std::cell::{Cell, RefCell};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn counter(action: &Action) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        action.on_begin.connect(move || c.set(c.get() + 1));
        count
    }

    #[test]
    fn test_empty_inputs_are_invalid() {
        assert!(!sequence(Vec::new()).is_valid());
        assert!(!sequence_precise(Vec::new()).is_valid());
        assert!(!together(Vec::new()).is_valid());
        assert!(!repeat(Action::default(), 3).is_valid());
    }

    #[test]
    fn test_delay_scenario() {
        let action = delay(ms(1000));
        action.start();
        assert!(action.is_running());

        assert_eq!(action.update(ms(400)), State::Running);
        assert_eq!(action.elapsed(), ms(400));

        assert_eq!(action.update(ms(700)), State::Finished);
        assert_eq!(action.elapsed(), ms(1000));
        assert_eq!(action.overflow(), ms(100));
    }

    #[test]
    fn test_sequence_runs_children_in_order() {
        let x = Rc::new(RefCell::new(0.0_f32));
        let y = Rc::new(RefCell::new(0.0_f32));
        let a = from_to(&x, 0.0, 1.0, ms(100), Ease::linear());
        let b = from_to(&y, 0.0, 1.0, ms(150), Ease::linear());

        let log = Rc::new(RefCell::new(Vec::new()));
        for (action, name) in [(&a, "a"), (&b, "b")] {
            let l = log.clone();
            action.on_begin.connect(move || l.borrow_mut().push(format!("{name} begin")));
            let l = log.clone();
            action.on_end.connect(move || l.borrow_mut().push(format!("{name} end")));
        }

        let seq = sequence(vec![a, b]);
        assert_eq!(seq.duration(), ms(250));

        seq.start();
        assert_eq!(seq.update(ms(100)), State::Running);
        assert_eq!(*x.borrow(), 1.0);
        assert_eq!(*log.borrow(), vec!["a begin", "a end"]);

        assert_eq!(seq.update(ms(100)), State::Running);
        assert_eq!(seq.update(ms(50)), State::Finished);
        assert_eq!(*y.borrow(), 1.0);
        assert_eq!(seq.elapsed(), ms(250));
        assert_eq!(*log.borrow(), vec!["a begin", "a end", "b begin", "b end"]);
    }

    #[test]
    fn test_precise_sequence_carries_overflow() {
        let run = |precise: bool| {
            let target = Rc::new(RefCell::new(0.0_f32));
            let tail = from_to(&target, 0.0, 100.0, ms(100), Ease::linear());
            let children = vec![delay(ms(100)), tail];
            let seq = if precise {
                sequence_precise(children)
            } else {
                sequence(children)
            };

            seq.start();
            seq.update(ms(150));
            seq.update(ms(10));
            let value = *target.borrow();
            (value, seq.elapsed())
        };

        let (plain, plain_elapsed) = run(false);
        assert!((plain - 10.0).abs() < 1e-3);
        assert_eq!(plain_elapsed, ms(110));

        let (precise, precise_elapsed) = run(true);
        assert!((precise - 60.0).abs() < 1e-3);
        assert_eq!(precise_elapsed, ms(160));
    }

    #[test]
    fn test_together_waits_for_longest() {
        let short = delay(ms(100));
        let long = delay(ms(300));
        let both = together([short, long]);
        assert_eq!(both.duration(), ms(300));

        both.start();
        assert_eq!(both.update(ms(100)), State::Running);
        assert_eq!(both.update(ms(100)), State::Running);
        assert_eq!(both.update(ms(100)), State::Finished);
        assert_eq!(both.elapsed(), ms(300));
    }

    #[test]
    fn test_repeat_runs_exact_cycles() {
        let child = delay(ms(100));
        let begins = counter(&child);
        let looped = repeat(child, 3);
        assert_eq!(looped.duration(), ms(300));

        looped.start();
        assert_eq!(looped.update(ms(100)), State::Running);
        assert_eq!(looped.update(ms(100)), State::Running);
        assert_eq!(looped.update(ms(100)), State::Finished);
        assert_eq!(begins.get(), 3);
        assert_eq!(looped.elapsed(), ms(300));
    }

    #[test]
    fn test_precise_repeat_carries_overflow() {
        let looped = repeat_precise(delay(ms(100)), 2);
        looped.start();
        assert_eq!(looped.update(ms(150)), State::Running);
        assert_eq!(looped.update(ms(50)), State::Finished);

        let looped = repeat(delay(ms(100)), 2);
        looped.start();
        assert_eq!(looped.update(ms(150)), State::Running);
        assert_eq!(looped.update(ms(50)), State::Running);
    }

    #[test]
    fn test_endless_repeat_needs_stop_request() {
        let child = delay(ms(10));
        let begins = counter(&child);
        let looped = repeat(child, 0);
        assert_eq!(looped.duration(), Duration::ZERO);

        looped.start();
        for _ in 0..50 {
            assert_eq!(looped.update(ms(10)), State::Running);
        }
        assert_eq!(begins.get(), 51);

        looped.stop_when_finished(true);
        assert_eq!(looped.update(ms(5)), State::Running);
        assert_eq!(looped.update(ms(5)), State::Finished);
    }

    #[test]
    fn test_together_forwards_stop_request() {
        let both = together([repeat(delay(ms(10)), 0), delay(ms(5))]);

        both.start();
        for _ in 0..3 {
            assert_eq!(both.update(ms(10)), State::Running);
        }

        both.stop_when_finished(true);
        assert_eq!(both.update(ms(5)), State::Running);
        assert_eq!(both.update(ms(5)), State::Finished);
    }

    #[test]
    fn test_huge_durations_saturate() {
        let seq = sequence([delay(Duration::MAX), delay(ms(1))]);
        assert_eq!(seq.duration(), Duration::MAX);

        let seq = sequence_precise([delay(Duration::from_secs(1)), delay(Duration::from_secs(1))]);
        seq.start();
        assert_eq!(seq.update(Duration::MAX), State::Running);
        assert_eq!(seq.update(Duration::from_secs(2)), State::Finished);

        let looped = repeat_precise(delay(Duration::from_secs(1)), 2);
        looped.start();
        assert_eq!(looped.update(Duration::MAX), State::Running);
        assert_eq!(looped.update(Duration::from_secs(1)), State::Finished);
    }

    #[test]
    fn test_stop_request_reaches_active_child() {
        let tail = delay(ms(10));
        let tail_begins = counter(&tail);
        let seq = sequence([repeat(delay(ms(10)), 0), tail]);

        seq.start();
        for _ in 0..5 {
            assert_eq!(seq.update(ms(10)), State::Running);
        }

        seq.stop_when_finished(true);
        assert_eq!(seq.update(ms(10)), State::Running);
        assert_eq!(tail_begins.get(), 0);
        assert_eq!(seq.update(ms(10)), State::Finished);
        assert_eq!(tail_begins.get(), 1);
    }

    #[test]
    fn test_expired_parent_skips_children() {
        let target = Rc::new(RefCell::new(0.0_f32));
        let child = from_to(&target, 0.0, 1.0, ms(100), Ease::linear());
        let lifeline = crate::Lifeline::new();
        let seq = sequence([child]).with_sentinel(lifeline.sentinel());

        seq.start();
        seq.update(ms(50));
        assert!((*target.borrow() - 0.5).abs() < 1e-4);

        lifeline.expire();
        assert_eq!(seq.update(ms(50)), State::Finished);
        assert!((*target.borrow() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_nested_composition() {
        let target = Rc::new(RefCell::new(0.0_f32));
        let inner = sequence([delay(ms(50)), from_to(&target, 0.0, 1.0, ms(50), Ease::linear())]);
        let outer = together([repeat(inner, 2), delay(ms(120))]);
        assert_eq!(outer.duration(), ms(200));

        outer.start();
        let mut ticks = 0;
        while outer.update(ms(25)) == State::Running {
            ticks += 1;
            assert!(ticks < 100);
        }
        assert_eq!(*target.borrow(), 1.0);
    }

    #[test]
    fn test_restart_uses_fresh_children() {
        let child = delay(ms(100));
        let begins = counter(&child);
        let seq = sequence([child]);

        seq.start();
        seq.update(ms(60));
        seq.start();
        assert_eq!(seq.elapsed(), Duration::ZERO);
        assert_eq!(seq.update(ms(60)), State::Running);
        assert_eq!(seq.update(ms(40)), State::Finished);
        assert_eq!(begins.get(), 2);
    }
}
