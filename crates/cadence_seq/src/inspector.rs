//! Diagnostic records for visualization tooling
//!
//! Every action carries an optional [`InspectInfo`] that the scheduler fills
//! in best-effort: what kind of action it is, which type it mutates, its
//! begin/current/end values rendered as strings, and its timing. Records are
//! shared between an action and its clones, so a combinator can link its
//! children's records before any of them has started.
//!
//! Records are only populated with the `inspector` feature. Without it the
//! hooks below are no-ops and [`Action::info`] is always `None`; scheduling
//! behaves identically either way.

use std::cell::RefCell;
use std::fmt::Debug;
use std::panic::Location;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::Serialize;

use crate::action::{Action, ActionId, State};

/// Shared handle to an action's record
pub type InfoRef = Rc<RefCell<InspectInfo>>;

/// Live diagnostic record of one action
#[derive(Debug, Clone, Default)]
pub struct InspectInfo {
    pub id: ActionId,
    /// `from_to`, `to`, `by`, `sequence`, `together`, `delay`, `repeat` or `custom`
    pub kind: &'static str,
    /// Type name of the mutated value, empty for structural actions
    pub modified_type: &'static str,
    pub begin: String,
    pub current: String,
    pub end: String,
    pub state: State,
    pub elapsed: Duration,
    pub duration: Duration,
    pub progress: f32,
    pub speed_multiplier: f32,
    pub stop_when_finished: bool,
    /// Where the action was handed to the global `start`
    pub location: Option<&'static Location<'static>>,
    pub children: Vec<Weak<RefCell<InspectInfo>>>,
}

/// Owned, serializable copy of a record tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectSnapshot {
    pub id: u64,
    pub kind: String,
    pub modified_type: String,
    pub begin: String,
    pub current: String,
    pub end: String,
    pub state: State,
    pub elapsed_ms: f64,
    pub duration_ms: f64,
    pub progress: f32,
    pub speed_multiplier: f32,
    pub stop_when_finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<InspectSnapshot>,
}

impl InspectSnapshot {
    /// Copy a record and every child record that is still alive
    pub fn capture(info: &InspectInfo) -> Self {
        let children = info
            .children
            .iter()
            .filter_map(Weak::upgrade)
            .map(|child| Self::capture(&child.borrow()))
            .collect();

        Self {
            id: info.id.get(),
            kind: info.kind.to_string(),
            modified_type: info.modified_type.to_string(),
            begin: info.begin.clone(),
            current: info.current.clone(),
            end: info.end.clone(),
            state: info.state,
            elapsed_ms: info.elapsed.as_secs_f64() * 1000.0,
            duration_ms: info.duration.as_secs_f64() * 1000.0,
            progress: info.progress,
            speed_multiplier: info.speed_multiplier,
            stop_when_finished: info.stop_when_finished,
            location: info
                .location
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column())),
            children,
        }
    }

    /// Total number of records in this tree
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Self::count).sum::<usize>()
    }
}

// ============================================================================
// Hooks
// ============================================================================

#[cfg(feature = "inspector")]
pub(crate) fn record(id: ActionId, duration: Duration) -> Option<InfoRef> {
    Some(Rc::new(RefCell::new(InspectInfo {
        id,
        kind: "custom",
        duration,
        speed_multiplier: 1.0,
        ..Default::default()
    })))
}

#[cfg(not(feature = "inspector"))]
pub(crate) fn record(_id: ActionId, _duration: Duration) -> Option<InfoRef> {
    None
}

pub(crate) fn describe(action: &Action, kind: &'static str, modified_type: &'static str) {
    if let Some(info) = action.info() {
        let mut info = info.borrow_mut();
        info.kind = kind;
        info.modified_type = modified_type;
    }
}

pub(crate) fn set_range<T: Debug>(action: &Action, begin: Option<&T>, end: Option<&T>) {
    if let Some(info) = action.info() {
        let mut info = info.borrow_mut();
        if let Some(begin) = begin {
            info.begin = format!("{begin:?}");
        }
        if let Some(end) = end {
            info.end = format!("{end:?}");
        }
    }
}

pub(crate) fn set_current<T: Debug>(action: &Action, current: &T) {
    if let Some(info) = action.info() {
        info.borrow_mut().current = format!("{current:?}");
    }
}

pub(crate) fn add_child(parent: &Action, child: &Action) {
    if let (Some(parent), Some(child)) = (parent.info(), child.info()) {
        parent.borrow_mut().children.push(Rc::downgrade(child));
    }
}

pub(crate) fn set_location(action: &Action, location: &'static Location<'static>) {
    if let Some(info) = action.info() {
        info.borrow_mut().location = Some(location);
    }
}

/// Copy the action's timing into its record
pub(crate) fn refresh(action: &Action) {
    if let Some(info) = action.info() {
        let mut info = info.borrow_mut();
        info.state = action.state();
        info.elapsed = action.elapsed();
        info.progress = action.progress();
        info.speed_multiplier = action.speed_multiplier();
        info.stop_when_finished = action.is_stopping();
    }
}

#[cfg(all(test, feature = "inspector"))]
mod tests {
    use super::*;
    use crate::combinators::{delay, sequence};
    use crate::mutators::from_to;
    use crate::Ease;

    #[test]
    fn test_records_link_children() {
        let target = Rc::new(RefCell::new(0.0_f32));
        let leaf = from_to(&target, 0.0, 10.0, Duration::from_millis(100), Ease::linear());
        let wait = delay(Duration::from_millis(50));
        let seq = sequence(vec![leaf.clone(), wait]);

        let info = seq.info().expect("inspector enabled");
        let snapshot = InspectSnapshot::capture(&info.borrow());
        assert_eq!(snapshot.kind, "sequence");
        assert_eq!(snapshot.count(), 3);
        assert_eq!(snapshot.children[0].kind, "from_to");
        assert_eq!(snapshot.children[0].modified_type, "f32");
        assert_eq!(snapshot.children[0].begin, "0.0");
        assert_eq!(snapshot.children[0].end, "10.0");
        assert_eq!(snapshot.children[1].kind, "delay");
        assert!((snapshot.duration_ms - 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_refresh_tracks_progress() {
        let action = delay(Duration::from_millis(200));
        action.start();
        action.update(Duration::from_millis(50));

        let info = action.info().expect("inspector enabled");
        let info = info.borrow();
        assert_eq!(info.state, State::Running);
        assert_eq!(info.elapsed, Duration::from_millis(50));
        assert!((info.progress - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_snapshot_serializes() {
        let action = delay(Duration::from_millis(10));
        let info = action.info().expect("inspector enabled");
        let snapshot = InspectSnapshot::capture(&info.borrow());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["kind"], "delay");
        assert_eq!(json["state"], "finished");
        assert!(json.get("children").is_none());
    }
}
