//! Scenario playback
//!
//! Builds the action tree of every scenario entry against a set of `f32`
//! channels and drives a private [`Manager`] with a fixed frame step.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use cadence_seq::{
    by, delay, from_to, repeat, repeat_precise, sequence, sequence_precise, to, together, Action,
    ActionId, InspectSnapshot, Manager, ScopePolicy,
};
use serde::Serialize;

use crate::config::{Control, ControlOp, Node, Scenario};

type Channels = BTreeMap<String, Rc<RefCell<f32>>>;

// =============================================================================
// Report
// =============================================================================

/// Outcome of a playback
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub elapsed_ms: f64,
    pub ticks: u64,
    /// Whether every action finished before `max_ms`
    pub finished: bool,
    pub channels: BTreeMap<String, f32>,
    pub actions: Vec<ActionReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub name: String,
    pub id: u64,
    pub started_ms: Option<f64>,
    pub finished_ms: Option<f64>,
}

/// Channel values after one tick
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub time_ms: f64,
    pub channels: BTreeMap<String, f32>,
}

impl Report {
    /// Human readable summary
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{} after {:.1}ms ({} ticks)\n",
            if self.finished { "Finished" } else { "Stopped" },
            self.elapsed_ms,
            self.ticks
        ));

        out.push_str("\nChannels:\n");
        for (name, value) in &self.channels {
            out.push_str(&format!("  {:<16} {:>10.4}\n", name, value));
        }

        out.push_str("\nActions:\n");
        for action in &self.actions {
            let started = action
                .started_ms
                .map(|t| format!("{:.1}ms", t))
                .unwrap_or_else(|| "-".to_string());
            let finished = action
                .finished_ms
                .map(|t| format!("{:.1}ms", t))
                .unwrap_or_else(|| "running".to_string());
            out.push_str(&format!(
                "  {:<16} #{:<6} start {:>10}  end {:>10}\n",
                action.name, action.id, started, finished
            ));
        }

        for frame in &self.frames {
            let values: Vec<String> = frame
                .channels
                .iter()
                .map(|(name, value)| format!("{}={:.4}", name, value))
                .collect();
            out.push_str(&format!("{:>10.1}ms  {}\n", frame.time_ms, values.join(" ")));
        }
        out
    }
}

// =============================================================================
// Building
// =============================================================================

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn channel<'a>(channels: &'a Channels, name: &str) -> Result<&'a Rc<RefCell<f32>>> {
    channels
        .get(name)
        .with_context(|| format!("Unknown channel '{}'", name))
}

/// Turn a scenario node into an action writing into `channels`
pub fn build(node: &Node, channels: &Channels) -> Result<Action> {
    let action = match node {
        Node::FromTo {
            channel: name,
            from,
            to: end,
            ms: length,
            ease,
        } => from_to(channel(channels, name)?, *from, *end, ms(*length), *ease),
        Node::To {
            channel: name,
            to: end,
            ms: length,
            ease,
        } => to(channel(channels, name)?, *end, ms(*length), *ease),
        Node::By {
            channel: name,
            by: amount,
            ms: length,
            ease,
        } => by(channel(channels, name)?, *amount, ms(*length), *ease),
        Node::Delay { ms: length } => delay(ms(*length)),
        Node::Sequence { children, precise } => {
            let children = build_all(children, channels)?;
            if *precise {
                sequence_precise(children)
            } else {
                sequence(children)
            }
        }
        Node::Together { children } => together(build_all(children, channels)?),
        Node::Repeat {
            child,
            times,
            precise,
        } => {
            let child = build(child, channels)?;
            if *precise {
                repeat_precise(child, *times)
            } else {
                repeat(child, *times)
            }
        }
    };
    Ok(action)
}

fn build_all(nodes: &[Node], channels: &Channels) -> Result<Vec<Action>> {
    nodes.iter().map(|node| build(node, channels)).collect()
}

// =============================================================================
// Player
// =============================================================================

/// Plays a scenario one fixed tick at a time
pub struct Player {
    scenario: Scenario,
    manager: Manager,
    channels: Channels,
    tick: Duration,
    clock_ms: f64,
    ticks: u64,
    ids: Vec<Option<ActionId>>,
    started_ms: Vec<Option<f64>>,
    finished_ms: Vec<Option<f64>>,
    applied_controls: usize,
    record_frames: bool,
    frames: Vec<Frame>,
}

impl Player {
    pub fn new(scenario: Scenario) -> Self {
        let channels = scenario
            .channels
            .iter()
            .map(|(name, value)| (name.clone(), Rc::new(RefCell::new(*value))))
            .collect();

        let mut controls = scenario.controls.clone();
        controls.sort_by(|a, b| a.at_ms.total_cmp(&b.at_ms));

        let count = scenario.actions.len();
        let tick = Duration::from_secs_f64(scenario.settings.tick_ms / 1000.0);
        Self {
            scenario: Scenario {
                controls,
                ..scenario
            },
            manager: Manager::new(),
            channels,
            tick,
            clock_ms: 0.0,
            ticks: 0,
            ids: vec![None; count],
            started_ms: vec![None; count],
            finished_ms: vec![None; count],
            applied_controls: 0,
            record_frames: false,
            frames: Vec::new(),
        }
    }

    /// Record channel values after every tick
    pub fn with_frames(mut self, enabled: bool) -> Self {
        self.record_frames = enabled;
        self
    }

    /// Whether nothing is left to start, apply or advance
    pub fn is_done(&self) -> bool {
        self.ids.iter().all(Option::is_some)
            && self.applied_controls == self.scenario.controls.len()
            && self.manager.is_empty()
    }

    /// Start due actions, apply due controls, then advance one tick
    pub fn step(&mut self) -> Result<()> {
        self.start_due()?;
        self.apply_due()?;

        self.manager.update(self.tick);
        self.ticks += 1;
        self.clock_ms += self.scenario.settings.tick_ms;

        for (index, id) in self.ids.iter().enumerate() {
            if let Some(id) = id {
                if self.finished_ms[index].is_none() && self.manager.is_finished(*id) {
                    tracing::debug!(
                        "Player: {} finished at {:.1}ms",
                        self.scenario.action_name(index),
                        self.clock_ms
                    );
                    self.finished_ms[index] = Some(self.clock_ms);
                }
            }
        }

        if self.record_frames {
            self.frames.push(Frame {
                time_ms: self.clock_ms,
                channels: self.snapshot_channels(),
            });
        }
        Ok(())
    }

    /// Step until done or until `max_ms`
    pub fn run(mut self) -> Result<Report> {
        let max_ms = self.scenario.settings.max_ms;
        while !self.is_done() && self.clock_ms < max_ms {
            self.step()?;
        }
        if !self.is_done() {
            tracing::warn!(
                "Player: stopping at {:.1}ms with {} actions still running",
                self.clock_ms,
                self.manager.len()
            );
        }
        Ok(self.report())
    }

    /// Step until the clock reaches `at_ms` and snapshot the manager
    pub fn inspect_at(mut self, at_ms: f64) -> Result<Vec<InspectSnapshot>> {
        while self.clock_ms < at_ms && !self.is_done() {
            self.step()?;
        }
        Ok(self.manager.inspect())
    }

    pub fn report(&self) -> Report {
        let actions = (0..self.scenario.actions.len())
            .map(|index| ActionReport {
                name: self.scenario.action_name(index),
                id: self.ids[index].map(ActionId::get).unwrap_or_default(),
                started_ms: self.started_ms[index],
                finished_ms: self.finished_ms[index],
            })
            .collect();

        Report {
            elapsed_ms: self.clock_ms,
            ticks: self.ticks,
            finished: self.is_done(),
            channels: self.snapshot_channels(),
            actions,
            frames: self.frames.clone(),
        }
    }

    fn snapshot_channels(&self) -> BTreeMap<String, f32> {
        self.channels
            .iter()
            .map(|(name, cell)| (name.clone(), *cell.borrow()))
            .collect()
    }

    fn start_due(&mut self) -> Result<()> {
        for index in 0..self.scenario.actions.len() {
            let planned = &self.scenario.actions[index];
            if self.ids[index].is_some() || planned.at_ms > self.clock_ms {
                continue;
            }

            let action = build(&planned.node, &self.channels)
                .with_context(|| format!("Failed to build {}", self.scenario.action_name(index)))?;
            action.set_speed_multiplier(planned.speed.unwrap_or(1.0) * self.scenario.settings.speed);

            let policy = if planned.independent {
                ScopePolicy::independent(planned.scope.clone())
            } else {
                ScopePolicy::stacked(planned.scope.clone())
            };
            let id = self.manager.start(action, policy);
            tracing::debug!(
                "Player: started {} as {} at {:.1}ms",
                self.scenario.action_name(index),
                id,
                self.clock_ms
            );

            self.ids[index] = Some(id);
            self.started_ms[index] = Some(self.clock_ms);
            if !id.is_valid() {
                self.finished_ms[index] = Some(self.clock_ms);
            }
        }
        Ok(())
    }

    fn apply_due(&mut self) -> Result<()> {
        while let Some(control) = self.scenario.controls.get(self.applied_controls) {
            if control.at_ms > self.clock_ms {
                break;
            }
            apply(&self.manager, control)?;
            self.applied_controls += 1;
        }
        Ok(())
    }
}

fn apply(manager: &Manager, control: &Control) -> Result<()> {
    tracing::debug!(
        "Player: {:?} scope='{}' key='{}' at {:.1}ms",
        control.op,
        control.scope,
        control.key,
        control.at_ms
    );
    match control.op {
        ControlOp::PushScope => manager.push_scope(&control.scope)?,
        ControlOp::PopScope => {
            manager.pop_scope()?;
        }
        ControlOp::PauseAll => manager.pause_all(&control.scope, &control.key),
        ControlOp::ResumeAll => manager.resume_all(&control.scope, &control.key),
        ControlOp::StopAll => manager.stop_all(&control.scope),
        ControlOp::StopWhenFinishedAll => manager.stop_when_finished_all(&control.scope),
        ControlOp::StopAndFinishAll => manager.stop_and_finish_all(&control.scope)?,
    }
    Ok(())
}
