//! Scenario file handling
//!
//! A scenario is a TOML document describing named `f32` channels, a tree of
//! actions animating them and timed scope controls:
//!
//! ```toml
//! [settings]
//! tick_ms = 16.0
//! max_ms = 10000.0
//!
//! [channels]
//! alpha = 0.0
//!
//! [[actions]]
//! name = "fade"
//! scope = "hud"
//! node = { kind = "from_to", channel = "alpha", from = 0.0, to = 1.0, ms = 250, ease = "quad_out" }
//!
//! [[controls]]
//! at_ms = 100.0
//! op = "pause_all"
//! scope = "hud"
//! ```

use anyhow::{Context, Result};
use cadence_seq::Easing;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

// =============================================================================
// Scenario
// =============================================================================

/// A complete scenario file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Scenario {
    #[serde(default)]
    pub settings: Settings,
    /// Channel name to initial value
    #[serde(default)]
    pub channels: BTreeMap<String, f32>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub controls: Vec<Control>,
}

/// Playback settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Fixed frame step
    #[serde(default = "default_tick_ms")]
    pub tick_ms: f64,
    /// Playback stops here even if actions are still running
    #[serde(default = "default_max_ms")]
    pub max_ms: f64,
    /// Speed multiplier applied to every action
    #[serde(default = "default_speed")]
    pub speed: f32,
}

fn default_tick_ms() -> f64 {
    16.0
}

fn default_max_ms() -> f64 {
    60_000.0
}

fn default_speed() -> f32 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            max_ms: default_max_ms(),
            speed: default_speed(),
        }
    }
}

/// A top-level action with its start parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionSpec {
    /// Label used in reports, defaults to `action<N>`
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub scope: String,
    /// Ignore scopes opened by `[[controls]]` `push_scope`
    #[serde(default)]
    pub independent: bool,
    /// Playback time at which the action is started
    #[serde(default)]
    pub at_ms: f64,
    /// Per-action speed multiplier, combined with the global one
    #[serde(default)]
    pub speed: Option<f32>,
    pub node: Node,
}

/// A node of the action tree
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    FromTo {
        channel: String,
        from: f32,
        to: f32,
        ms: u64,
        #[serde(default)]
        ease: Easing,
    },
    To {
        channel: String,
        to: f32,
        ms: u64,
        #[serde(default)]
        ease: Easing,
    },
    By {
        channel: String,
        by: f32,
        ms: u64,
        #[serde(default)]
        ease: Easing,
    },
    Delay {
        ms: u64,
    },
    Sequence {
        children: Vec<Node>,
        #[serde(default)]
        precise: bool,
    },
    Together {
        children: Vec<Node>,
    },
    Repeat {
        child: Box<Node>,
        /// 0 repeats until stopped
        #[serde(default)]
        times: usize,
        #[serde(default)]
        precise: bool,
    },
}

impl Node {
    /// Channels written anywhere in this subtree
    pub fn channels(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_channels(&mut out);
        out
    }

    fn collect_channels<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Node::FromTo { channel, .. } | Node::To { channel, .. } | Node::By { channel, .. } => {
                out.push(channel)
            }
            Node::Delay { .. } => {}
            Node::Sequence { children, .. } | Node::Together { children } => {
                for child in children {
                    child.collect_channels(out);
                }
            }
            Node::Repeat { child, .. } => child.collect_channels(out),
        }
    }

    /// Whether the tree can finish without an external stop
    pub fn is_finite(&self) -> bool {
        match self {
            Node::Sequence { children, .. } | Node::Together { children } => {
                children.iter().all(Node::is_finite)
            }
            Node::Repeat { child, times, .. } => *times > 0 && child.is_finite(),
            _ => true,
        }
    }
}

/// Scope operation applied at a point in playback time
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Control {
    pub at_ms: f64,
    pub op: ControlOp,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlOp {
    PushScope,
    PopScope,
    PauseAll,
    ResumeAll,
    StopAll,
    StopWhenFinishedAll,
    StopAndFinishAll,
}

fn is_time(ms: f64) -> bool {
    ms >= 0.0 && ms.is_finite()
}

impl Scenario {
    /// Load and validate a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let scenario = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(scenario)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check references and settings
    pub fn validate(&self) -> Result<()> {
        if !(self.settings.tick_ms > 0.0 && self.settings.tick_ms.is_finite()) {
            anyhow::bail!("settings.tick_ms must be positive, got {}", self.settings.tick_ms);
        }
        if !is_time(self.settings.max_ms) {
            anyhow::bail!("settings.max_ms must be non-negative, got {}", self.settings.max_ms);
        }
        if !(self.settings.speed >= 0.0) {
            anyhow::bail!("settings.speed must be non-negative, got {}", self.settings.speed);
        }

        for (index, action) in self.actions.iter().enumerate() {
            for channel in action.node.channels() {
                if !self.channels.contains_key(channel) {
                    anyhow::bail!(
                        "actions[{}] writes unknown channel '{}'. Declare it under [channels].",
                        index,
                        channel
                    );
                }
            }
            if !is_time(action.at_ms) {
                anyhow::bail!("actions[{}].at_ms must be non-negative, got {}", index, action.at_ms);
            }
        }

        for (index, control) in self.controls.iter().enumerate() {
            if !is_time(control.at_ms) {
                anyhow::bail!("controls[{}].at_ms must be non-negative, got {}", index, control.at_ms);
            }
        }
        Ok(())
    }

    /// Display name of the action at `index`
    pub fn action_name(&self, index: usize) -> String {
        self.actions
            .get(index)
            .and_then(|a| a.name.clone())
            .unwrap_or_else(|| format!("action{}", index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
[settings]
tick_ms = 10.0

[channels]
x = 0.0
y = 5.0

[[actions]]
name = "slide"
scope = "hud"
node = { kind = "sequence", precise = true, children = [
    { kind = "delay", ms = 100 },
    { kind = "from_to", channel = "x", from = 0.0, to = 1.0, ms = 200, ease = "cubic_in_out" },
] }

[[actions]]
at_ms = 50.0
node = { kind = "repeat", times = 0, child = { kind = "by", channel = "y", by = 1.0, ms = 10 } }

[[controls]]
at_ms = 30.0
op = "pause_all"
scope = "hud"
key = "menu"
"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_toml(SCENARIO).unwrap();
        assert_eq!(scenario.settings.tick_ms, 10.0);
        assert_eq!(scenario.settings.max_ms, 60_000.0);
        assert_eq!(scenario.channels["y"], 5.0);
        assert_eq!(scenario.actions.len(), 2);
        assert_eq!(scenario.action_name(0), "slide");
        assert_eq!(scenario.action_name(1), "action1");

        match &scenario.actions[0].node {
            Node::Sequence { children, precise } => {
                assert!(precise);
                assert_eq!(children.len(), 2);
                assert_eq!(
                    children[1],
                    Node::FromTo {
                        channel: "x".to_string(),
                        from: 0.0,
                        to: 1.0,
                        ms: 200,
                        ease: Easing::CubicInOut,
                    }
                );
            }
            other => panic!("unexpected node {:?}", other),
        }

        assert!(scenario.actions[0].node.is_finite());
        assert!(!scenario.actions[1].node.is_finite());
        assert_eq!(scenario.controls[0].op, ControlOp::PauseAll);
        assert_eq!(scenario.controls[0].key, "menu");
    }

    #[test]
    fn test_unknown_channel_is_rejected() {
        let err = Scenario::from_toml(
            r#"
[[actions]]
node = { kind = "to", channel = "missing", to = 1.0, ms = 10 }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        assert!(Scenario::from_toml("[settings]\ntick_ms = 0.0\n").is_err());
        assert!(Scenario::from_toml("[settings]\nspeed = -1.0\n").is_err());
    }

    #[test]
    fn test_start_times_must_be_finite() {
        let mut scenario = Scenario::from_toml(SCENARIO).unwrap();
        scenario.actions[1].at_ms = f64::NAN;
        assert!(scenario.validate().is_err());

        let mut scenario = Scenario::from_toml(SCENARIO).unwrap();
        scenario.controls[0].at_ms = f64::NAN;
        assert!(scenario.validate().is_err());
        scenario.controls[0].at_ms = -5.0;
        assert!(scenario.validate().is_err());
        scenario.controls[0].at_ms = f64::INFINITY;
        assert!(scenario.validate().is_err());

        assert!(Scenario::from_toml("[[controls]]\nat_ms = -1.0\nop = \"stop_all\"\n").is_err());
    }

    #[test]
    fn test_unknown_ease_is_rejected() {
        let result = Scenario::from_toml(
            r#"
[channels]
x = 0.0

[[actions]]
node = { kind = "to", channel = "x", to = 1.0, ms = 10, ease = "wobble" }
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_round_trip_keeps_tree() {
        let scenario = Scenario::from_toml(SCENARIO).unwrap();
        let text = scenario.to_toml().unwrap();
        let again = Scenario::from_toml(&text).unwrap();
        assert_eq!(again.actions[0].node, scenario.actions[0].node);
    }
}
