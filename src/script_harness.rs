//! Fixture-driven runs of script hosts against a [`SimWorld`], producing comparable JSON output.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::bridge::Bridge;
use crate::diagnostics::DiagnosticLog;
use crate::env::{EventId, ScriptEnv};
use crate::marshal::{ScriptValue, ThingDescriptor};
use crate::scheduler::ManualClock;
use crate::sim::{SimWorld, WorldSpec};
use crate::world::{GameWorld, Position, StackSelector, ThingView};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessFixture {
    #[serde(default)]
    pub world: WorldSpec,
    #[serde(default = "default_start_ms")]
    pub start_ms: u64,
    pub hosts: Vec<FixtureHost>,
    #[serde(default)]
    pub steps: Vec<FixtureStep>,
}

fn default_start_ms() -> u64 {
    0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureHost {
    pub name: String,
    #[serde(default)]
    pub bootstrap: Option<String>,
    #[serde(default)]
    pub scripts: Vec<FixtureScript>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureScript {
    pub file: String,
    pub source: String,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixtureStep {
    /// Calls the entry point labelled `event` (`file:function`).
    Call {
        host: String,
        event: String,
        #[serde(default)]
        desc: String,
        #[serde(default)]
        at: Option<Position>,
        #[serde(default)]
        args: Vec<FixtureArg>,
    },
    /// Moves the clock forward and runs due timers.
    Advance { ms: u64 },
}

/// Arguments are plain values, or objects looked up and handed to the script as handles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FixtureArg {
    Player { player: String },
    Thing {
        thing_at: Position,
        #[serde(default)]
        stackpos: u32,
    },
    Value(ScriptValue),
}

impl FixtureArg {
    fn resolve(&self, env: &mut ScriptEnv, world: &dyn GameWorld) -> ScriptValue {
        match self {
            FixtureArg::Value(value) => value.clone(),
            FixtureArg::Player { player } => world
                .player_by_name(player)
                .map_or(ScriptValue::Int(0), |key| ScriptValue::from(env.assign(world, key))),
            FixtureArg::Thing { thing_at, stackpos } => {
                let descriptor = world
                    .thing_at(*thing_at, StackSelector::from_stackpos(*stackpos))
                    .and_then(|key| world.thing(key).map(|view| (env.assign(world, key), view)))
                    .map_or(ThingDescriptor::EMPTY, |(uid, view)| match view {
                        ThingView::Creature(creature) => ThingDescriptor::for_creature(uid, &creature),
                        ThingView::Item(item) => ThingDescriptor::for_item(uid, &item),
                    });
                descriptor.to_value()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessOutput {
    pub entry_points: BTreeMap<String, EventId>,
    /// Reports raised while loading, before the first step.
    pub load_diagnostics: Vec<String>,
    pub results: Vec<StepResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub step: usize,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScriptValue>,
    #[serde(default)]
    pub timers_run: usize,
    #[serde(default)]
    pub diagnostics: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

pub fn run_fixture(fixture: &HarnessFixture) -> Result<HarnessOutput> {
    let world = SimWorld::from_spec(&fixture.world).map_err(|err| anyhow!("building fixture world: {err}"))?;
    let clock = ManualClock::new(fixture.start_ms);
    let mut bridge = Bridge::new(world, Arc::new(clock.clone()), DiagnosticLog::default());

    let mut entry_points = BTreeMap::new();
    let mut ids: BTreeMap<(String, String), EventId> = BTreeMap::new();
    for spec in &fixture.hosts {
        let host = bridge.add_host(&spec.name);
        if let Some(source) = &spec.bootstrap {
            host.init("global.rhai", source);
        }
        for script in &spec.scripts {
            if host.load(&script.file, &script.source).is_err() {
                continue;
            }
            for event in &script.events {
                let Some(id) = host.register_entry_point(event) else {
                    bail!("{} does not define {event}", script.file);
                };
                let label = host.label(id);
                entry_points.insert(format!("{}/{label}", spec.name), id);
                ids.insert((spec.name.clone(), label), id);
            }
        }
    }
    let load_diagnostics = drain_diagnostics(&bridge)?;
    bridge.world_mut().drain_events();

    let mut results = Vec::with_capacity(fixture.steps.len());
    for (step, action) in fixture.steps.iter().enumerate() {
        let mut outcome = match action {
            FixtureStep::Call { host, event, desc, at, args } => {
                let id = *ids
                    .get(&(host.clone(), event.clone()))
                    .ok_or_else(|| anyhow!("step {step}: no entry point {event} in host {host}"))?;
                let script_host = bridge.host(host).ok_or_else(|| anyhow!("step {step}: unknown host {host}"))?;
                let result = script_host
                    .call_event(id, desc, |env, world| {
                        if let Some(pos) = at {
                            env.set_real_pos(*pos);
                        }
                        args.iter().map(|arg| arg.resolve(env, world)).collect()
                    })
                    .ok();
                StepResult {
                    step,
                    action: format!("call {host}/{event}"),
                    result,
                    timers_run: 0,
                    diagnostics: Vec::new(),
                    events: Vec::new(),
                }
            }
            FixtureStep::Advance { ms } => {
                clock.advance(*ms);
                let timers_run = bridge.tick();
                StepResult {
                    step,
                    action: format!("advance {ms}"),
                    result: None,
                    timers_run,
                    diagnostics: Vec::new(),
                    events: Vec::new(),
                }
            }
        };
        outcome.diagnostics = drain_diagnostics(&bridge)?;
        outcome.events = bridge.world_mut().drain_events().iter().map(ToString::to_string).collect();
        results.push(outcome);
    }

    Ok(HarnessOutput { entry_points, load_diagnostics, results })
}

fn drain_diagnostics(bridge: &Bridge<SimWorld>) -> Result<Vec<String>> {
    let mut env = bridge.env().borrow_mut().map_err(|err| anyhow!("{err}"))?;
    Ok(env.diagnostics_mut().drain())
}

pub fn load_fixture<P: AsRef<Path>>(path: P) -> Result<HarnessFixture> {
    let file = File::open(path.as_ref()).with_context(|| format!("opening fixture '{}'", path.as_ref().display()))?;
    serde_json::from_reader(file).with_context(|| "parsing fixture JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{FloorSpec, PlayerSpec};

    fn fixture(source: &str, steps: Vec<FixtureStep>) -> HarnessFixture {
        let mut world = WorldSpec::default();
        world.floors.push(FloorSpec { from: Position::new(100, 100, 7), to: Position::new(104, 104, 7) });
        world.players.push(PlayerSpec::named("Alice", Position::new(100, 100, 7)));
        HarnessFixture {
            world,
            start_ms: 0,
            hosts: vec![FixtureHost {
                name: "actions".into(),
                bootstrap: None,
                scripts: vec![FixtureScript {
                    file: "greet.rhai".into(),
                    source: source.into(),
                    events: vec!["onUse".into()],
                }],
            }],
            steps,
        }
    }

    fn call(args: Vec<FixtureArg>) -> FixtureStep {
        FixtureStep::Call {
            host: "actions".into(),
            event: "greet.rhai:onUse".into(),
            desc: "use".into(),
            at: None,
            args,
        }
    }

    #[test]
    fn call_steps_record_results_and_world_events() {
        let source = r#"fn onUse(cid) { doPlayerSendTextMessage(cid, 22, "Hello " + getPlayerName(cid)); 1 }"#;
        let output = run_fixture(&fixture(source, vec![call(vec![FixtureArg::Player { player: "Alice".into() }])])).unwrap();
        assert_eq!(output.entry_points.get("actions/greet.rhai:onUse"), Some(&1000));
        let step = &output.results[0];
        assert_eq!(step.result, Some(ScriptValue::Int(1)));
        assert!(step.diagnostics.is_empty(), "{:?}", step.diagnostics);
        assert_eq!(step.events.len(), 1);
        assert!(step.events[0].contains("Hello Alice"), "{:?}", step.events);
    }

    #[test]
    fn advance_runs_queued_timers() {
        let source = r#"
            fn onUse(cid) { addEvent("later", 250, cid); 0 }
            fn later(cid) { doPlayerSendCancel(cid, "Too late."); }
        "#;
        let steps = vec![
            call(vec![FixtureArg::Player { player: "Alice".into() }]),
            FixtureStep::Advance { ms: 100 },
            FixtureStep::Advance { ms: 200 },
        ];
        let output = run_fixture(&fixture(source, steps)).unwrap();
        assert_eq!(output.results[1].timers_run, 0);
        assert_eq!(output.results[2].timers_run, 1);
        assert!(output.results[2].events[0].contains("Too late."));
    }

    #[test]
    fn unknown_event_is_an_error() {
        let mut bad = fixture("fn onUse() { 0 }", Vec::new());
        bad.hosts[0].scripts[0].events.push("onStepIn".into());
        assert!(run_fixture(&bad).is_err());
    }

    #[test]
    fn fixture_args_deserialize_untagged() {
        let args: Vec<FixtureArg> =
            serde_json::from_str(r#"[{ "player": "Alice" }, 5, { "thing_at": { "x": 1, "y": 2, "z": 7 } }]"#).unwrap();
        assert_eq!(args[0], FixtureArg::Player { player: "Alice".into() });
        assert_eq!(args[1], FixtureArg::Value(ScriptValue::Int(5)));
        assert!(matches!(args[2], FixtureArg::Thing { stackpos: 0, .. }));
    }
}
