//! Owns the shared environment, the world, the timer queue and one script host per interface,
//! and drives deferred script callbacks from the simulation tick.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::bindings::TimerQueue;
use crate::config::BridgeConfig;
use crate::diagnostics::DiagnosticLog;
use crate::env::{EnvHandle, EventId, ScriptEnv};
use crate::error::{NotFoundKind, ScriptError, ScriptResult};
use crate::host::{ScriptHost, WorldHandle};
use crate::marshal::ScriptValue;
use crate::scheduler::{Clock, Scheduler};
use crate::world::GameWorld;

/// An event entry point registered while building a bridge from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredEvent {
    pub interface: String,
    pub file: String,
    pub event: String,
    pub id: EventId,
}

pub struct Bridge<W: GameWorld + 'static> {
    env: EnvHandle,
    world: Rc<RefCell<W>>,
    timers: TimerQueue,
    hosts: BTreeMap<String, ScriptHost>,
}

impl<W: GameWorld + 'static> std::fmt::Debug for Bridge<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge").field("hosts", &self.hosts.keys().collect::<Vec<_>>()).field("timers", &self.timers).finish()
    }
}

impl<W: GameWorld + 'static> Bridge<W> {
    /// Tagged items already on the map are registered before any script runs.
    pub fn new(world: W, clock: Arc<dyn Clock>, diagnostics: DiagnosticLog) -> Self {
        let mut env = ScriptEnv::new(diagnostics);
        let tagged = env.register_tagged_items(&world);
        tracing::debug!(target: "bridge", tagged, "registered tagged map items");
        Self {
            env: EnvHandle::new(env),
            world: Rc::new(RefCell::new(world)),
            timers: Scheduler::new(clock),
            hosts: BTreeMap::new(),
        }
    }

    /// Builds one host per configured interface: the bootstrap runs first, then each file loads
    /// and its events are registered. Files or events that fail are reported and skipped.
    pub fn from_config(config: &BridgeConfig, world: W, clock: Arc<dyn Clock>) -> Result<(Self, Vec<RegisteredEvent>)> {
        let mut bridge = Self::new(world, clock, DiagnosticLog::with_capacity(config.diagnostic_capacity));
        let mut registered = Vec::new();
        for interface in &config.interfaces {
            let host = bridge.add_host(&interface.name);
            let bootstrap = config.bootstrap_path();
            if bootstrap.is_file() {
                host.init_file(&bootstrap);
            } else {
                tracing::warn!(target: "bridge", interface = %interface.name, "bootstrap {} not found", bootstrap.display());
            }
            for entry in &interface.scripts {
                if host.load_file(config.script_path(entry)).is_err() {
                    continue;
                }
                for event in &entry.events {
                    match host.register_entry_point(event) {
                        Some(id) => registered.push(RegisteredEvent {
                            interface: interface.name.clone(),
                            file: entry.file.clone(),
                            event: event.clone(),
                            id,
                        }),
                        None => tracing::warn!(
                            target: "bridge",
                            interface = %interface.name,
                            "event {event} not found in {}",
                            entry.file
                        ),
                    }
                }
            }
            tracing::info!(target: "bridge", interface = %interface.name, units = host.unit_count(), "script host ready");
        }
        Ok((bridge, registered))
    }

    /// Adds a host, or returns the existing one with that name.
    pub fn add_host(&mut self, name: &str) -> &mut ScriptHost {
        let env = self.env.clone();
        let world: WorldHandle = self.world.clone();
        let timers = self.timers.clone();
        self.hosts.entry(name.to_string()).or_insert_with(|| ScriptHost::new(name, env, world, timers))
    }

    pub fn host(&self, name: &str) -> Option<&ScriptHost> {
        self.hosts.get(name)
    }

    pub fn host_mut(&mut self, name: &str) -> Option<&mut ScriptHost> {
        self.hosts.get_mut(name)
    }

    pub fn env(&self) -> &EnvHandle {
        &self.env
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    pub fn world(&self) -> Ref<'_, W> {
        self.world.borrow()
    }

    pub fn world_mut(&self) -> RefMut<'_, W> {
        self.world.borrow_mut()
    }

    /// Runs every timer due at the clock's current time.
    pub fn tick(&mut self) -> usize {
        let now = self.timers.now();
        self.tick_at(now)
    }

    /// Runs every timer due at or before `now`, earliest first. The queue lock is released before
    /// any script runs, so callbacks may queue further timers.
    pub fn tick_at(&mut self, now: u64) -> usize {
        let due = self.timers.pop_ready(now);
        let count = due.len();
        for task in due {
            let timer = task.payload;
            match self.hosts.get(&timer.host) {
                Some(host) => {
                    if let Err(err) = host.run_timer(&timer) {
                        tracing::debug!(target: "scheduler", task = task.id, "timer {} failed: {err}", timer.function);
                    }
                }
                None => tracing::warn!(target: "scheduler", task = task.id, host = %timer.host, "timer for unknown script host dropped"),
            }
        }
        count
    }

    /// Runs the script callback attached to a combat descriptor in the host that registered it.
    pub fn run_combat_callback(&self, combat_id: u32, args: Vec<ScriptValue>) -> ScriptResult<ScriptValue> {
        let callback = self
            .env
            .with(|env| env.combat(combat_id).map(|combat| combat.callback.clone()))?
            .ok_or(ScriptError::NotFound(NotFoundKind::Combat))?
            .ok_or_else(|| ScriptError::invalid(format!("combat {combat_id} has no callback")))?;
        let host = self
            .hosts
            .get(&callback.host)
            .ok_or_else(|| ScriptError::interface(format!("unknown script host {}", callback.host)))?;
        host.call_callback(callback.event, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualClock;
    use crate::sim::SimWorld;

    fn bridge() -> (Bridge<SimWorld>, ManualClock) {
        let clock = ManualClock::new(0);
        (Bridge::new(SimWorld::new(1), Arc::new(clock.clone()), DiagnosticLog::default()), clock)
    }

    #[test]
    fn timers_run_in_the_host_that_queued_them() {
        let (mut bridge, clock) = bridge();
        let host = bridge.add_host("actions");
        host.load(
            "timer.rhai",
            r#"
                fn onUse() { addEvent("later", 100, 7); 1 }
                fn later(value) { setGlobalStorageValue(9, value); }
            "#,
        )
        .unwrap();
        let id = host.register_entry_point("onUse").unwrap();
        host.call_event(id, "use", |_, _| Vec::new()).unwrap();

        assert_eq!(bridge.tick(), 0);
        clock.advance(100);
        assert_eq!(bridge.tick(), 1);
        assert_eq!(bridge.env().with(|env| env.global_storage(9)).unwrap(), Some(7));
        assert!(bridge.timers().is_empty());
    }

    #[test]
    fn timers_for_missing_hosts_are_dropped() {
        let (mut bridge, _) = bridge();
        bridge.timers().schedule(
            0,
            crate::bindings::ScriptTimer { host: "ghost".into(), unit: 1000, function: "x".into(), args: Vec::new() },
        );
        assert_eq!(bridge.tick(), 1);
        assert!(bridge.timers().is_empty());
    }

    #[test]
    fn combat_callback_runs_in_registering_host() {
        let (mut bridge, _) = bridge();
        bridge
            .add_host("spells")
            .load(
                "fire.rhai",
                r#"
                    let combat = createCombatObject(8);
                    setCombatCallback(combat, 1, "onGetFormulaValues");
                    fn onGetFormulaValues(cid, level, mag) { -(level * 2 + mag) }
                "#,
            )
            .unwrap();
        let value = bridge
            .run_combat_callback(1, vec![ScriptValue::Int(0), ScriptValue::Int(10), ScriptValue::Int(3)])
            .unwrap();
        assert_eq!(value, ScriptValue::Int(-23));
        assert!(matches!(bridge.run_combat_callback(2, vec![]), Err(ScriptError::NotFound(NotFoundKind::Combat))));
    }
}
