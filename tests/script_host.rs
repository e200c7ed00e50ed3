use std::fs;
use std::path::Path;
use std::sync::Arc;

use hearthbind::config::{BridgeConfig, InterfaceConfig, ScriptEntryConfig};
use hearthbind::scheduler::ManualClock;
use hearthbind::sim::{ItemSpec, PlayerSpec, SimWorld};
use hearthbind::world::{ObjectDirectory, Position};
use hearthbind::{Bridge, ScriptError, ScriptValue};

fn write_script(dir: &Path, name: &str, source: &str) {
    fs::write(dir.join(name), source).expect("write script");
}

fn world() -> SimWorld {
    let mut world = SimWorld::new(3);
    world.add_tiles(Position::new(100, 100, 7), 3, 3);
    let mut alice = PlayerSpec::named("Alice", Position::new(100, 100, 7));
    alice.level = 8;
    world.spawn_player(alice);
    world
}

fn interface(name: &str, scripts: &[(&str, &[&str])]) -> InterfaceConfig {
    InterfaceConfig {
        name: name.to_string(),
        scripts: scripts
            .iter()
            .map(|(file, events)| ScriptEntryConfig {
                file: file.to_string(),
                events: events.iter().map(|event| event.to_string()).collect(),
            })
            .collect(),
    }
}

#[test]
fn bridge_from_config_loads_bootstrap_and_registers_events() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_script(dir.path(), "global.rhai", "fn double(x) { x * 2 }");
    write_script(
        dir.path(),
        "doors.rhai",
        "fn onUse(cid) { setGlobalStorageValue(1, double(getPlayerLevel(cid))); 1 }",
    );
    write_script(dir.path(), "broken.rhai", "fn onUse( {");

    let config = BridgeConfig {
        data_dir: dir.path().to_path_buf(),
        interfaces: vec![interface("actions", &[("doors.rhai", &["onUse", "onMissing"]), ("broken.rhai", &["onUse"])])],
        ..BridgeConfig::default()
    };
    let (bridge, registered) =
        Bridge::from_config(&config, world(), Arc::new(ManualClock::new(0))).expect("bridge builds");

    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].event, "onUse");
    assert_eq!(registered[0].file, "doors.rhai");

    let host = bridge.host("actions").expect("actions host");
    assert_eq!(host.label(registered[0].id), "doors.rhai:onUse");
    let result = host
        .call_event(registered[0].id, "use", |env, world| {
            let alice = world.player_by_name("Alice").expect("alice exists");
            vec![ScriptValue::from(env.assign(world, alice))]
        })
        .expect("onUse runs");
    assert_eq!(result, ScriptValue::Int(1));
    assert_eq!(bridge.env().with(|env| env.global_storage(1)).unwrap(), Some(16));

    let reports: Vec<String> = bridge.env().with(|env| env.diagnostics().entries().map(str::to_string).collect()).unwrap();
    assert!(reports.iter().any(|report| report.contains("broken.rhai")), "{reports:?}");
}

#[test]
fn hosts_keep_separate_function_tables() {
    let mut bridge = Bridge::new(world(), Arc::new(ManualClock::new(0)), Default::default());
    let actions = bridge.add_host("actions");
    actions.load("a.rhai", "fn onUse() { 1 }").expect("load a");
    let from_actions = actions.register_entry_point("onUse").expect("onUse in actions");

    let talk = bridge.add_host("talkactions");
    assert!(talk.register_entry_point("onUse").is_none(), "talkactions never loaded onUse");
    talk.load("b.rhai", "fn onSay() { 2 }").expect("load b");
    let from_talk = talk.register_entry_point("onSay").expect("onSay in talkactions");

    assert_eq!(from_actions, 1000);
    assert_eq!(from_talk, 1000, "event ids are allocated per host");
    let talk = bridge.host("talkactions").expect("talk host");
    assert_eq!(talk.call_event(from_talk, "say", |_, _| Vec::new()).unwrap(), ScriptValue::Int(2));
}

#[test]
fn later_units_shadow_earlier_globals() {
    let mut bridge = Bridge::new(world(), Arc::new(ManualClock::new(0)), Default::default());
    let host = bridge.add_host("actions");
    host.load("first.rhai", "fn onUse() { 1 }").expect("load first");
    host.load("second.rhai", "fn onUse() { 2 }").expect("load second");
    let id = host.register_entry_point("onUse").expect("onUse registered");
    assert_eq!(host.label(id), "second.rhai:onUse");
    assert_eq!(host.invoke(id, Vec::new()).unwrap(), ScriptValue::Int(2));
    assert!(host.register_entry_point("onUse").is_none(), "registration consumes the global");
}

#[test]
fn runtime_errors_are_reported_and_returned() {
    let mut bridge = Bridge::new(world(), Arc::new(ManualClock::new(0)), Default::default());
    let host = bridge.add_host("actions");
    host.load("oops.rhai", r#"fn onUse() { throw "boom"; }"#).expect("load oops");
    let id = host.register_entry_point("onUse").expect("registered");

    let err = host.call_event(id, "use", |_, _| Vec::new()).unwrap_err();
    assert!(matches!(err, ScriptError::Runtime(_)));
    let last = bridge.env().with(|env| env.diagnostics().last().map(str::to_string)).unwrap().expect("reported");
    assert!(last.starts_with("Script error: [actions]\noops.rhai:onUse\nuse\n"), "{last}");
    assert!(last.contains("boom"), "{last}");
}

#[test]
fn tagged_map_items_resolve_on_a_fresh_bridge() {
    let mut world = world();
    world
        .place_item_with(Position::new(102, 100, 7), &ItemSpec::new(1945).unique(5000))
        .expect("place lever");
    let mut bridge = Bridge::new(world, Arc::new(ManualClock::new(0)), Default::default());
    let host = bridge.add_host("actions");
    host.load("tags.rhai", "fn onThink() { getThing(5000).itemid }").expect("load");
    let id = host.register_entry_point("onThink").expect("registered");

    assert_eq!(host.call_event(id, "think", |_, _| Vec::new()).unwrap(), ScriptValue::Int(1945));
    assert!(bridge.env().with(|env| env.diagnostics().is_empty()).unwrap());
}
