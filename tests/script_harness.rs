use hearthbind::script_harness::{load_fixture, run_fixture, HarnessOutput};
use hearthbind::ScriptValue;

const LEVER: &str = "tests/fixtures/script_harness/lever.json";

fn lever_output() -> HarnessOutput {
    let fixture = load_fixture(LEVER).expect("load fixture");
    run_fixture(&fixture).expect("run fixture")
}

#[test]
fn lever_fixture_registers_its_entry_point() {
    let output = lever_output();
    assert_eq!(output.entry_points.get("actions/lever.rhai:onUse"), Some(&1000));
    assert!(output.load_diagnostics.is_empty(), "{:?}", output.load_diagnostics);
}

#[test]
fn lever_use_transforms_and_queues_a_reset() {
    let output = lever_output();
    let pull = &output.results[0];
    assert_eq!(pull.result, Some(ScriptValue::Int(1)));
    assert!(pull.diagnostics.is_empty(), "{:?}", pull.diagnostics);
    assert_eq!(pull.events[0], "transformed item 1945 into 1946");
    assert!(pull.events[1].contains("The lever creaks."), "{:?}", pull.events);

    assert_eq!(output.results[1].timers_run, 0);
    let reset = &output.results[2];
    assert_eq!(reset.timers_run, 1);
    assert_eq!(reset.events, vec!["transformed item 1946 into 1945".to_string()]);
}

#[test]
fn using_nothing_reports_and_recovers() {
    let output = lever_output();
    let miss = &output.results[3];
    assert_eq!(miss.result, Some(ScriptValue::Int(0)));
    assert!(miss.events.is_empty(), "{:?}", miss.events);
    assert_eq!(miss.diagnostics.len(), 1);
    let report = &miss.diagnostics[0];
    assert!(report.starts_with("Script error: [actions]\nlever.rhai:onUse\nuse empty tile\n"), "{report}");
    assert!(report.contains("doTransformItem(). "), "{report}");
}

#[test]
fn lever_fixture_is_stable_across_runs() {
    let fixture = load_fixture(LEVER).expect("load fixture");
    let first = run_fixture(&fixture).expect("run fixture first time");
    let second = run_fixture(&fixture).expect("run fixture second time");
    assert_eq!(first, second, "fixture should produce identical output across runs");
}

#[test]
fn output_serializes_for_golden_files() {
    let output = lever_output();
    let json = serde_json::to_string_pretty(&output).expect("serialize output");
    let back: HarnessOutput = serde_json::from_str(&json).expect("parse output");
    assert_eq!(back, output);
}
