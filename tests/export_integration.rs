//! Integration tests for run export and file-based inputs.

mod common;

use std::fs;
use std::path::Path;

use simbev::config::ScenarioConfig;
use simbev::io::{export, import};
use simbev::sim::analysis::RunSummary;
use simbev::sim::orchestrator::SimBev;

fn summary_of(output: &simbev::sim::orchestrator::SimulationOutput, lead: usize, hours: f64) -> RunSummary {
    RunSummary::from_results(
        &output.total,
        output.regions.iter().flat_map(|r| r.vehicles.iter().map(|v| &v.analysis)),
        output.regions.len(),
        0,
        lead,
        hours,
    )
}

#[test]
fn export_writes_every_output_file() {
    let tmp = tempfile::tempdir().unwrap();
    let clock = common::default_clock();
    let output = common::run_default(42, 2);
    let summary = summary_of(&output, clock.lead_steps(), clock.step_hours());
    let config = ScenarioConfig::demo();

    export::export_run_to(tmp.path(), &output, &config, &clock, &summary).unwrap();

    for file in ["metadata.json", "grid_total.csv", "analysis.csv"] {
        assert!(tmp.path().join(file).is_file(), "{file} missing");
    }
    let total = fs::read_to_string(tmp.path().join("grid_total.csv")).unwrap();
    assert_eq!(total.lines().count(), clock.reported_steps() + 1);

    let analysis = fs::read_to_string(tmp.path().join("analysis.csv")).unwrap();
    let vehicles: usize = output.regions.iter().map(|r| r.vehicles.len()).sum();
    assert_eq!(analysis.lines().count(), vehicles + 1);

    for region in &output.regions {
        let dir = tmp.path().join(&region.id);
        assert!(dir.join("grid.csv").is_file());
        for v in &region.vehicles {
            let path = dir.join(format!("{}_events.csv", v.name));
            let text = fs::read_to_string(&path).unwrap();
            assert_eq!(text.lines().count(), v.events.len() + 1);
        }
    }
}

#[test]
fn export_respects_output_switches() {
    let tmp = tempfile::tempdir().unwrap();
    let clock = common::default_clock();
    let output = common::run_default(42, 1);
    let summary = summary_of(&output, clock.lead_steps(), clock.step_hours());
    let mut config = ScenarioConfig::demo();
    config.output.vehicle_events = false;
    config.output.analysis = false;

    export::export_run_to(tmp.path(), &output, &config, &clock, &summary).unwrap();

    assert!(tmp.path().join("metadata.json").is_file());
    assert!(!tmp.path().join("analysis.csv").exists());
    let region_dir = tmp.path().join(&output.regions[0].id);
    let files: Vec<_> = fs::read_dir(&region_dir).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn city_scenario_loads_and_runs() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/city.toml");
    let config = ScenarioConfig::from_toml_file(&path).unwrap();
    assert!(config.validate().is_empty());
    let clock = config.clock().unwrap();
    let inputs = import::load_inputs(&config.inputs, &clock).unwrap();
    assert_eq!(inputs.car_types.len(), 3);
    assert_eq!(inputs.regions.len(), 2);

    let output = SimBev::new(config.params(), clock, inputs)
        .unwrap()
        .run_multi()
        .unwrap();
    assert_eq!(output.regions[0].id, "city_center");
    let vehicles: usize = output.regions.iter().map(|r| r.vehicles.len()).sum();
    assert_eq!(vehicles, 6 + 2 + 3 + 4 + 3 + 2);
}
