//! simbev entry point: CLI, scenario, inputs, run, export.

use std::process;

use tracing::{info, warn};

use simbev::cli::{self, CliOptions};
use simbev::config::ScenarioConfig;
use simbev::error::SimError;
use simbev::io::{export, import};
use simbev::presets;
use simbev::sim::analysis::RunSummary;
use simbev::sim::orchestrator::SimBev;
use simbev::telemetry::init_tracing;

/// Loads the scenario and applies CLI overrides.
fn load_scenario(opts: &CliOptions) -> Result<ScenarioConfig, SimError> {
    let mut scenario = match (&opts.scenario, &opts.preset) {
        (Some(path), _) => ScenarioConfig::from_toml_file(path)?,
        (None, Some(name)) => ScenarioConfig::from_preset(name)?,
        (None, None) => ScenarioConfig::demo(),
    };
    if let Some(seed) = opts.seed {
        scenario.simulation.seed = seed;
    }
    if let Some(threads) = opts.threads {
        scenario.simulation.num_threads = threads;
    }
    if let Some(ref dir) = opts.output {
        scenario.output.directory = dir.clone();
    }
    Ok(scenario)
}

fn run(scenario: &ScenarioConfig) -> Result<(), SimError> {
    let clock = scenario.clock()?;
    let inputs = if scenario.inputs.is_configured() {
        import::load_inputs(&scenario.inputs, &clock)?
    } else {
        info!("no input tables configured, using built-in demo inputs");
        presets::demo_inputs(&clock)?
    };

    let sim = SimBev::new(scenario.params(), clock.clone(), inputs)?;
    let output = sim.run_multi()?;

    let fallbacks: usize = output.regions.iter().map(|r| r.fallbacks()).sum();
    if fallbacks > 0 {
        warn!(fallbacks, "vehicles re-run with public charging");
    }
    let summary = RunSummary::from_results(
        &output.total,
        output
            .regions
            .iter()
            .flat_map(|r| r.vehicles.iter().map(|v| &v.analysis)),
        output.regions.len(),
        fallbacks,
        clock.lead_steps(),
        clock.step_hours(),
    );

    let dir = export::export_run(&output, scenario, &clock, &summary)?;
    println!("{summary}");
    eprintln!("Results written to {}", dir.display());
    Ok(())
}

fn main() {
    init_tracing();

    let opts = match cli::parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("error: {e}");
            cli::print_usage();
            process::exit(1);
        }
    };
    if opts.help {
        cli::print_usage();
        return;
    }

    let scenario = match load_scenario(&opts) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    if let Err(e) = run(&scenario) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
