//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use simbev::presets;
use simbev::sim::clock::SimClock;
use simbev::sim::orchestrator::{SimBev, SimulationInputs, SimulationOutput};
use simbev::sim::types::SimParams;

/// Two reported days at 15-minute resolution.
pub fn default_clock() -> SimClock {
    presets::demo_clock(2).unwrap()
}

/// Default parameters with the given seed and worker count.
pub fn default_params(seed: u64, threads: usize) -> SimParams {
    SimParams {
        seed,
        num_threads: threads,
        ..SimParams::default()
    }
}

/// Demo inputs for `clock`.
pub fn default_inputs(clock: &SimClock) -> SimulationInputs {
    presets::demo_inputs(clock).unwrap()
}

/// Builds a simulator over the demo inputs.
pub fn build_sim(params: SimParams) -> SimBev {
    let clock = default_clock();
    let inputs = default_inputs(&clock);
    SimBev::new(params, clock, inputs).unwrap()
}

/// Runs the demo inputs with the given seed and worker count.
pub fn run_default(seed: u64, threads: usize) -> SimulationOutput {
    build_sim(default_params(seed, threads)).run_multi().unwrap()
}
