//! Agent-based simulation of electric-vehicle mobility and charging demand.
//!
//! Vehicles in each region follow sampled trip chains; their charging events
//! are aggregated into per-region and area-wide grid time series.

/// Command-line parsing.
pub mod cli;
/// TOML scenario configuration and presets.
pub mod config;
pub mod error;
/// CSV and JSON input/output.
pub mod io;
/// Built-in demo inputs.
pub mod presets;
/// Simulation core: clock, tables, vehicles, trips, regions, orchestration.
pub mod sim;
pub mod telemetry;
