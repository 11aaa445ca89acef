/// Per-vehicle statistics and run summary.
pub mod analysis;
/// Charging-curve solver.
pub mod charging;
/// Time-step arithmetic and the lead week.
pub mod clock;
pub mod location;
/// Multi-region orchestration over a worker pool.
pub mod orchestrator;
pub mod probability;
/// High-power-charging range recovery.
pub mod recovery;
pub mod region;
/// Trip sampling and execution.
pub mod trip;
pub mod types;
pub mod vehicle;
