//! TOML-based scenario configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::sim::clock::SimClock;
use crate::sim::types::{
    Attractiveness, HpcParams, PublicChargingParams, SimParams, TripLimits, UserGroupParams,
};

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the demo scenario. Load from TOML with
/// [`ScenarioConfig::from_toml_file`] or use [`ScenarioConfig::demo`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Horizon, seed and fleet-wide parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Floors for sampled trips.
    #[serde(default)]
    pub trip: TripLimits,
    /// Slow public charging probability ramp.
    #[serde(default)]
    pub charging: PublicChargingParams,
    /// High-power charging behaviour.
    #[serde(default)]
    pub hpc: HpcParams,
    /// Private access shares and group attractiveness.
    #[serde(default)]
    pub user_groups: UserGroupParams,
    #[serde(default)]
    pub scaling: ScalingConfig,
    /// Input tables; the built-in demo inputs are used when absent.
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Horizon, seed and fleet-wide parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// First reported day, e.g. `"2024-01-08"`.
    pub start_date: NaiveDate,
    /// Last reported day (inclusive).
    pub end_date: NaiveDate,
    /// Step length in minutes; must divide a day.
    pub step_size: u32,
    /// Master random seed.
    pub seed: u64,
    /// Worker threads for parallel regions.
    pub num_threads: usize,
    /// SoC every vehicle starts with.
    pub initial_soc: f64,
    /// Restrict vehicles to home and work charging.
    pub private_only: bool,
    /// Keep per-vehicle event logs for export.
    pub keep_event_logs: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let start = crate::presets::demo_start();
        Self {
            start_date: start,
            end_date: start,
            step_size: 15,
            seed: 42,
            num_threads: 1,
            initial_soc: 0.8,
            private_only: false,
            keep_event_logs: true,
        }
    }
}

/// Fleet sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScalingConfig {
    /// Share of each region's real fleet that is simulated (0.0, 1.0].
    pub sample_share: f64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self { sample_share: 1.0 }
    }
}

/// Paths of the input tables. Either all or none must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputsConfig {
    /// Car-type technical data CSV.
    pub tech_data: Option<PathBuf>,
    /// Region list CSV with vehicle counts per car type.
    pub regions: Option<PathBuf>,
    /// Directory holding one subdirectory of tables per region type.
    pub region_types: Option<PathBuf>,
}

impl InputsConfig {
    pub fn is_configured(&self) -> bool {
        self.tech_data.is_some() || self.regions.is_some() || self.region_types.is_some()
    }
}

/// What to write and where.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Parent directory of run directories.
    pub directory: PathBuf,
    /// Run directory prefix; a timestamp is appended.
    pub name: String,
    /// Write one event CSV per vehicle.
    pub vehicle_events: bool,
    /// Write one grid CSV per region plus the total.
    pub grid_timeseries: bool,
    /// Write the per-vehicle analysis CSV.
    pub analysis: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("results"),
            name: "simbev_run".to_string(),
            vehicle_events: true,
            grid_timeseries: true,
            analysis: true,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.step_size"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for SimError {
    fn from(e: ConfigError) -> Self {
        SimError::Config(format!("{}: {}", e.field, e.message))
    }
}

fn check(errors: &mut Vec<ConfigError>, ok: bool, field: &str, message: &str) {
    if !ok {
        errors.push(ConfigError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }
}

fn unit(v: f64) -> bool {
    (0.0..=1.0).contains(&v)
}

impl ScenarioConfig {
    /// One reported week of the built-in demo fleet.
    pub fn demo() -> Self {
        let start = crate::presets::demo_start();
        Self {
            simulation: SimulationConfig {
                end_date: start + chrono::Days::new(6),
                ..SimulationConfig::default()
            },
            ..Self::default()
        }
    }

    /// Demo fleet restricted to private charging.
    pub fn private_only() -> Self {
        let mut cfg = Self::demo();
        cfg.simulation.private_only = true;
        cfg
    }

    /// Demo fleet with users who readily fast charge.
    pub fn fast_charging() -> Self {
        let mut cfg = Self::demo();
        cfg.hpc = HpcParams {
            start_threshold_soc: 0.7,
            park_time_max_minutes: 120.0,
            ..HpcParams::default()
        };
        let eager = Attractiveness {
            urban_fast: 0.95,
            ..Attractiveness::default()
        };
        cfg.user_groups.c = eager.clone();
        cfg.user_groups.d = eager;
        cfg
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["demo", "private_only", "fast_charging"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "demo" => Ok(Self::demo()),
            "private_only" => Ok(Self::private_only()),
            "fast_charging" => Ok(Self::fast_charging()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// Relative input paths are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "scenario".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        let mut cfg = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            for p in [
                &mut cfg.inputs.tech_data,
                &mut cfg.inputs.regions,
                &mut cfg.inputs.region_types,
            ]
            .into_iter()
            .flatten()
            {
                if p.is_relative() {
                    *p = base.join(&*p);
                }
            }
        }
        Ok(cfg)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let e = &mut errors;

        let s = &self.simulation;
        check(
            e,
            s.step_size > 0 && 1440 % s.step_size == 0,
            "simulation.step_size",
            "must divide 1440 minutes",
        );
        check(e, s.end_date >= s.start_date, "simulation.end_date", "must not precede simulation.start_date");
        check(e, s.num_threads > 0, "simulation.num_threads", "must be > 0");
        check(e, unit(s.initial_soc), "simulation.initial_soc", "must be in [0.0, 1.0]");

        let t = &self.trip;
        check(e, t.min_distance_km >= 0.0, "trip.min_distance_km", "must be >= 0");
        check(e, t.min_speed_kmh > 0.0, "trip.min_speed_kmh", "must be > 0");
        check(e, t.max_drive_hours > 0.0, "trip.max_drive_hours", "must be > 0");

        let c = &self.charging;
        check(
            e,
            unit(c.lower_soc) && unit(c.upper_soc) && c.lower_soc < c.upper_soc,
            "charging.lower_soc",
            "must satisfy 0 <= lower_soc < upper_soc <= 1",
        );

        let h = &self.hpc;
        check(
            e,
            h.soc_target_min > 0.0 && h.soc_target_min <= h.soc_target_max && h.soc_target_max <= 1.0,
            "hpc.soc_target_min",
            "must satisfy 0 < soc_target_min <= soc_target_max <= 1",
        );
        check(e, unit(h.start_threshold_soc), "hpc.start_threshold_soc", "must be in [0.0, 1.0]");
        check(e, h.park_time_max_minutes >= 0.0, "hpc.park_time_max_minutes", "must be >= 0");
        check(e, h.distance_limit_km > 0.0, "hpc.distance_limit_km", "must be > 0");
        check(
            e,
            h.leg_fraction_min > 0.0 && h.leg_fraction_min <= h.leg_fraction_max && h.leg_fraction_max <= 1.0,
            "hpc.leg_fraction_min",
            "must satisfy 0 < leg_fraction_min <= leg_fraction_max <= 1",
        );

        let g = &self.user_groups;
        check(e, unit(g.home_private), "user_groups.home_private", "must be in [0.0, 1.0]");
        check(e, unit(g.work_private), "user_groups.work_private", "must be in [0.0, 1.0]");
        for (name, a) in [("a", &g.a), ("b", &g.b), ("c", &g.c), ("d", &g.d)] {
            check(
                e,
                a.values().into_iter().all(unit),
                &format!("user_groups.{name}"),
                "attractiveness values must be in [0.0, 1.0]",
            );
        }

        let share = self.scaling.sample_share;
        check(e, share > 0.0 && share <= 1.0, "scaling.sample_share", "must be in (0.0, 1.0]");

        let i = &self.inputs;
        check(
            e,
            !i.is_configured() || (i.tech_data.is_some() && i.regions.is_some() && i.region_types.is_some()),
            "inputs",
            "tech_data, regions and region_types must be set together",
        );

        errors
    }

    /// Builds the simulation clock.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] for an invalid step size or date range.
    pub fn clock(&self) -> Result<SimClock, SimError> {
        SimClock::new(
            self.simulation.start_date,
            self.simulation.end_date,
            self.simulation.step_size,
        )
    }

    /// Run parameters for the simulation core.
    pub fn params(&self) -> SimParams {
        SimParams {
            seed: self.simulation.seed,
            num_threads: self.simulation.num_threads,
            initial_soc: self.simulation.initial_soc,
            private_only: self.simulation.private_only,
            sample_share: self.scaling.sample_share,
            keep_event_logs: self.simulation.keep_event_logs && self.output.vehicle_events,
            trip: self.trip.clone(),
            public: self.charging.clone(),
            hpc: self.hpc.clone(),
            user_groups: self.user_groups.clone(),
        }
    }
}
