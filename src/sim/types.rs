//! Run parameters shared by the trip model, charging decisions and recovery.
//!
//! The section structs double as TOML sections of the scenario file, so each
//! carries serde defaults matching the reference behaviour.

use serde::{Deserialize, Serialize};

use super::location::UseCase;

/// Floors applied when drawing trip distance and speed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TripLimits {
    /// Shortest trip distance accepted from the distance table (km).
    pub min_distance_km: f64,
    /// Slowest average speed accepted from the speed table (km/h).
    pub min_speed_kmh: f64,
    /// Longest single drive accepted (hours).
    pub max_drive_hours: f64,
}

impl Default for TripLimits {
    fn default() -> Self {
        Self {
            min_distance_km: 0.5,
            min_speed_kmh: 5.0,
            max_drive_hours: 20.0,
        }
    }
}

/// SoC ramp for opportunistic slow public charging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublicChargingParams {
    /// At or below this SoC the charging probability is 1.
    pub lower_soc: f64,
    /// At or above this SoC the charging probability is 0.
    pub upper_soc: f64,
}

impl Default for PublicChargingParams {
    fn default() -> Self {
        Self {
            lower_soc: 0.5,
            upper_soc: 0.8,
        }
    }
}

impl PublicChargingParams {
    /// Probability of starting a slow public charge at `soc`.
    ///
    /// # Examples
    ///
    /// ```
    /// use simbev::sim::types::PublicChargingParams;
    ///
    /// let p = PublicChargingParams::default();
    /// assert_eq!(p.probability(0.3), 1.0);
    /// assert!((p.probability(0.65) - 0.5).abs() < 1e-9);
    /// assert_eq!(p.probability(0.9), 0.0);
    /// ```
    pub fn probability(&self, soc: f64) -> f64 {
        if soc <= self.lower_soc {
            1.0
        } else if soc >= self.upper_soc {
            0.0
        } else {
            (self.upper_soc - soc) / (self.upper_soc - self.lower_soc)
        }
    }
}

/// High-power charging behaviour, both at destinations and during recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HpcParams {
    /// Lower bound of the sampled fast-charging target SoC.
    pub soc_target_min: f64,
    /// Upper bound of the sampled fast-charging target SoC.
    pub soc_target_max: f64,
    /// Urban fast charging is only considered below this SoC.
    pub start_threshold_soc: f64,
    /// Urban fast charging is only considered for stops up to this long.
    pub park_time_max_minutes: f64,
    /// Trips at least this long are highway trips.
    pub distance_limit_km: f64,
    /// Each recovery leg covers a fraction of the remaining range drawn
    /// uniformly from `leg_fraction_min..=leg_fraction_max`.
    pub leg_fraction_min: f64,
    pub leg_fraction_max: f64,
}

impl Default for HpcParams {
    fn default() -> Self {
        Self {
            soc_target_min: 0.8,
            soc_target_max: 0.95,
            start_threshold_soc: 0.5,
            park_time_max_minutes: 90.0,
            distance_limit_km: 50.0,
            leg_fraction_min: 0.6,
            leg_fraction_max: 1.0,
        }
    }
}

/// Per-use-case probability that a user accepts an available charge point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Attractiveness {
    pub home: f64,
    pub work: f64,
    pub street: f64,
    pub retail: f64,
    pub urban_fast: f64,
    pub highway_fast: f64,
}

impl Default for Attractiveness {
    fn default() -> Self {
        Self {
            home: 1.0,
            work: 1.0,
            street: 1.0,
            retail: 1.0,
            urban_fast: 1.0,
            highway_fast: 1.0,
        }
    }
}

impl Attractiveness {
    fn public(street: f64, urban_fast: f64) -> Self {
        Self {
            street,
            retail: street,
            urban_fast,
            ..Self::default()
        }
    }

    pub fn get(&self, use_case: UseCase) -> f64 {
        match use_case {
            UseCase::Home => self.home,
            UseCase::Work => self.work,
            UseCase::Street => self.street,
            UseCase::Retail => self.retail,
            UseCase::UrbanFast => self.urban_fast,
            UseCase::HighwayFast => self.highway_fast,
        }
    }

    pub(crate) fn values(&self) -> [f64; 6] {
        UseCase::ALL.map(|uc| self.get(uc))
    }
}

/// Private charging access shares and the attractiveness of each user group.
///
/// Group A has home and work access, B home only, C work only, D neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UserGroupParams {
    /// Share of vehicles with a usable home charge point.
    pub home_private: f64,
    /// Share of vehicles with a usable work charge point.
    pub work_private: f64,
    pub a: Attractiveness,
    pub b: Attractiveness,
    pub c: Attractiveness,
    pub d: Attractiveness,
}

impl Default for UserGroupParams {
    fn default() -> Self {
        Self {
            home_private: 0.7,
            work_private: 0.5,
            a: Attractiveness::public(0.5, 0.27),
            b: Attractiveness::public(0.5, 0.56),
            c: Attractiveness::public(0.75, 0.56),
            d: Attractiveness::public(1.0, 0.85),
        }
    }
}

/// Everything a region worker needs besides the input tables.
#[derive(Debug, Clone, PartialEq)]
pub struct SimParams {
    /// Master seed; each region derives its own stream from it.
    pub seed: u64,
    pub num_threads: usize,
    /// SoC every vehicle starts the lead week with.
    pub initial_soc: f64,
    /// Restrict all vehicles to private charging (home and work).
    pub private_only: bool,
    /// Share of the real fleet that is simulated; drives grid scaling.
    pub sample_share: f64,
    /// Keep per-vehicle event logs in the results.
    pub keep_event_logs: bool,
    pub trip: TripLimits,
    pub public: PublicChargingParams,
    pub hpc: HpcParams,
    pub user_groups: UserGroupParams,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            seed: 42,
            num_threads: 1,
            initial_soc: 0.8,
            private_only: false,
            sample_share: 1.0,
            keep_event_logs: true,
            trip: TripLimits::default(),
            public: PublicChargingParams::default(),
            hpc: HpcParams::default(),
            user_groups: UserGroupParams::default(),
        }
    }
}
