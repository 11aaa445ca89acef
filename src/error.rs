//! Error taxonomy shared by the simulation core and its I/O collaborators.

use std::path::PathBuf;

/// Errors raised while building inputs or running a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Missing or inconsistent configuration (car types, tables, parameters).
    #[error("configuration error: {0}")]
    Config(String),

    /// A charging-type string that is neither `slow` nor `fast`.
    #[error("unknown charging type \"{0}\" (expected \"slow\" or \"fast\")")]
    ChargingType(String),

    /// A BEV state of charge dropped below its floor outside HPC recovery.
    #[error("SoC integrity violation for {vehicle}: SoC {soc:.4} below floor {soc_min:.4}")]
    SocIntegrity {
        vehicle: String,
        soc: f64,
        soc_min: f64,
    },

    /// A private-charging-only vehicle cannot finish an ordinary trip.
    #[error("{vehicle} cannot complete a {distance_km:.1} km trip with private charging only")]
    PrivateOnlyShortfall { vehicle: String, distance_km: f64 },

    /// A region worker failed; wraps the original error.
    #[error("region {region}: {source}")]
    Region {
        region: String,
        source: Box<SimError>,
    },

    /// Malformed input table.
    #[error("input error in {path:?}: {detail}")]
    Input { path: PathBuf, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl SimError {
    /// Returns `true` for the recoverable private-only shortfall.
    pub fn is_private_only_shortfall(&self) -> bool {
        matches!(self, SimError::PrivateOnlyShortfall { .. })
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        SimError::Config(message.into())
    }
}
