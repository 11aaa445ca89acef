//! Where a vehicle is and what kind of charging that place offers.

use std::fmt;
use std::str::FromStr;

use crate::error::SimError;

/// Trip purpose, doubling as the parking destination of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Purpose {
    Work,
    Business,
    School,
    Shopping,
    Private,
    Leisure,
    Home,
}

impl Purpose {
    /// Every purpose in table-column order.
    pub const ALL: [Purpose; 7] = [
        Purpose::Work,
        Purpose::Business,
        Purpose::School,
        Purpose::Shopping,
        Purpose::Private,
        Purpose::Leisure,
        Purpose::Home,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Work => "work",
            Purpose::Business => "business",
            Purpose::School => "school",
            Purpose::Shopping => "shopping",
            Purpose::Private => "private",
            Purpose::Leisure => "leisure",
            Purpose::Home => "home",
        }
    }

    /// The slow public use case a charge point at this destination serves.
    pub fn public_use_case(self) -> UseCase {
        match self {
            Purpose::Shopping => UseCase::Retail,
            _ => UseCase::Street,
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = SimError;

    /// Accepts plain names (`work`) as well as ordered survey labels
    /// (`0_work`, `4_private/ridesharing`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let name = lowered
            .split_once('_')
            .filter(|(prefix, _)| prefix.chars().all(|c| c.is_ascii_digit()))
            .map_or(lowered.as_str(), |(_, rest)| rest);
        let name = name.split('/').next().unwrap_or(name);
        Purpose::ALL
            .into_iter()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| SimError::config(format!("unknown trip purpose \"{s}\"")))
    }
}

/// Position of a vehicle during one logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    /// Parked at a trip destination.
    Parked(Purpose),
    /// At a high-power charging hub during range recovery.
    Hub,
    Driving,
}

impl Location {
    pub fn purpose(self) -> Option<Purpose> {
        match self {
            Location::Parked(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Location::Parked(p) => p.as_str(),
            Location::Hub => "hpc",
            Location::Driving => "driving",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Charging infrastructure category used for grid aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UseCase {
    Home,
    Work,
    Street,
    Retail,
    UrbanFast,
    HighwayFast,
}

impl UseCase {
    pub const ALL: [UseCase; 6] = [
        UseCase::Home,
        UseCase::Work,
        UseCase::Street,
        UseCase::Retail,
        UseCase::UrbanFast,
        UseCase::HighwayFast,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UseCase::Home => "home",
            UseCase::Work => "work",
            UseCase::Street => "street",
            UseCase::Retail => "retail",
            UseCase::UrbanFast => "urban_fast",
            UseCase::HighwayFast => "highway_fast",
        }
    }

    pub fn is_private(self) -> bool {
        matches!(self, UseCase::Home | UseCase::Work)
    }

    pub fn is_fast(self) -> bool {
        matches!(self, UseCase::UrbanFast | UseCase::HighwayFast)
    }
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested charging mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingKind {
    Slow,
    Fast,
}

impl FromStr for ChargingKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" => Ok(ChargingKind::Slow),
            "fast" => Ok(ChargingKind::Fast),
            _ => Err(SimError::ChargingType(s.to_string())),
        }
    }
}
