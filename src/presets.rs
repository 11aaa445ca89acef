//! Built-in synthetic inputs for demos and tests when no input tables are
//! configured.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate, Timelike};

use crate::error::SimError;
use crate::sim::clock::SimClock;
use crate::sim::location::Purpose;
use crate::sim::orchestrator::SimulationInputs;
use crate::sim::probability::{
    ChargingPowerTable, Distribution, ProbabilityTables, PurposeDistributions, PurposeTable,
    TripStartSeries,
};
use crate::sim::region::{RegionSpec, RegionType};
use crate::sim::vehicle::{CarType, ChargingCapacity, VehicleKind};

/// First reported day of the demo horizon.
pub fn demo_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 8).unwrap_or_default()
}

/// Demo clock reporting `days` days at 15-minute steps.
pub fn demo_clock(days: u64) -> Result<SimClock, SimError> {
    let start = demo_start();
    let end = start
        .checked_add_days(Days::new(days.saturating_sub(1)))
        .ok_or_else(|| SimError::config("demo horizon out of range"))?;
    SimClock::new(start, end, 15)
}

fn departure_weight(hour: f64) -> f64 {
    match hour {
        h if h < 5.0 => 0.02,
        h if h < 7.0 => 0.15,
        h if h < 9.0 => 0.9,
        h if h < 12.0 => 0.45,
        h if h < 14.0 => 0.6,
        h if h < 16.0 => 0.5,
        h if h < 19.0 => 1.0,
        h if h < 22.0 => 0.35,
        _ => 0.08,
    }
}

/// Work, business, school, shopping, private, leisure, home.
fn purpose_weights(hour: f64, weekend: bool) -> [f64; 7] {
    let mut w = match hour {
        h if h < 5.0 => [0.02, 0.0, 0.0, 0.03, 0.05, 0.2, 0.7],
        h if h < 10.0 => [0.45, 0.05, 0.15, 0.08, 0.1, 0.05, 0.12],
        h if h < 15.0 => [0.1, 0.08, 0.03, 0.25, 0.15, 0.19, 0.2],
        h if h < 20.0 => [0.05, 0.03, 0.02, 0.15, 0.1, 0.2, 0.45],
        _ => [0.02, 0.0, 0.0, 0.03, 0.05, 0.2, 0.7],
    };
    if weekend {
        w[0] *= 0.2;
        w[1] = 0.0;
        w[2] = 0.0;
    }
    w
}

fn dist(pairs: &[(f64, f64)]) -> Result<Distribution, SimError> {
    Distribution::new(pairs.iter().copied())
}

fn scaled(pairs: &[(f64, f64)], scale: f64) -> Result<Distribution, SimError> {
    Distribution::new(pairs.iter().map(|&(v, w)| (v * scale, w)))
}

/// Synthetic tables spanning the clock's horizon.
///
/// `distance_scale` stretches every trip distance, e.g. for rural types.
pub fn demo_tables(clock: &SimClock, distance_scale: f64) -> Result<ProbabilityTables, SimError> {
    let mut starts = Vec::with_capacity(clock.total_steps());
    let mut rows = Vec::with_capacity(clock.total_steps());
    for step in 0..clock.total_steps() {
        let ts = clock.timestamp(step);
        let hour = f64::from(ts.hour()) + f64::from(ts.minute()) / 60.0;
        let weekend = ts.weekday().number_from_monday() >= 6;
        let factor = if weekend { 0.7 } else { 1.0 };
        starts.push(departure_weight(hour) * factor);
        rows.push(purpose_weights(hour, weekend));
    }

    let distance = PurposeDistributions::new("distance", |p| {
        let pairs: &[(f64, f64)] = match p {
            Purpose::Work => &[(2.0, 0.15), (5.0, 0.25), (10.0, 0.25), (20.0, 0.2), (40.0, 0.1), (80.0, 0.05)],
            Purpose::Business => &[(5.0, 0.2), (15.0, 0.3), (40.0, 0.25), (100.0, 0.15), (250.0, 0.1)],
            Purpose::School => &[(1.0, 0.3), (3.0, 0.4), (8.0, 0.3)],
            Purpose::Shopping => &[(1.0, 0.25), (3.0, 0.35), (8.0, 0.3), (20.0, 0.1)],
            Purpose::Private => &[(2.0, 0.3), (5.0, 0.3), (15.0, 0.3), (40.0, 0.1)],
            Purpose::Leisure => &[(2.0, 0.2), (5.0, 0.25), (15.0, 0.25), (40.0, 0.15), (100.0, 0.1), (300.0, 0.05)],
            Purpose::Home => &[(2.0, 0.2), (5.0, 0.25), (10.0, 0.25), (20.0, 0.15), (50.0, 0.1), (120.0, 0.05)],
        };
        scaled(pairs, distance_scale).ok()
    })?;
    let speed = PurposeDistributions::new("speed", |_| {
        dist(&[(15.0, 0.2), (25.0, 0.3), (40.0, 0.25), (60.0, 0.15), (90.0, 0.07), (110.0, 0.03)]).ok()
    })?;
    let stand = PurposeDistributions::new("stand", |p| {
        let pairs: &[(f64, f64)] = match p {
            Purpose::Work => &[(4.0, 0.2), (8.0, 0.5), (9.0, 0.3)],
            Purpose::Business => &[(1.0, 0.4), (2.0, 0.3), (4.0, 0.3)],
            Purpose::School => &[(4.0, 0.5), (6.0, 0.5)],
            Purpose::Shopping => &[(0.25, 0.2), (0.5, 0.4), (1.0, 0.3), (2.0, 0.1)],
            Purpose::Private => &[(0.5, 0.3), (1.0, 0.4), (2.0, 0.3)],
            Purpose::Leisure => &[(1.0, 0.3), (2.0, 0.3), (3.0, 0.25), (5.0, 0.15)],
            Purpose::Home => &[(0.5, 0.1), (2.0, 0.2), (6.0, 0.2), (10.0, 0.3), (14.0, 0.2)],
        };
        dist(pairs).ok()
    })?;
    let slow = PurposeDistributions::new("charging", |p| {
        let pairs: &[(f64, f64)] = match p {
            Purpose::Home => &[(0.0, 0.2), (3.7, 0.3), (11.0, 0.5)],
            Purpose::Work => &[(0.0, 0.4), (11.0, 0.45), (22.0, 0.15)],
            Purpose::Business => &[(0.0, 0.6), (11.0, 0.3), (22.0, 0.1)],
            Purpose::School => &[(0.0, 0.8), (11.0, 0.2)],
            Purpose::Shopping => &[(0.0, 0.5), (11.0, 0.2), (22.0, 0.3)],
            Purpose::Private => &[(0.0, 0.7), (11.0, 0.2), (22.0, 0.1)],
            Purpose::Leisure => &[(0.0, 0.6), (11.0, 0.25), (22.0, 0.15)],
        };
        dist(pairs).ok()
    })?;
    let charging = ChargingPowerTable::new(
        slow,
        dist(&[(50.0, 0.6), (150.0, 0.4)])?,
        dist(&[(150.0, 0.5), (350.0, 0.5)])?,
    )?;

    Ok(ProbabilityTables {
        trip_starts: TripStartSeries::from_counts(starts)?,
        purposes: PurposeTable::new(rows)?,
        distance,
        speed,
        stand,
        charging,
    })
}

/// Four representative car types.
pub fn demo_car_types() -> Result<BTreeMap<String, Arc<CarType>>, SimError> {
    let cars = [
        CarType::new("bev_mini", VehicleKind::Bev, 30.0, 0.15, ChargingCapacity { slow: 11.0, fast: 50.0 })?,
        CarType::new("bev_medium", VehicleKind::Bev, 55.0, 0.17, ChargingCapacity { slow: 11.0, fast: 100.0 })?,
        CarType::new("bev_luxury", VehicleKind::Bev, 90.0, 0.2, ChargingCapacity { slow: 22.0, fast: 150.0 })?
            .with_highway_factor(1.2)?,
        CarType::new("phev_medium", VehicleKind::Phev, 12.0, 0.18, ChargingCapacity { slow: 3.7, fast: 0.0 })?,
    ];
    Ok(cars.into_iter().map(|c| (c.name.clone(), Arc::new(c))).collect())
}

fn region(id: &str, region_type: &str, counts: [u32; 4]) -> RegionSpec {
    let names = ["bev_mini", "bev_medium", "bev_luxury", "phev_medium"];
    RegionSpec {
        id: id.to_string(),
        region_type: region_type.to_string(),
        car_counts: names.iter().map(|n| n.to_string()).zip(counts).collect(),
    }
}

/// Three regions of an urban and a rural type with the demo car types.
pub fn demo_inputs(clock: &SimClock) -> Result<SimulationInputs, SimError> {
    let region_types = [("urban", 1.0), ("rural", 1.6)]
        .into_iter()
        .map(|(name, scale)| {
            let tables = demo_tables(clock, scale)?;
            Ok((
                name.to_string(),
                Arc::new(RegionType {
                    name: name.to_string(),
                    tables,
                }),
            ))
        })
        .collect::<Result<BTreeMap<_, _>, SimError>>()?;
    Ok(SimulationInputs {
        car_types: demo_car_types()?,
        region_types,
        regions: vec![
            region("region_1", "urban", [4, 6, 2, 3]),
            region("region_2", "rural", [2, 4, 1, 3]),
            region("region_3", "urban", [3, 3, 1, 2]),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::types::TripLimits;

    #[test]
    fn demo_tables_cover_horizon() {
        let clock = demo_clock(2).unwrap();
        let tables = demo_tables(&clock, 1.0).unwrap();
        tables.validate(clock.total_steps(), &TripLimits::default()).unwrap();
        assert!(tables.validate(clock.total_steps() + 1, &TripLimits::default()).is_err());
    }

    #[test]
    fn demo_inputs_are_consistent() {
        let clock = demo_clock(1).unwrap();
        let inputs = demo_inputs(&clock).unwrap();
        assert_eq!(inputs.regions.len(), 3);
        for r in &inputs.regions {
            assert!(inputs.region_types.contains_key(&r.region_type));
            assert!(r.car_counts.keys().all(|k| inputs.car_types.contains_key(k)));
        }
    }
}
