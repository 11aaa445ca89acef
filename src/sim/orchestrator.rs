//! Runs every vehicle of every region and merges the regional results.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::analysis::VehicleAnalysis;
use super::clock::SimClock;
use super::region::{GridTimeSeries, Region, RegionSpec, RegionType};
use super::trip::{Trip, TripContext};
use super::types::SimParams;
use super::vehicle::{CarType, EventRecord, Vehicle, trim_lead};
use crate::error::SimError;

/// Car types, region types and regions of one run.
#[derive(Debug, Clone, Default)]
pub struct SimulationInputs {
    pub car_types: BTreeMap<String, Arc<CarType>>,
    pub region_types: BTreeMap<String, Arc<RegionType>>,
    pub regions: Vec<RegionSpec>,
}

/// A finished vehicle with its reported events.
#[derive(Debug, Clone)]
pub struct VehicleResult {
    pub name: String,
    pub car_type: String,
    pub battery_capacity: f64,
    /// Events with the lead week trimmed; empty unless event logs are kept.
    pub events: Vec<EventRecord>,
    pub analysis: VehicleAnalysis,
    /// Re-run with public charging after a private-only shortfall.
    pub used_fallback: bool,
}

#[derive(Debug, Clone)]
pub struct RegionResult {
    pub id: String,
    pub region_type: String,
    /// Scaled grid series over the whole horizon, lead week included.
    pub grid: GridTimeSeries,
    pub vehicles: Vec<VehicleResult>,
}

impl RegionResult {
    pub fn fallbacks(&self) -> usize {
        self.vehicles.iter().filter(|v| v.used_fallback).count()
    }
}

#[derive(Debug, Clone)]
pub struct SimulationOutput {
    /// Region results in input order.
    pub regions: Vec<RegionResult>,
    /// Element-wise sum of all regional grids.
    pub total: GridTimeSeries,
}

/// Derives the seed of a region's random stream.
///
/// Depends only on the master seed and the region id, so results do not
/// change with worker count or scheduling order.
pub fn region_seed(seed: u64, region_id: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in region_id.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    let mut z = seed ^ hash;
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// The simulation: validated inputs plus run parameters.
#[derive(Debug, Clone)]
pub struct SimBev {
    params: SimParams,
    clock: SimClock,
    inputs: SimulationInputs,
    power_classes: Vec<f64>,
}

impl SimBev {
    /// Validates the inputs against each other and the run horizon.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if a region references an unknown region
    /// or car type, a table does not cover the horizon, or the HPC target
    /// range does not lie above a fast-charging car type's SoC floor.
    pub fn new(params: SimParams, clock: SimClock, inputs: SimulationInputs) -> Result<Self, SimError> {
        for region in &inputs.regions {
            if !inputs.region_types.contains_key(&region.region_type) {
                return Err(SimError::config(format!(
                    "region {} references unknown region type {}",
                    region.id, region.region_type
                )));
            }
            if let Some(unknown) = region
                .car_counts
                .keys()
                .find(|name| !inputs.car_types.contains_key(*name))
            {
                return Err(SimError::config(format!(
                    "region {} references unknown car type {unknown}",
                    region.id
                )));
            }
        }
        for region_type in inputs.region_types.values() {
            region_type
                .tables
                .validate(clock.total_steps(), &params.trip)
                .map_err(|e| SimError::config(format!("region type {}: {e}", region_type.name)))?;
        }
        for car in inputs.car_types.values() {
            if car.charging_capacity.fast > 0.0 && params.hpc.soc_target_min <= car.soc_floor() {
                return Err(SimError::config(format!(
                    "HPC target SoC {} must exceed the SoC floor {} of {}",
                    params.hpc.soc_target_min,
                    car.soc_floor(),
                    car.name
                )));
            }
        }

        let mut power_classes: Vec<f64> = inputs
            .region_types
            .values()
            .flat_map(|rt| rt.tables.charging.power_levels())
            .collect();
        power_classes.sort_by(f64::total_cmp);
        power_classes.dedup();

        Ok(Self {
            params,
            clock,
            inputs,
            power_classes,
        })
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn inputs(&self) -> &SimulationInputs {
        &self.inputs
    }

    /// Rated-power classes used for the vehicle-count columns.
    pub fn power_classes(&self) -> &[f64] {
        &self.power_classes
    }

    /// Simulates one vehicle over the whole horizon.
    pub fn simulate_vehicle(
        &self,
        region_type: &RegionType,
        car_type: &Arc<CarType>,
        number: usize,
        private_only: bool,
        rng: &mut StdRng,
    ) -> Result<Vehicle, SimError> {
        let mut vehicle = Vehicle::build(
            car_type.clone(),
            number,
            &self.params,
            &region_type.tables.charging,
            private_only,
            rng,
        )?;
        let ctx = TripContext {
            tables: &region_type.tables,
            clock: &self.clock,
            params: &self.params,
        };
        let last = self.clock.total_steps();
        let mut t = 0;
        while t < last {
            let mut trip = Trip::create(&ctx, &vehicle, t, rng);
            t = trip.execute(&ctx, &mut vehicle, rng)?;
        }
        Ok(vehicle)
    }

    /// Simulates every vehicle of one region in a fixed order.
    ///
    /// A private-only shortfall re-runs that vehicle from the same random
    /// state with public charging allowed; any other error aborts the region.
    pub fn run_region(&self, number: usize, spec: &RegionSpec) -> Result<RegionResult, SimError> {
        let region_type = self
            .inputs
            .region_types
            .get(&spec.region_type)
            .ok_or_else(|| SimError::config(format!("unknown region type {}", spec.region_type)))?;
        let mut region = Region::new(
            spec,
            number,
            region_type.clone(),
            self.params.sample_share,
            GridTimeSeries::new(self.clock.total_steps(), self.power_classes.clone()),
        );
        let mut rng = StdRng::seed_from_u64(region_seed(self.params.seed, &spec.id));
        let mut vehicles = Vec::new();
        info!(region = %spec.id, region_type = %spec.region_type, "simulating region");

        for entry in region.fleet().to_vec() {
            let car_type = self
                .inputs
                .car_types
                .get(&entry.car_type)
                .ok_or_else(|| SimError::config(format!("unknown car type {}", entry.car_type)))?;
            for n in 0..entry.simulated as usize {
                let snapshot = rng.clone();
                let (vehicle, used_fallback) =
                    match self.simulate_vehicle(region_type, car_type, n, self.params.private_only, &mut rng) {
                        Ok(v) => (v, false),
                        Err(e) if e.is_private_only_shortfall() => {
                            warn!(region = %spec.id, error = %e, "re-running vehicle with public charging");
                            rng = snapshot;
                            (self.simulate_vehicle(region_type, car_type, n, false, &mut rng)?, true)
                        }
                        Err(e) => return Err(e),
                    };
                region.add_vehicle_events(&vehicle, entry.scaling());
                vehicles.push(self.vehicle_result(vehicle, used_fallback));
            }
            debug!(region = %spec.id, car_type = %entry.car_type, count = entry.simulated, "car type done");
        }

        Ok(RegionResult {
            id: spec.id.clone(),
            region_type: spec.region_type.clone(),
            grid: region.into_grid(),
            vehicles,
        })
    }

    fn vehicle_result(&self, vehicle: Vehicle, used_fallback: bool) -> VehicleResult {
        let name = vehicle.name().to_string();
        let car_type = vehicle.car_type().clone();
        let events = trim_lead(vehicle.events(), car_type.battery_capacity, &self.clock);
        let analysis = VehicleAnalysis::from_events(&name, &car_type.name, &events, car_type.battery_capacity);
        VehicleResult {
            name,
            car_type: car_type.name.clone(),
            battery_capacity: car_type.battery_capacity,
            events: if self.params.keep_event_logs {
                events
            } else {
                Vec::new()
            },
            analysis,
            used_fallback,
        }
    }

    /// Runs all regions on a worker pool and merges their grids in input order.
    ///
    /// # Errors
    ///
    /// The first failing region aborts the run; its error is wrapped in
    /// [`SimError::Region`].
    pub fn run_multi(&self) -> Result<SimulationOutput, SimError> {
        let threads = self.params.num_threads.clamp(1, self.inputs.regions.len().max(1));
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        info!(regions = self.inputs.regions.len(), threads, "starting simulation");

        let regions = pool.install(|| {
            self.inputs
                .regions
                .par_iter()
                .enumerate()
                .map(|(n, spec)| {
                    self.run_region(n, spec).map_err(|e| SimError::Region {
                        region: spec.id.clone(),
                        source: Box::new(e),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        let mut total = GridTimeSeries::new(self.clock.total_steps(), self.power_classes.clone());
        for region in &regions {
            total.merge(&region.grid)?;
        }
        info!(
            vehicles = regions.iter().map(|r| r.vehicles.len()).sum::<usize>(),
            "simulation finished"
        );
        Ok(SimulationOutput { regions, total })
    }
}
