//! Trip scheduling: when a vehicle leaves, where it goes, and what it does
//! while parked beforehand.

use rand::Rng;

use super::clock::SimClock;
use super::location::{ChargingKind, Location, Purpose, UseCase};
use super::probability::ProbabilityTables;
use super::recovery;
use super::types::{HpcParams, SimParams, TripLimits};
use super::vehicle::Vehicle;
use crate::error::SimError;

/// Attempts per distance draw to find an admissible speed.
const SPEED_DRAWS: usize = 20;
/// Distance redraws before falling back to the shortest admissible route.
const ROUTE_DRAWS: usize = 1_000;

/// Shared read-only context for trip creation and execution.
#[derive(Debug, Clone, Copy)]
pub struct TripContext<'a> {
    pub tables: &'a ProbabilityTables,
    pub clock: &'a SimClock,
    pub params: &'a SimParams,
}

/// A parking window followed by an optional drive.
#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    pub park_start: usize,
    /// Parking length in steps; at least 1.
    pub park_time: usize,
    /// Where the vehicle is parked.
    pub location: Location,
    pub destination: Purpose,
    /// `false` if no departure fits before the horizon.
    pub drive_found: bool,
    pub drive_start: usize,
    pub drive_time: usize,
    /// Step at which the next trip begins.
    pub trip_end: usize,
    pub distance: f64,
    /// Average speed (km/h).
    pub speed: f64,
}

impl Default for Trip {
    fn default() -> Self {
        Self {
            park_start: 0,
            park_time: 1,
            location: Location::Parked(Purpose::Home),
            destination: Purpose::Home,
            drive_found: false,
            drive_start: 1,
            drive_time: 0,
            trip_end: 1,
            distance: 0.0,
            speed: 0.0,
        }
    }
}

impl Trip {
    /// Samples the next trip for a vehicle parked since `time_step`.
    ///
    /// The stand time comes from the stand table of the current location.
    /// From its end, each step is tested against the trip-start probability;
    /// a hit draws a destination, rejecting repeats of the current purpose and
    /// business trips not starting at work. A trip that would end past the
    /// horizon is dropped and the vehicle stays parked until the horizon.
    pub fn create<R: Rng + ?Sized>(
        ctx: &TripContext<'_>,
        vehicle: &Vehicle,
        time_step: usize,
        rng: &mut R,
    ) -> Self {
        let last = ctx.clock.total_steps();
        let purpose = vehicle.location().purpose().unwrap_or(Purpose::Home);
        let stand_hours = ctx.tables.stand.get(purpose).sample(rng);
        let park_time = ctx.clock.to_time_steps(stand_hours);

        let mut trip = Trip {
            park_start: time_step,
            park_time,
            location: Location::Parked(purpose),
            destination: purpose,
            drive_found: false,
            drive_start: time_step + park_time,
            drive_time: 0,
            trip_end: last,
            distance: 0.0,
            speed: 0.0,
        };

        while trip.drive_start < last {
            let step = trip.drive_start;
            if rng.random::<f64>() < ctx.tables.trip_starts.get(step) {
                let destination = ctx
                    .tables
                    .purposes
                    .sample(step, rng)
                    .filter(|d| *d != purpose)
                    .filter(|d| *d != Purpose::Business || purpose == Purpose::Work);
                if let Some(destination) = destination {
                    let (distance, speed) = sample_route(ctx.tables, destination, &ctx.params.trip, rng);
                    let drive_time = ctx.clock.to_time_steps(distance / speed);
                    if step + drive_time <= last {
                        trip.drive_found = true;
                        trip.destination = destination;
                        trip.distance = distance;
                        trip.speed = speed;
                        trip.drive_time = drive_time;
                        trip.trip_end = step + drive_time;
                    }
                    break;
                }
            }
            trip.drive_start += 1;
        }

        if trip.drive_found {
            trip.park_time = trip.drive_start - trip.park_start;
        } else {
            trip.park_time = last - trip.park_start;
            trip.drive_start = last;
            trip.trip_end = last;
        }
        trip
    }

    pub fn is_highway(&self, hpc: &HpcParams) -> bool {
        self.distance >= hpc.distance_limit_km
    }

    /// Runs the parking window (charging if warranted), then the drive.
    ///
    /// If the vehicle lacks the range, HPC recovery takes over and may move
    /// the end of the trip. Returns the step at which the next trip starts.
    pub fn execute<R: Rng + ?Sized>(
        &mut self,
        ctx: &TripContext<'_>,
        vehicle: &mut Vehicle,
        rng: &mut R,
    ) -> Result<usize, SimError> {
        self.charge_or_park(ctx, vehicle, rng)?;
        if self.drive_found {
            let arrived = vehicle.drive(
                self.distance,
                self.drive_start,
                self.drive_time,
                Location::Parked(self.destination),
                self.is_highway(&ctx.params.hpc),
                ctx.clock,
            )?;
            if !arrived {
                self.trip_end = recovery::recover(self, vehicle, ctx, rng)?;
            }
        }
        Ok(self.trip_end)
    }

    fn charge_or_park<R: Rng + ?Sized>(
        &self,
        ctx: &TripContext<'_>,
        vehicle: &mut Vehicle,
        rng: &mut R,
    ) -> Result<(), SimError> {
        let Location::Parked(purpose) = self.location else {
            vehicle.park(self, ctx.clock);
            return Ok(());
        };
        let params = ctx.params;
        let soc = vehicle.soc();
        let car = vehicle.car_type().clone();

        if let Some(power) = vehicle.private_power(purpose) {
            let use_case = if purpose == Purpose::Home {
                UseCase::Home
            } else {
                UseCase::Work
            };
            let accepts = vehicle.user_group().attractiveness(use_case);
            if power > 0.0 && soc < car.charging_threshold && rng.random::<f64>() < accepts {
                vehicle.charge(self, power, ChargingKind::Slow, use_case, &params.hpc, ctx.clock, rng)?;
            } else {
                vehicle.park(self, ctx.clock);
            }
            return Ok(());
        }

        if vehicle.private_only() {
            vehicle.park(self, ctx.clock);
            return Ok(());
        }

        let park_minutes = self.park_time as f64 * f64::from(ctx.clock.step_minutes());
        let fast_accepts = vehicle.user_group().attractiveness(UseCase::UrbanFast);
        if soc < params.hpc.start_threshold_soc
            && park_minutes <= params.hpc.park_time_max_minutes
            && car.charging_capacity.fast > 0.0
            && rng.random::<f64>() < fast_accepts
        {
            let power = ctx.tables.charging.sample_fast(UseCase::UrbanFast, rng);
            vehicle.charge(self, power, ChargingKind::Fast, UseCase::UrbanFast, &params.hpc, ctx.clock, rng)?;
            return Ok(());
        }

        let use_case = purpose.public_use_case();
        let station = ctx.tables.charging.sample_slow(purpose, rng);
        let accepts = vehicle.user_group().attractiveness(use_case);
        if station > 0.0
            && car.charging_capacity.slow > 0.0
            && rng.random::<f64>() < params.public.probability(soc)
            && rng.random::<f64>() < accepts
        {
            vehicle.charge(self, station, ChargingKind::Slow, use_case, &params.hpc, ctx.clock, rng)?;
        } else {
            vehicle.park(self, ctx.clock);
        }
        Ok(())
    }
}

/// Draws a distance and speed for a trip to `destination` that respect the
/// distance floor, the speed floor and the drive-time cap.
pub fn sample_route<R: Rng + ?Sized>(
    tables: &ProbabilityTables,
    destination: Purpose,
    limits: &TripLimits,
    rng: &mut R,
) -> (f64, f64) {
    let distances = tables.distance.get(destination);
    let speeds = tables.speed.get(destination);
    for _ in 0..ROUTE_DRAWS {
        let distance = distances.sample(rng);
        if distance < limits.min_distance_km {
            continue;
        }
        for _ in 0..SPEED_DRAWS {
            let speed = speeds.sample(rng);
            if speed >= limits.min_speed_kmh && speed > 0.0 && distance / speed <= limits.max_drive_hours {
                return (distance, speed);
            }
        }
    }
    tables
        .fallback_route(destination, limits)
        .unwrap_or((limits.min_distance_km, limits.min_speed_kmh.max(1.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets;
    use crate::sim::vehicle::{CarType, ChargingCapacity, UserGroup, VehicleKind};
    use crate::sim::types::UserGroupParams;
    use rand::{SeedableRng, rngs::StdRng};
    use std::sync::Arc;

    fn setup() -> (SimClock, ProbabilityTables, SimParams) {
        let clock = presets::demo_clock(2).unwrap();
        let tables = presets::demo_tables(&clock, 1.0).unwrap();
        (clock, tables, SimParams::default())
    }

    fn bev(soc: f64, home: bool) -> Vehicle {
        let car = CarType::new(
            "bev_test",
            VehicleKind::Bev,
            30.0,
            0.15,
            ChargingCapacity { slow: 11.0, fast: 50.0 },
        )
        .unwrap();
        let groups = UserGroupParams::default();
        Vehicle::new(Arc::new(car), 0, soc, UserGroup::new(home, false, &groups), 11.0, 0.0, false)
            .unwrap()
    }

    #[test]
    fn created_trips_are_contiguous() {
        let (clock, tables, params) = setup();
        let ctx = TripContext { tables: &tables, clock: &clock, params: &params };
        let mut rng = StdRng::seed_from_u64(11);
        let vehicle = bev(0.8, true);
        let mut t = 0;
        while t < clock.total_steps() {
            let trip = Trip::create(&ctx, &vehicle, t, &mut rng);
            assert_eq!(trip.park_start, t);
            assert!(trip.park_time >= 1);
            assert_eq!(trip.drive_start, trip.park_start + trip.park_time);
            assert!(trip.trip_end <= clock.total_steps());
            if trip.drive_found {
                assert!(trip.drive_time >= 1);
                assert_ne!(trip.destination, Purpose::Home);
                assert!(trip.distance >= params.trip.min_distance_km);
                assert!(trip.speed >= params.trip.min_speed_kmh);
                assert_eq!(trip.trip_end, trip.drive_start + trip.drive_time);
            } else {
                assert_eq!(trip.trip_end, clock.total_steps());
            }
            t = trip.trip_end;
        }
    }

    #[test]
    fn trip_near_horizon_parks_until_end() {
        let (clock, tables, params) = setup();
        let ctx = TripContext { tables: &tables, clock: &clock, params: &params };
        let mut rng = StdRng::seed_from_u64(3);
        let last = clock.total_steps();
        let trip = Trip::create(&ctx, &bev(0.8, true), last - 1, &mut rng);
        assert!(!trip.drive_found);
        assert_eq!(trip.park_time, 1);
        assert_eq!(trip.trip_end, last);
    }

    #[test]
    fn execute_tiles_the_timeline() {
        let (clock, tables, params) = setup();
        let ctx = TripContext { tables: &tables, clock: &clock, params: &params };
        let mut rng = StdRng::seed_from_u64(19);
        let mut vehicle = bev(0.8, true);
        let mut t = 0;
        while t < clock.total_steps() {
            let mut trip = Trip::create(&ctx, &vehicle, t, &mut rng);
            t = trip.execute(&ctx, &mut vehicle, &mut rng).unwrap();
        }
        let events = vehicle.events();
        assert_eq!(events[0].start, 0);
        for pair in events.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start);
            assert!((pair[0].soc_end - pair[1].soc_start).abs() < 1e-12);
        }
        assert_eq!(events.last().unwrap().end(), clock.total_steps());
    }

    #[test]
    fn home_charging_respects_threshold() {
        let (clock, tables, params) = setup();
        let ctx = TripContext { tables: &tables, clock: &clock, params: &params };
        let mut rng = StdRng::seed_from_u64(0);
        let trip = Trip { park_start: 0, park_time: 8, drive_start: 8, trip_end: 8, ..Trip::default() };

        let mut full = bev(0.9, true);
        trip.clone().execute(&ctx, &mut full, &mut rng).unwrap();
        assert_eq!(full.events()[0].use_case, None);

        let mut low = bev(0.4, true);
        trip.clone().execute(&ctx, &mut low, &mut rng).unwrap();
        assert_eq!(low.events()[0].use_case, Some(UseCase::Home));
        assert!(low.soc() > 0.4);
    }

    #[test]
    fn private_only_never_charges_publicly() {
        let (clock, tables, params) = setup();
        let ctx = TripContext { tables: &tables, clock: &clock, params: &params };
        let mut rng = StdRng::seed_from_u64(0);
        let car = bev(0.3, false).car_type().clone();
        let groups = UserGroupParams::default();
        for seed in 0..20 {
            let mut v = Vehicle::new(car.clone(), seed, 0.3, UserGroup::new(false, false, &groups), 0.0, 0.0, true)
                .unwrap();
            let mut trip = Trip {
                park_time: 4,
                drive_start: 4,
                trip_end: 4,
                location: Location::Parked(Purpose::Shopping),
                ..Trip::default()
            };
            trip.execute(&ctx, &mut v, &mut rng).unwrap();
            assert!(v.events().iter().all(|e| e.use_case.is_none()));
        }
    }

    #[test]
    fn route_sampling_respects_floors() {
        let (_, tables, _) = setup();
        let limits = TripLimits { min_distance_km: 3.0, min_speed_kmh: 20.0, max_drive_hours: 2.0 };
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..200 {
            let (d, s) = sample_route(&tables, Purpose::Leisure, &limits, &mut rng);
            assert!(d >= 3.0 && s >= 20.0 && d / s <= 2.0);
        }
    }
}
