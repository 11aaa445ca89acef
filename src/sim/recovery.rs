//! Range recovery through high-power charging hubs.
//!
//! Invoked when a BEV cannot reach its destination on the current charge:
//! the trip is split into legs, each ending at a hub where the vehicle fast
//! charges before continuing.

use rand::Rng;

use super::location::{Location, UseCase};
use super::trip::{Trip, TripContext};
use super::vehicle::Vehicle;
use crate::error::SimError;

/// Completes `trip` via HPC stops and returns the step the trip ends at.
///
/// Each leg covers a random fraction of the remaining range. When the
/// horizon is reached mid-leg or mid-charge, the event is truncated and the
/// horizon returned.
///
/// # Errors
///
/// * [`SimError::PrivateOnlyShortfall`] if the vehicle may only charge
///   privately and the trip is not a highway trip
/// * [`SimError::Config`] if the car type cannot fast charge
/// * [`SimError::SocIntegrity`] if a leg within range fails
pub fn recover<R: Rng + ?Sized>(
    trip: &Trip,
    vehicle: &mut Vehicle,
    ctx: &TripContext<'_>,
    rng: &mut R,
) -> Result<usize, SimError> {
    let hpc = &ctx.params.hpc;
    let clock = ctx.clock;
    let last = clock.total_steps();
    let highway = trip.is_highway(hpc);

    if vehicle.private_only() && !highway {
        return Err(SimError::PrivateOnlyShortfall {
            vehicle: vehicle.name().to_string(),
            distance_km: trip.distance,
        });
    }
    if vehicle.car_type().charging_capacity.fast <= 0.0 {
        return Err(SimError::config(format!(
            "car type {} needs HPC recovery but cannot fast charge",
            vehicle.car_type().name
        )));
    }

    let use_case = if highway {
        UseCase::HighwayFast
    } else {
        UseCase::UrbanFast
    };
    let destination = Location::Parked(trip.destination);
    let mut t = trip.drive_start;
    let mut remaining = trip.distance;

    loop {
        let range = vehicle.remaining_range(highway);
        if remaining <= range {
            break;
        }
        let fraction = rng.random_range(hpc.leg_fraction_min..=hpc.leg_fraction_max);
        let leg = range * fraction;
        let leg_time = clock.to_time_steps(leg / trip.speed);
        if t + leg_time >= last {
            return drive_until_horizon(vehicle, leg, leg_time, t, ctx, highway);
        }
        arrive(vehicle, leg, t, leg_time, Location::Hub, highway, ctx)?;
        t += leg_time;
        remaining -= leg;

        let station = ctx.tables.charging.sample_fast(use_case, rng);
        let outcome = vehicle.charge_hpc(t, last - t, station, use_case, hpc, clock, rng)?;
        t += outcome.time_steps;
        if t >= last {
            return Ok(last);
        }
    }

    let drive_time = clock.to_time_steps(remaining / trip.speed);
    if t + drive_time > last {
        return drive_until_horizon(vehicle, remaining, drive_time, t, ctx, highway);
    }
    arrive(vehicle, remaining, t, drive_time, destination, highway, ctx)?;
    Ok(t + drive_time)
}

fn arrive(
    vehicle: &mut Vehicle,
    distance: f64,
    start: usize,
    duration: usize,
    destination: Location,
    highway: bool,
    ctx: &TripContext<'_>,
) -> Result<(), SimError> {
    if vehicle.drive(distance, start, duration, destination, highway, ctx.clock)? {
        Ok(())
    } else {
        Err(SimError::SocIntegrity {
            vehicle: vehicle.name().to_string(),
            soc: vehicle.soc() - distance * vehicle.car_type().consumption_per_km(highway)
                / vehicle.car_type().battery_capacity,
            soc_min: vehicle.car_type().soc_floor(),
        })
    }
}

/// Drives the part of a leg that fits before the horizon.
fn drive_until_horizon(
    vehicle: &mut Vehicle,
    distance: f64,
    duration: usize,
    start: usize,
    ctx: &TripContext<'_>,
    highway: bool,
) -> Result<usize, SimError> {
    let last = ctx.clock.total_steps();
    let steps = last - start;
    let partial = distance * steps as f64 / duration as f64;
    arrive(vehicle, partial, start, steps, Location::Driving, highway, ctx)?;
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets;
    use crate::sim::location::Purpose;
    use crate::sim::types::{SimParams, UserGroupParams};
    use crate::sim::vehicle::{CarType, ChargingCapacity, UserGroup, VehicleKind};
    use rand::{SeedableRng, rngs::StdRng};
    use std::sync::Arc;

    fn car(fast: f64) -> Arc<CarType> {
        Arc::new(
            CarType::new(
                "bev_small",
                VehicleKind::Bev,
                30.0,
                0.15,
                ChargingCapacity { slow: 11.0, fast },
            )
            .unwrap(),
        )
    }

    fn vehicle(car: Arc<CarType>, soc: f64, private_only: bool) -> Vehicle {
        let groups = UserGroupParams::default();
        Vehicle::new(car, 0, soc, UserGroup::new(false, false, &groups), 0.0, 0.0, private_only).unwrap()
    }

    fn long_trip(distance: f64) -> Trip {
        Trip {
            park_start: 0,
            park_time: 4,
            location: Location::Parked(Purpose::Home),
            destination: Purpose::Leisure,
            drive_found: true,
            drive_start: 4,
            drive_time: 12,
            trip_end: 16,
            distance,
            speed: 80.0,
        }
    }

    #[test]
    fn long_trip_stops_at_hubs() {
        let clock = presets::demo_clock(3).unwrap();
        let tables = presets::demo_tables(&clock, 1.0).unwrap();
        let params = SimParams::default();
        let ctx = TripContext { tables: &tables, clock: &clock, params: &params };
        let mut rng = StdRng::seed_from_u64(21);
        let mut v = vehicle(car(50.0), 1.0, false);
        let mut trip = long_trip(250.0);

        let end = trip.execute(&ctx, &mut v, &mut rng).unwrap();

        let events = v.events();
        let hubs = events.iter().filter(|e| e.location == Location::Hub).count();
        assert!(hubs >= 1);
        assert!(events.iter().all(|e| e.soc_end >= 0.2 - 1e-9));
        assert_eq!(v.location(), Location::Parked(Purpose::Leisure));
        assert_eq!(events.last().unwrap().end(), end);
        let driven: f64 = events.iter().map(|e| e.distance_km).sum();
        assert!((driven - 250.0).abs() < 1e-6);
        assert!(
            events
                .iter()
                .filter(|e| e.location == Location::Hub)
                .all(|e| e.use_case == Some(UseCase::HighwayFast))
        );
        for pair in events.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start);
        }
    }

    #[test]
    fn private_only_short_trip_fails() {
        let clock = presets::demo_clock(1).unwrap();
        let tables = presets::demo_tables(&clock, 1.0).unwrap();
        let params = SimParams::default();
        let ctx = TripContext { tables: &tables, clock: &clock, params: &params };
        let mut rng = StdRng::seed_from_u64(2);
        // 0.05 * 30 kWh / 0.15 kWh/km = 10 km of range.
        let mut v = vehicle(car(50.0), 0.25, true);
        let err = long_trip(40.0).execute(&ctx, &mut v, &mut rng).unwrap_err();
        assert!(err.is_private_only_shortfall());
    }

    #[test]
    fn private_only_highway_trip_may_use_hpc() {
        let clock = presets::demo_clock(3).unwrap();
        let tables = presets::demo_tables(&clock, 1.0).unwrap();
        let params = SimParams::default();
        let ctx = TripContext { tables: &tables, clock: &clock, params: &params };
        let mut rng = StdRng::seed_from_u64(2);
        let mut v = vehicle(car(50.0), 0.25, true);
        assert!(long_trip(120.0).execute(&ctx, &mut v, &mut rng).is_ok());
    }

    #[test]
    fn no_fast_capability_is_a_config_error() {
        let clock = presets::demo_clock(1).unwrap();
        let tables = presets::demo_tables(&clock, 1.0).unwrap();
        let params = SimParams::default();
        let ctx = TripContext { tables: &tables, clock: &clock, params: &params };
        let mut rng = StdRng::seed_from_u64(2);
        let mut v = vehicle(car(0.0), 0.3, false);
        let err = long_trip(100.0).execute(&ctx, &mut v, &mut rng).unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    #[test]
    fn recovery_truncates_at_horizon() {
        let clock = presets::demo_clock(1).unwrap();
        let tables = presets::demo_tables(&clock, 1.0).unwrap();
        let params = SimParams::default();
        let ctx = TripContext { tables: &tables, clock: &clock, params: &params };
        let mut rng = StdRng::seed_from_u64(4);
        let last = clock.total_steps();
        let mut v = vehicle(car(50.0), 0.3, false);
        let mut trip = long_trip(500.0);
        trip.park_start = last - 10;
        trip.drive_start = last - 6;
        trip.speed = 20.0;
        let end = trip.execute(&ctx, &mut v, &mut rng).unwrap();
        assert_eq!(end, last);
        assert_eq!(v.events().last().unwrap().end(), last);
        assert!(v.soc() >= 0.2 - 1e-9);
    }
}
