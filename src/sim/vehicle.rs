use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDateTime;
use rand::Rng;

use super::charging::{ChargingCurve, ChargingOutcome, ChargingRequest, solve};
use super::clock::SimClock;
use super::location::{ChargingKind, Location, Purpose, UseCase};
use super::probability::ChargingPowerTable;
use super::trip::Trip;
use super::types::{Attractiveness, HpcParams, SimParams, UserGroupParams};
use crate::error::SimError;

const SOC_EPS: f64 = 1e-9;

/// Drivetrain class; only battery-electric vehicles are bound by `soc_min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleKind {
    Bev,
    Phev,
}

impl FromStr for VehicleKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bev" => Ok(VehicleKind::Bev),
            "phev" => Ok(VehicleKind::Phev),
            other => Err(SimError::config(format!("unknown vehicle kind \"{other}\""))),
        }
    }
}

/// Maximum charging power the vehicle accepts (kW).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargingCapacity {
    pub slow: f64,
    pub fast: f64,
}

/// Smallest energy (kWh) worth a charging stop, per use case.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinChargingEnergy([f64; 6]);

impl MinChargingEnergy {
    /// Same threshold for private, slow public and fast use cases respectively.
    pub fn by_group(private: f64, public: f64, fast: f64) -> Self {
        Self(UseCase::ALL.map(|uc| {
            if uc.is_private() {
                private
            } else if uc.is_fast() {
                fast
            } else {
                public
            }
        }))
    }

    pub fn get(&self, use_case: UseCase) -> f64 {
        self.0[use_case.index()]
    }
}

impl Default for MinChargingEnergy {
    fn default() -> Self {
        Self::by_group(0.1, 0.1, 1.0)
    }
}

/// Immutable technical description shared by every vehicle of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct CarType {
    /// Identifier such as `bev_medium`.
    pub name: String,
    pub kind: VehicleKind,
    /// Usable battery capacity (kWh).
    pub battery_capacity: f64,
    /// Energy consumption (kWh/km).
    pub consumption: f64,
    /// Consumption multiplier on highway trips.
    pub highway_consumption_factor: f64,
    pub charging_capacity: ChargingCapacity,
    /// Lowest SoC a BEV is allowed to reach.
    pub soc_min: f64,
    /// Private charging only starts below this SoC.
    pub charging_threshold: f64,
    pub min_charging_energy: MinChargingEnergy,
    /// Acceptance curve used for fast charging.
    pub charging_curve: ChargingCurve,
}

impl CarType {
    /// Creates a car type with default SoC limits and the default fast curve.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] for non-positive capacity or consumption
    /// or negative charging powers.
    pub fn new(
        name: impl Into<String>,
        kind: VehicleKind,
        battery_capacity: f64,
        consumption: f64,
        charging_capacity: ChargingCapacity,
    ) -> Result<Self, SimError> {
        let car = Self {
            name: name.into(),
            kind,
            battery_capacity,
            consumption,
            highway_consumption_factor: 1.0,
            charging_capacity,
            soc_min: 0.2,
            charging_threshold: 0.8,
            min_charging_energy: MinChargingEnergy::default(),
            charging_curve: ChargingCurve::default_fast(),
        };
        car.validate()?;
        Ok(car)
    }

    pub fn with_soc_limits(mut self, soc_min: f64, charging_threshold: f64) -> Result<Self, SimError> {
        self.soc_min = soc_min;
        self.charging_threshold = charging_threshold;
        self.validate()?;
        Ok(self)
    }

    pub fn with_highway_factor(mut self, factor: f64) -> Result<Self, SimError> {
        self.highway_consumption_factor = factor;
        self.validate()?;
        Ok(self)
    }

    pub fn with_min_charging_energy(mut self, min: MinChargingEnergy) -> Self {
        self.min_charging_energy = min;
        self
    }

    pub fn with_charging_curve(mut self, curve: ChargingCurve) -> Self {
        self.charging_curve = curve;
        self
    }

    fn validate(&self) -> Result<(), SimError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        let unit = |v: f64| (0.0..=1.0).contains(&v);
        let problem = if !positive(self.battery_capacity) {
            Some("battery capacity must be positive")
        } else if !positive(self.consumption) {
            Some("consumption must be positive")
        } else if !positive(self.highway_consumption_factor) {
            Some("highway consumption factor must be positive")
        } else if !(self.charging_capacity.slow >= 0.0 && self.charging_capacity.fast >= 0.0) {
            Some("charging capacities must be non-negative")
        } else if !unit(self.soc_min) || !unit(self.charging_threshold) {
            Some("SoC limits must lie in [0, 1]")
        } else {
            None
        };
        match problem {
            Some(msg) => Err(SimError::config(format!("car type {}: {msg}", self.name))),
            None => Ok(()),
        }
    }

    /// SoC floor enforced while driving.
    pub fn soc_floor(&self) -> f64 {
        match self.kind {
            VehicleKind::Bev => self.soc_min,
            VehicleKind::Phev => 0.0,
        }
    }

    pub fn consumption_per_km(&self, highway: bool) -> f64 {
        if highway {
            self.consumption * self.highway_consumption_factor
        } else {
            self.consumption
        }
    }
}

/// Private charging access class of a vehicle owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserClass {
    /// Home and work.
    A,
    /// Home only.
    B,
    /// Work only.
    C,
    /// Neither.
    D,
}

/// Charging propensity of one vehicle, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct UserGroup {
    class: UserClass,
    attractiveness: Attractiveness,
}

impl UserGroup {
    pub fn new(home: bool, work: bool, params: &UserGroupParams) -> Self {
        let (class, attractiveness) = match (home, work) {
            (true, true) => (UserClass::A, &params.a),
            (true, false) => (UserClass::B, &params.b),
            (false, true) => (UserClass::C, &params.c),
            (false, false) => (UserClass::D, &params.d),
        };
        Self {
            class,
            attractiveness: attractiveness.clone(),
        }
    }

    pub fn class(&self) -> UserClass {
        self.class
    }

    pub fn has_home(&self) -> bool {
        matches!(self.class, UserClass::A | UserClass::B)
    }

    pub fn has_work(&self) -> bool {
        matches!(self.class, UserClass::A | UserClass::C)
    }

    /// Probability of accepting an available charge point of `use_case`.
    pub fn attractiveness(&self, use_case: UseCase) -> f64 {
        self.attractiveness.get(use_case)
    }
}

/// One row of a vehicle's event log.
///
/// Consecutive rows tile the horizon: each row starts where the previous
/// one ended and its `soc_start` equals the previous `soc_end`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub timestamp: NaiveDateTime,
    /// First step of the event.
    pub start: usize,
    /// Length in steps; always at least 1.
    pub duration: usize,
    pub location: Location,
    /// Set only when energy was charged.
    pub use_case: Option<UseCase>,
    pub soc_start: f64,
    pub soc_end: f64,
    /// Mean charging power over `charging_steps` (kW).
    pub avg_power: f64,
    /// Rated power of the charge point used (kW).
    pub rated_power: f64,
    pub charging_steps: usize,
    pub distance_km: f64,
}

impl EventRecord {
    fn idle(clock: &SimClock, start: usize, duration: usize, location: Location, soc: f64) -> Self {
        Self {
            timestamp: clock.timestamp(start),
            start,
            duration,
            location,
            use_case: None,
            soc_start: soc,
            soc_end: soc,
            avg_power: 0.0,
            rated_power: 0.0,
            charging_steps: 0,
            distance_km: 0.0,
        }
    }

    /// Exclusive end step.
    pub fn end(&self) -> usize {
        self.start + self.duration
    }

    pub fn is_charging(&self) -> bool {
        self.use_case.is_some() && self.charging_steps > 0
    }

    /// Energy charged during the event (kWh).
    pub fn charging_demand(&self, battery_capacity: f64) -> f64 {
        (self.soc_end - self.soc_start).max(0.0) * battery_capacity
    }

    /// Energy consumed from the battery during the event (kWh).
    pub fn consumption(&self, battery_capacity: f64) -> f64 {
        (self.soc_start - self.soc_end).max(0.0) * battery_capacity
    }
}

/// Drops the lead week from an event log and rebases steps onto the
/// reported period.
///
/// An event straddling the boundary is clipped to its reported part. Charging
/// runs at the start of an event, so only the charging steps after the
/// boundary are kept and `soc_start` is raised by the energy delivered
/// before it.
pub fn trim_lead(events: &[EventRecord], battery_capacity: f64, clock: &SimClock) -> Vec<EventRecord> {
    let lead = clock.lead_steps();
    events
        .iter()
        .filter(|e| e.end() > lead)
        .map(|e| {
            let start = e.start.max(lead);
            let duration = e.end() - start;
            let mut trimmed = EventRecord {
                timestamp: clock.timestamp(start),
                start: start - lead,
                duration,
                ..e.clone()
            };
            let before = lead.saturating_sub(e.start).min(e.charging_steps);
            if before > 0 {
                trimmed.charging_steps = e.charging_steps - before;
                if trimmed.charging_steps == 0 {
                    trimmed.soc_start = e.soc_end;
                    trimmed.use_case = None;
                    trimmed.avg_power = 0.0;
                    trimmed.rated_power = 0.0;
                } else if battery_capacity > 0.0 {
                    let energy = e.avg_power * before as f64 * clock.step_hours();
                    trimmed.soc_start = (e.soc_start + energy / battery_capacity).min(e.soc_end);
                }
            }
            trimmed
        })
        .collect()
}

/// A simulated vehicle and its event log.
#[derive(Debug, Clone)]
pub struct Vehicle {
    name: String,
    car_type: Arc<CarType>,
    soc: f64,
    location: Location,
    user_group: UserGroup,
    /// Rated power of the home charge point; zero if none.
    home_power: f64,
    /// Rated power of the work charge point; zero if none.
    work_power: f64,
    private_only: bool,
    events: Vec<EventRecord>,
}

impl Vehicle {
    /// Creates a vehicle parked at home.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if `soc` lies outside `[soc_floor, 1]`.
    pub fn new(
        car_type: Arc<CarType>,
        number: usize,
        soc: f64,
        user_group: UserGroup,
        home_power: f64,
        work_power: f64,
        private_only: bool,
    ) -> Result<Self, SimError> {
        if !(car_type.soc_floor()..=1.0).contains(&soc) {
            return Err(SimError::config(format!(
                "initial SoC {soc} outside [{}, 1] for {}",
                car_type.soc_floor(),
                car_type.name
            )));
        }
        Ok(Self {
            name: format!("{}_{number:05}", car_type.name),
            car_type,
            soc,
            location: Location::Parked(Purpose::Home),
            user_group,
            home_power,
            work_power,
            private_only,
            events: Vec::new(),
        })
    }

    /// Samples private charge points and the user group, then creates the vehicle.
    ///
    /// The initial SoC is raised to the car type's floor if needed.
    pub fn build<R: Rng + ?Sized>(
        car_type: Arc<CarType>,
        number: usize,
        params: &SimParams,
        charging: &ChargingPowerTable,
        private_only: bool,
        rng: &mut R,
    ) -> Result<Self, SimError> {
        let home_power = charging.sample_slow(Purpose::Home, rng);
        let work_power = charging.sample_slow(Purpose::Work, rng);
        let home_access = rng.random::<f64>() < params.user_groups.home_private;
        let work_access = rng.random::<f64>() < params.user_groups.work_private;
        let user_group = UserGroup::new(
            home_access && home_power > 0.0,
            work_access && work_power > 0.0,
            &params.user_groups,
        );
        let soc = params.initial_soc.clamp(car_type.soc_floor(), 1.0);
        Self::new(
            car_type,
            number,
            soc,
            user_group,
            home_power,
            work_power,
            private_only,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn car_type(&self) -> &Arc<CarType> {
        &self.car_type
    }

    pub fn soc(&self) -> f64 {
        self.soc
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn user_group(&self) -> &UserGroup {
        &self.user_group
    }

    pub fn private_only(&self) -> bool {
        self.private_only
    }

    /// Rated power of the private charge point at `purpose`, if the owner can use it.
    pub fn private_power(&self, purpose: Purpose) -> Option<f64> {
        match purpose {
            Purpose::Home if self.user_group.has_home() => Some(self.home_power),
            Purpose::Work if self.user_group.has_work() => Some(self.work_power),
            _ => None,
        }
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub fn into_events(self) -> Vec<EventRecord> {
        self.events
    }

    /// Kilometres the battery covers before reaching the SoC floor.
    pub fn remaining_range(&self, highway: bool) -> f64 {
        (self.soc - self.car_type.soc_floor()).max(0.0) * self.car_type.battery_capacity
            / self.car_type.consumption_per_km(highway)
    }

    /// Logs an idle stop at the trip's parking location.
    pub fn park(&mut self, trip: &Trip, clock: &SimClock) {
        self.location = trip.location;
        let event = EventRecord::idle(clock, trip.park_start, trip.park_time, trip.location, self.soc);
        self.events.push(event);
    }

    /// Charges during the trip's parking window and logs one event.
    ///
    /// Slow charging targets a full battery; fast charging targets a SoC
    /// drawn from the HPC target range. A no-op charge is logged as a park.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] when fast charging is requested for a car
    /// type without fast-charging capability.
    #[allow(clippy::too_many_arguments)]
    pub fn charge<R: Rng + ?Sized>(
        &mut self,
        trip: &Trip,
        station_power: f64,
        kind: ChargingKind,
        use_case: UseCase,
        hpc: &HpcParams,
        clock: &SimClock,
        rng: &mut R,
    ) -> Result<ChargingOutcome, SimError> {
        self.location = trip.location;
        let outcome = self.solve_charge(
            station_power,
            kind,
            trip.park_time,
            self.car_type.min_charging_energy.get(use_case),
            hpc,
            clock,
            rng,
        )?;
        let mut event = EventRecord::idle(clock, trip.park_start, trip.park_time, trip.location, self.soc);
        if !outcome.is_noop() {
            event.use_case = Some(use_case);
            event.soc_end = outcome.soc_end;
            event.avg_power = outcome.avg_power;
            event.rated_power = station_power;
            event.charging_steps = outcome.time_steps;
            self.soc = outcome.soc_end;
        }
        self.events.push(event);
        Ok(outcome)
    }

    /// Fast-charges at an HPC hub starting at `start` for at most
    /// `max_time_steps` and logs a hub event covering the charging time.
    ///
    /// No minimum-energy threshold applies. A no-op is not logged.
    #[allow(clippy::too_many_arguments)]
    pub fn charge_hpc<R: Rng + ?Sized>(
        &mut self,
        start: usize,
        max_time_steps: usize,
        station_power: f64,
        use_case: UseCase,
        hpc: &HpcParams,
        clock: &SimClock,
        rng: &mut R,
    ) -> Result<ChargingOutcome, SimError> {
        self.location = Location::Hub;
        let outcome = self.solve_charge(
            station_power,
            ChargingKind::Fast,
            max_time_steps,
            0.0,
            hpc,
            clock,
            rng,
        )?;
        if !outcome.is_noop() {
            let mut event = EventRecord::idle(clock, start, outcome.time_steps, Location::Hub, self.soc);
            event.use_case = Some(use_case);
            event.soc_end = outcome.soc_end;
            event.avg_power = outcome.avg_power;
            event.rated_power = station_power;
            event.charging_steps = outcome.time_steps;
            self.events.push(event);
            self.soc = outcome.soc_end;
        }
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn solve_charge<R: Rng + ?Sized>(
        &self,
        station_power: f64,
        kind: ChargingKind,
        max_time_steps: usize,
        min_energy: f64,
        hpc: &HpcParams,
        clock: &SimClock,
        rng: &mut R,
    ) -> Result<ChargingOutcome, SimError> {
        let flat = ChargingCurve::flat();
        let (target, vehicle_power, curve) = match kind {
            ChargingKind::Slow => (1.0, self.car_type.charging_capacity.slow, &flat),
            ChargingKind::Fast => {
                if self.car_type.charging_capacity.fast <= 0.0 {
                    return Err(SimError::config(format!(
                        "car type {} cannot fast charge",
                        self.car_type.name
                    )));
                }
                (
                    rng.random_range(hpc.soc_target_min..=hpc.soc_target_max),
                    self.car_type.charging_capacity.fast,
                    &self.car_type.charging_curve,
                )
            }
        };
        let request = ChargingRequest {
            soc_start: self.soc,
            soc_target: target,
            battery_capacity: self.car_type.battery_capacity,
            vehicle_power,
            station_power,
            max_time_steps,
            min_energy,
        };
        Ok(solve(&request, curve, clock.step_hours()))
    }

    /// Drives `distance_km` starting at `start` and logs one drive event.
    ///
    /// Returns `Ok(false)` without changing state when a BEV lacks the range;
    /// a PHEV always arrives, its battery stopping at empty.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::SocIntegrity`] if a BEV would end below its floor.
    pub fn drive(
        &mut self,
        distance_km: f64,
        start: usize,
        duration: usize,
        destination: Location,
        highway: bool,
        clock: &SimClock,
    ) -> Result<bool, SimError> {
        let floor = self.car_type.soc_floor();
        let used = distance_km * self.car_type.consumption_per_km(highway) / self.car_type.battery_capacity;
        let soc_end = match self.car_type.kind {
            VehicleKind::Bev => {
                if distance_km > self.remaining_range(highway) + SOC_EPS {
                    return Ok(false);
                }
                let soc_end = self.soc - used;
                if soc_end < floor - SOC_EPS {
                    return Err(SimError::SocIntegrity {
                        vehicle: self.name.clone(),
                        soc: soc_end,
                        soc_min: floor,
                    });
                }
                soc_end.max(floor)
            }
            VehicleKind::Phev => (self.soc - used).max(0.0),
        };
        let mut event = EventRecord::idle(clock, start, duration, Location::Driving, self.soc);
        event.soc_end = soc_end;
        event.distance_km = distance_km;
        self.events.push(event);
        self.soc = soc_end;
        self.location = destination;
        Ok(true)
    }
}
