//! Post-hoc statistics over reported event logs and grid series.

use std::fmt;

use serde::Serialize;

use super::location::{Location, UseCase};
use super::region::GridTimeSeries;
use super::vehicle::EventRecord;

/// Min, max and mean of a set of observations; all zero when empty.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub total: f64,
}

impl Stats {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut s = Stats {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            ..Stats::default()
        };
        for v in values {
            s.count += 1;
            s.total += v;
            s.min = s.min.min(v);
            s.max = s.max.max(v);
        }
        if s.count == 0 {
            return Stats::default();
        }
        s.mean = s.total / s.count as f64;
        s
    }
}

/// Per-vehicle driving and charging statistics over the reported period.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleAnalysis {
    pub vehicle: String,
    pub car_type: String,
    /// Distance per drive (km).
    pub drives: Stats,
    /// Energy consumed per drive (kWh).
    pub consumption: Stats,
    /// Charging steps per charging event.
    pub charging_time: Stats,
    /// Energy per charging event (kWh).
    pub charged: Stats,
    /// Charging events at HPC sites, urban and highway.
    pub hpc_events: usize,
    /// Energy charged per use case (kWh), in [`UseCase::ALL`] order.
    pub energy_by_use_case: [f64; 6],
    pub soc_start: f64,
    pub soc_end: f64,
}

impl VehicleAnalysis {
    /// Computes statistics from an event log with the lead week trimmed.
    ///
    /// # Arguments
    ///
    /// * `vehicle` - Vehicle name
    /// * `car_type` - Car type name
    /// * `events` - Reported events in time order
    /// * `battery_capacity` - Battery capacity (kWh) for energy conversion
    pub fn from_events(
        vehicle: &str,
        car_type: &str,
        events: &[EventRecord],
        battery_capacity: f64,
    ) -> Self {
        let drives: Vec<&EventRecord> = events
            .iter()
            .filter(|e| e.location == Location::Driving)
            .collect();
        let charges: Vec<&EventRecord> = events.iter().filter(|e| e.is_charging()).collect();

        let mut energy_by_use_case = [0.0; 6];
        let mut hpc_events = 0;
        for e in &charges {
            if let Some(uc) = e.use_case {
                energy_by_use_case[uc.index()] += e.charging_demand(battery_capacity);
                if uc.is_fast() {
                    hpc_events += 1;
                }
            }
        }

        Self {
            vehicle: vehicle.to_string(),
            car_type: car_type.to_string(),
            drives: Stats::from_values(drives.iter().map(|e| e.distance_km)),
            consumption: Stats::from_values(drives.iter().map(|e| e.consumption(battery_capacity))),
            charging_time: Stats::from_values(charges.iter().map(|e| e.charging_steps as f64)),
            charged: Stats::from_values(charges.iter().map(|e| e.charging_demand(battery_capacity))),
            hpc_events,
            energy_by_use_case,
            soc_start: events.first().map_or(0.0, |e| e.soc_start),
            soc_end: events.last().map_or(0.0, |e| e.soc_end),
        }
    }

    pub fn energy(&self, use_case: UseCase) -> f64 {
        self.energy_by_use_case[use_case.index()]
    }
}

/// Fleet-wide indicators of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub regions: usize,
    pub vehicles: usize,
    /// Vehicles re-run with public charging after a private-only shortfall.
    pub fallbacks: usize,
    /// Scaled energy drawn from the grid over the reported period (kWh).
    pub grid_energy_kwh: f64,
    /// Scaled energy per use case (kWh).
    pub energy_by_use_case: [f64; 6],
    pub peak_power_kw: f64,
    /// Reported step index of the peak.
    pub peak_step: usize,
    pub drive_km: f64,
}

impl RunSummary {
    /// # Arguments
    ///
    /// * `grid` - Merged grid series over the whole horizon
    /// * `vehicles` - Analyses of every simulated vehicle
    /// * `lead_steps` - Steps to skip before the reported period
    /// * `step_hours` - Step length in hours
    pub fn from_results<'a>(
        grid: &GridTimeSeries,
        vehicles: impl IntoIterator<Item = &'a VehicleAnalysis>,
        regions: usize,
        fallbacks: usize,
        lead_steps: usize,
        step_hours: f64,
    ) -> Self {
        let mut energy_by_use_case = [0.0; 6];
        let mut grid_energy_kwh = 0.0;
        let mut peak_power_kw = 0.0;
        let mut peak_step = 0;
        for step in lead_steps..grid.steps() {
            let total = grid.total_power(step);
            grid_energy_kwh += total * step_hours;
            for uc in UseCase::ALL {
                energy_by_use_case[uc.index()] += grid.use_case_power(step, uc) * step_hours;
            }
            if total > peak_power_kw {
                peak_power_kw = total;
                peak_step = step - lead_steps;
            }
        }
        let mut count = 0;
        let mut drive_km = 0.0;
        for v in vehicles {
            count += 1;
            drive_km += v.drives.total;
        }
        Self {
            regions,
            vehicles: count,
            fallbacks,
            grid_energy_kwh,
            energy_by_use_case,
            peak_power_kw,
            peak_step,
            drive_km,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Run Summary ---")?;
        writeln!(f, "Regions:               {}", self.regions)?;
        writeln!(
            f,
            "Vehicles:              {} ({} private-only fallbacks)",
            self.vehicles, self.fallbacks
        )?;
        writeln!(f, "Distance driven:       {:.1} km (simulated)", self.drive_km)?;
        writeln!(f, "Grid energy:           {:.2} kWh (scaled)", self.grid_energy_kwh)?;
        for uc in UseCase::ALL {
            writeln!(
                f,
                "  {:<20} {:.2} kWh",
                uc.as_str(),
                self.energy_by_use_case[uc.index()]
            )?;
        }
        write!(
            f,
            "Peak load:             {:.2} kW at step {}",
            self.peak_power_kw, self.peak_step
        )
    }
}
