//! Regions, their shared type tables, and the regional grid time series.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::location::UseCase;
use super::probability::ProbabilityTables;
use super::vehicle::Vehicle;
use crate::error::SimError;

/// Probability tables shared by every region of one settlement type.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionType {
    pub name: String,
    pub tables: ProbabilityTables,
}

/// One input row: a region, its type and its real fleet per car type.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSpec {
    pub id: String,
    pub region_type: String,
    pub car_counts: BTreeMap<String, u32>,
}

/// Real and simulated vehicle counts of one car type in a region.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetEntry {
    pub car_type: String,
    pub real: u32,
    pub simulated: u32,
}

impl FleetEntry {
    /// Factor that scales one simulated vehicle up to the real fleet.
    pub fn scaling(&self) -> f64 {
        if self.simulated == 0 {
            0.0
        } else {
            f64::from(self.real) / f64::from(self.simulated)
        }
    }
}

/// Aggregated charging load of a region: steps by columns.
///
/// Columns are the total power, one power column per use case, then one
/// vehicle-count column per use case and rated-power class.
#[derive(Debug, Clone, PartialEq)]
pub struct GridTimeSeries {
    steps: usize,
    power_classes: Vec<f64>,
    width: usize,
    data: Vec<f64>,
}

impl GridTimeSeries {
    pub fn new(steps: usize, power_classes: Vec<f64>) -> Self {
        let width = 1 + UseCase::ALL.len() * (1 + power_classes.len());
        Self {
            steps,
            power_classes,
            width,
            data: vec![0.0; steps * width],
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn power_classes(&self) -> &[f64] {
        &self.power_classes
    }

    /// Column headers in storage order.
    pub fn columns(&self) -> Vec<String> {
        let mut cols = vec!["total_power_kw".to_string()];
        cols.extend(UseCase::ALL.iter().map(|uc| format!("{uc}_power_kw")));
        for uc in UseCase::ALL {
            for p in &self.power_classes {
                cols.push(format!("{uc}_{p}kw_cars"));
            }
        }
        cols
    }

    pub fn row(&self, step: usize) -> &[f64] {
        &self.data[step * self.width..(step + 1) * self.width]
    }

    pub fn total_power(&self, step: usize) -> f64 {
        self.data[step * self.width]
    }

    pub fn use_case_power(&self, step: usize, use_case: UseCase) -> f64 {
        self.data[step * self.width + 1 + use_case.index()]
    }

    pub fn vehicle_count(&self, step: usize, use_case: UseCase, class: usize) -> f64 {
        self.data[step * self.width + self.count_column(use_case, class)]
    }

    /// Index of the smallest class at or above `rated_power`; the largest
    /// class if none is.
    pub fn power_class(&self, rated_power: f64) -> usize {
        self.power_classes
            .iter()
            .position(|p| *p >= rated_power - 1e-9)
            .unwrap_or(self.power_classes.len().saturating_sub(1))
    }

    fn count_column(&self, use_case: UseCase, class: usize) -> usize {
        1 + UseCase::ALL.len() + use_case.index() * self.power_classes.len() + class
    }

    /// Adds a charging event's scaled power to steps `t_start..t_end` and
    /// counts the vehicle once at `t_start`. Steps past the end are dropped.
    pub fn update_grid_timeseries(
        &mut self,
        use_case: UseCase,
        avg_power: f64,
        rated_power: f64,
        t_start: usize,
        t_end: usize,
        scaling: f64,
    ) {
        let power = avg_power * scaling;
        let uc_col = 1 + use_case.index();
        for step in t_start..t_end.min(self.steps) {
            let base = step * self.width;
            self.data[base] += power;
            self.data[base + uc_col] += power;
        }
        if t_start < self.steps && !self.power_classes.is_empty() {
            let col = self.count_column(use_case, self.power_class(rated_power));
            self.data[t_start * self.width + col] += scaling;
        }
    }

    /// Adds another series of the same shape element-wise.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if the shapes or power classes differ.
    pub fn merge(&mut self, other: &GridTimeSeries) -> Result<(), SimError> {
        if self.steps != other.steps || self.power_classes != other.power_classes {
            return Err(SimError::config("cannot merge grid series of different shapes"));
        }
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
        Ok(())
    }
}

/// A simulated region: fleet, shared tables, and accumulated grid load.
#[derive(Debug, Clone)]
pub struct Region {
    id: String,
    number: usize,
    region_type: Arc<RegionType>,
    fleet: Vec<FleetEntry>,
    grid: GridTimeSeries,
}

impl Region {
    /// Creates a region simulating `sample_share` of its real fleet.
    ///
    /// Every car type with real vehicles gets at least one simulated vehicle.
    pub fn new(
        spec: &RegionSpec,
        number: usize,
        region_type: Arc<RegionType>,
        sample_share: f64,
        grid: GridTimeSeries,
    ) -> Self {
        let fleet = spec
            .car_counts
            .iter()
            .filter(|(_, real)| **real > 0)
            .map(|(car_type, &real)| FleetEntry {
                car_type: car_type.clone(),
                real,
                simulated: ((f64::from(real) * sample_share).round() as u32).clamp(1, real),
            })
            .collect();
        Self {
            id: spec.id.clone(),
            number,
            region_type,
            fleet,
            grid,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn region_type(&self) -> &Arc<RegionType> {
        &self.region_type
    }

    pub fn fleet(&self) -> &[FleetEntry] {
        &self.fleet
    }

    pub fn grid(&self) -> &GridTimeSeries {
        &self.grid
    }

    pub fn into_grid(self) -> GridTimeSeries {
        self.grid
    }

    /// Scatters every charging event of a finished vehicle into the grid.
    pub fn add_vehicle_events(&mut self, vehicle: &Vehicle, scaling: f64) {
        for event in vehicle.events().iter().filter(|e| e.is_charging()) {
            if let Some(use_case) = event.use_case {
                self.grid.update_grid_timeseries(
                    use_case,
                    event.avg_power,
                    event.rated_power,
                    event.start,
                    event.start + event.charging_steps,
                    scaling,
                );
            }
        }
    }
}
