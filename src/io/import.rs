//! CSV loaders for car types, regions and region-type probability tables.
//!
//! Region-type tables live in one directory per region type:
//!
//! | file                 | columns                                          |
//! |----------------------|--------------------------------------------------|
//! | `trip_starts.csv`    | `weekday,time,value`                             |
//! | `purpose.csv`        | `weekday,time,work,business,...,home`            |
//! | `distance.csv`       | `purpose,value,weight` (km)                      |
//! | `speed.csv`          | `purpose,value,weight` (km/h)                    |
//! | `stand.csv`          | `purpose,value,weight` (hours)                   |
//! | `charging_power.csv` | `location,power,weight`                          |
//!
//! The two time series are weekly profiles (`weekday` 0 = Monday, `time` as
//! `HH:MM`) and are expanded onto the run horizon; each step takes the latest
//! profile row at or before its time of week, wrapping around the week.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Datelike, NaiveTime, Timelike};
use serde::Deserialize;
use tracing::debug;

use crate::config::InputsConfig;
use crate::error::SimError;
use crate::sim::charging::{ChargingCurve, Interpolation};
use crate::sim::clock::SimClock;
use crate::sim::location::{Purpose, UseCase};
use crate::sim::orchestrator::SimulationInputs;
use crate::sim::probability::{
    ChargingPowerTable, Distribution, ProbabilityTables, PurposeDistributions, PurposeTable,
    TripStartSeries,
};
use crate::sim::region::{RegionSpec, RegionType};
use crate::sim::vehicle::{CarType, ChargingCapacity, MinChargingEnergy, VehicleKind};

const MINUTES_PER_WEEK: u32 = 7 * 24 * 60;

fn input_error(path: &Path, detail: impl Into<String>) -> SimError {
    SimError::Input {
        path: path.to_path_buf(),
        detail: detail.into(),
    }
}

fn reader(path: &Path) -> Result<csv::Reader<File>, SimError> {
    let file = File::open(path).map_err(|e| input_error(path, e.to_string()))?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, SimError> {
    let mut rdr = reader(path)?;
    let rows = rdr
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(|e| input_error(path, e.to_string()))?;
    if rows.is_empty() {
        return Err(input_error(path, "no rows"));
    }
    Ok(rows)
}

/// One row of the car-type technical data table.
#[derive(Debug, Deserialize)]
struct TechRow {
    name: String,
    #[serde(default)]
    kind: Option<String>,
    battery_capacity: f64,
    energy_consumption: f64,
    max_charging_capacity_slow: f64,
    max_charging_capacity_fast: f64,
    #[serde(default)]
    soc_min: Option<f64>,
    #[serde(default)]
    charging_threshold: Option<f64>,
    #[serde(default)]
    highway_factor: Option<f64>,
    #[serde(default)]
    min_charging_energy_private: Option<f64>,
    #[serde(default)]
    min_charging_energy_public: Option<f64>,
    #[serde(default)]
    min_charging_energy_fast: Option<f64>,
    /// Charging curve as `soc:factor` pairs separated by `;`.
    #[serde(default)]
    charging_curve: Option<String>,
}

fn parse_curve(spec: &str) -> Result<ChargingCurve, SimError> {
    let knots = spec
        .split(';')
        .filter(|s| !s.trim().is_empty())
        .map(|pair| {
            let (soc, factor) = pair
                .split_once(':')
                .ok_or_else(|| SimError::config(format!("malformed curve knot \"{pair}\"")))?;
            let parse = |s: &str| {
                s.trim()
                    .parse::<f64>()
                    .map_err(|e| SimError::config(format!("curve knot \"{pair}\": {e}")))
            };
            Ok((parse(soc)?, parse(factor)?))
        })
        .collect::<Result<Vec<_>, SimError>>()?;
    ChargingCurve::new(knots, Interpolation::Linear)
}

impl TechRow {
    fn into_car_type(self) -> Result<CarType, SimError> {
        let kind = match &self.kind {
            Some(k) if !k.trim().is_empty() => k.parse()?,
            _ if self.name.to_ascii_lowercase().contains("phev") => VehicleKind::Phev,
            _ => VehicleKind::Bev,
        };
        let mut car = CarType::new(
            self.name,
            kind,
            self.battery_capacity,
            self.energy_consumption,
            ChargingCapacity {
                slow: self.max_charging_capacity_slow,
                fast: self.max_charging_capacity_fast,
            },
        )?;
        if self.soc_min.is_some() || self.charging_threshold.is_some() {
            let soc_min = self.soc_min.unwrap_or(car.soc_min);
            let threshold = self.charging_threshold.unwrap_or(car.charging_threshold);
            car = car.with_soc_limits(soc_min, threshold)?;
        }
        if let Some(factor) = self.highway_factor {
            car = car.with_highway_factor(factor)?;
        }
        let defaults = MinChargingEnergy::default();
        car = car.with_min_charging_energy(MinChargingEnergy::by_group(
            self.min_charging_energy_private
                .unwrap_or(defaults.get(UseCase::Home)),
            self.min_charging_energy_public
                .unwrap_or(defaults.get(UseCase::Street)),
            self.min_charging_energy_fast
                .unwrap_or(defaults.get(UseCase::UrbanFast)),
        ));
        if let Some(spec) = self.charging_curve.filter(|s| !s.trim().is_empty()) {
            car = car.with_charging_curve(parse_curve(&spec)?);
        }
        Ok(car)
    }
}

/// Loads car types keyed by name.
///
/// Missing `kind` values are inferred from the name (`phev` in the name
/// means plug-in hybrid).
///
/// # Errors
///
/// Returns [`SimError::Input`] for unreadable or invalid rows and duplicate
/// names.
pub fn load_tech_data(path: &Path) -> Result<BTreeMap<String, Arc<CarType>>, SimError> {
    let mut out = BTreeMap::new();
    for row in read_rows::<TechRow>(path)? {
        let car = row
            .into_car_type()
            .map_err(|e| input_error(path, e.to_string()))?;
        if out.contains_key(&car.name) {
            return Err(input_error(path, format!("duplicate car type {}", car.name)));
        }
        out.insert(car.name.clone(), Arc::new(car));
    }
    Ok(out)
}

/// Loads the region table: `region_id,region_type` followed by one vehicle
/// count column per car type.
///
/// # Errors
///
/// Returns [`SimError::Input`] for missing columns, duplicate ids or
/// non-integer counts.
pub fn load_regions(path: &Path) -> Result<Vec<RegionSpec>, SimError> {
    let mut rdr = reader(path)?;
    let headers = rdr.headers()?.clone();
    if headers.len() < 3 || &headers[0] != "region_id" || &headers[1] != "region_type" {
        return Err(input_error(
            path,
            "expected columns region_id,region_type,<car type>...",
        ));
    }
    let mut regions: Vec<RegionSpec> = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| input_error(path, e.to_string()))?;
        let id = record.get(0).unwrap_or_default().to_string();
        if regions.iter().any(|r| r.id == id) {
            return Err(input_error(path, format!("duplicate region {id}")));
        }
        let mut car_counts = BTreeMap::new();
        for (name, value) in headers.iter().zip(record.iter()).skip(2) {
            let count: u32 = value
                .parse()
                .map_err(|_| input_error(path, format!("region {id}: bad count \"{value}\" for {name}")))?;
            car_counts.insert(name.to_string(), count);
        }
        regions.push(RegionSpec {
            id,
            region_type: record.get(1).unwrap_or_default().to_string(),
            car_counts,
        });
    }
    if regions.is_empty() {
        return Err(input_error(path, "no regions"));
    }
    Ok(regions)
}

fn minute_of_week(path: &Path, weekday: u32, time: &str) -> Result<u32, SimError> {
    if weekday > 6 {
        return Err(input_error(path, format!("weekday {weekday} out of range 0..=6")));
    }
    let t = NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|e| input_error(path, format!("time \"{time}\": {e}")))?;
    Ok(weekday * 1440 + t.hour() * 60 + t.minute())
}

/// Expands a sorted weekly profile onto every step of the clock.
fn expand_weekly<T: Clone>(profile: &[(u32, T)], clock: &SimClock) -> Vec<T> {
    (0..clock.total_steps())
        .map(|step| {
            let ts = clock.timestamp(step);
            let mow = (ts.weekday().num_days_from_monday() * 1440 + ts.hour() * 60 + ts.minute())
                % MINUTES_PER_WEEK;
            let idx = profile.partition_point(|(m, _)| *m <= mow);
            let idx = if idx == 0 { profile.len() - 1 } else { idx - 1 };
            profile[idx].1.clone()
        })
        .collect()
}

fn sorted_profile<T>(path: &Path, mut profile: Vec<(u32, T)>) -> Result<Vec<(u32, T)>, SimError> {
    profile.sort_by_key(|(m, _)| *m);
    if profile.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err(input_error(path, "duplicate time of week"));
    }
    Ok(profile)
}

#[derive(Debug, Deserialize)]
struct TripStartRow {
    weekday: u32,
    time: String,
    value: f64,
}

fn load_trip_starts(path: &Path, clock: &SimClock) -> Result<TripStartSeries, SimError> {
    let profile = read_rows::<TripStartRow>(path)?
        .into_iter()
        .map(|r| Ok((minute_of_week(path, r.weekday, &r.time)?, r.value)))
        .collect::<Result<Vec<_>, SimError>>()?;
    let profile = sorted_profile(path, profile)?;
    TripStartSeries::from_counts(expand_weekly(&profile, clock)).map_err(|e| input_error(path, e.to_string()))
}

fn load_purposes(path: &Path, clock: &SimClock) -> Result<PurposeTable, SimError> {
    let mut rdr = reader(path)?;
    let headers = rdr.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let (Some(weekday_col), Some(time_col)) = (column("weekday"), column("time")) else {
        return Err(input_error(path, "expected weekday and time columns"));
    };
    let mut purpose_cols = [0usize; 7];
    for p in Purpose::ALL {
        purpose_cols[p.index()] = headers
            .iter()
            .position(|h| h.parse::<Purpose>().is_ok_and(|hp| hp == p))
            .ok_or_else(|| input_error(path, format!("missing column for {p}")))?;
    }

    let mut profile = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| input_error(path, e.to_string()))?;
        let field = |i: usize| record.get(i).unwrap_or_default();
        let weekday: u32 = field(weekday_col)
            .parse()
            .map_err(|_| input_error(path, format!("bad weekday \"{}\"", field(weekday_col))))?;
        let mow = minute_of_week(path, weekday, field(time_col))?;
        let mut row = [0.0; 7];
        for (slot, col) in row.iter_mut().zip(purpose_cols) {
            *slot = field(col)
                .parse()
                .map_err(|_| input_error(path, format!("bad weight \"{}\"", field(col))))?;
        }
        profile.push((mow, row));
    }
    if profile.is_empty() {
        return Err(input_error(path, "no rows"));
    }
    let profile = sorted_profile(path, profile)?;
    PurposeTable::new(expand_weekly(&profile, clock)).map_err(|e| input_error(path, e.to_string()))
}

#[derive(Debug, Deserialize)]
struct WeightedRow {
    #[serde(alias = "location")]
    purpose: String,
    #[serde(alias = "power")]
    value: f64,
    weight: f64,
}

fn group_weighted(path: &Path) -> Result<BTreeMap<String, Vec<(f64, f64)>>, SimError> {
    let mut groups: BTreeMap<String, Vec<(f64, f64)>> = BTreeMap::new();
    for row in read_rows::<WeightedRow>(path)? {
        let key = match row.purpose.parse::<Purpose>() {
            Ok(p) => p.as_str().to_string(),
            Err(_) => row.purpose.trim().to_ascii_lowercase(),
        };
        groups.entry(key).or_default().push((row.value, row.weight));
    }
    Ok(groups)
}

fn load_purpose_distributions(path: &Path, what: &str) -> Result<PurposeDistributions, SimError> {
    let mut groups = group_weighted(path)?;
    let mut failure = None;
    let dists = PurposeDistributions::new(what, |p| {
        let pairs = groups.remove(p.as_str())?;
        Distribution::new(pairs)
            .map_err(|e| failure = Some(format!("{p}: {e}")))
            .ok()
    });
    if let Some(detail) = failure {
        return Err(input_error(path, detail));
    }
    dists.map_err(|e| input_error(path, e.to_string()))
}

fn load_charging_power(path: &Path) -> Result<ChargingPowerTable, SimError> {
    let mut groups = group_weighted(path)?;
    let mut take = |key: &str| {
        groups
            .remove(key)
            .ok_or_else(|| input_error(path, format!("no rows for {key}")))
            .and_then(|pairs| Distribution::new(pairs).map_err(|e| input_error(path, format!("{key}: {e}"))))
    };
    let urban_fast = take("urban_fast")?;
    let highway_fast = take("highway_fast")?;
    let mut slow_dists: [Option<Distribution>; 7] = Default::default();
    for p in Purpose::ALL {
        slow_dists[p.index()] = Some(take(p.as_str())?);
    }
    let slow = PurposeDistributions::new("charging", |p| slow_dists[p.index()].take())?;
    ChargingPowerTable::new(slow, urban_fast, highway_fast).map_err(|e| input_error(path, e.to_string()))
}

/// Loads the tables of one region type from `dir`.
///
/// # Errors
///
/// Returns [`SimError::Input`] naming the offending file.
pub fn load_region_type(name: &str, dir: &Path, clock: &SimClock) -> Result<RegionType, SimError> {
    let tables = ProbabilityTables {
        trip_starts: load_trip_starts(&dir.join("trip_starts.csv"), clock)?,
        purposes: load_purposes(&dir.join("purpose.csv"), clock)?,
        distance: load_purpose_distributions(&dir.join("distance.csv"), "distance")?,
        speed: load_purpose_distributions(&dir.join("speed.csv"), "speed")?,
        stand: load_purpose_distributions(&dir.join("stand.csv"), "stand")?,
        charging: load_charging_power(&dir.join("charging_power.csv"))?,
    };
    Ok(RegionType {
        name: name.to_string(),
        tables,
    })
}

/// Loads every region type under `root`, one subdirectory each.
pub fn load_region_types(
    root: &Path,
    clock: &SimClock,
) -> Result<BTreeMap<String, Arc<RegionType>>, SimError> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)
        .map_err(|e| input_error(root, e.to_string()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    let mut out = BTreeMap::new();
    for dir in dirs {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        debug!(region_type = %name, "loading tables");
        let region_type = load_region_type(&name, &dir, clock)?;
        out.insert(name, Arc::new(region_type));
    }
    if out.is_empty() {
        return Err(input_error(root, "no region-type directories"));
    }
    Ok(out)
}

/// Loads all configured inputs.
///
/// # Errors
///
/// Returns [`SimError::Config`] if a path is missing, otherwise the first
/// loader error.
pub fn load_inputs(inputs: &InputsConfig, clock: &SimClock) -> Result<SimulationInputs, SimError> {
    let path = |p: &Option<PathBuf>, field: &str| {
        p.clone()
            .ok_or_else(|| SimError::config(format!("inputs.{field} is not set")))
    };
    Ok(SimulationInputs {
        car_types: load_tech_data(&path(&inputs.tech_data, "tech_data")?)?,
        regions: load_regions(&path(&inputs.regions, "regions")?)?,
        region_types: load_region_types(&path(&inputs.region_types, "region_types")?, clock)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets;
    use crate::sim::types::TripLimits;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn weighted(rows: &[(&str, f64, f64)], key: &str) -> String {
        let mut s = format!("{key},value,weight\n");
        for (k, v, w) in rows {
            s.push_str(&format!("{k},{v},{w}\n"));
        }
        s
    }

    fn write_region_type(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        write(
            dir,
            "trip_starts.csv",
            "weekday,time,value\n0,00:00,0.1\n0,07:00,1.0\n0,19:00,0.2\n",
        );
        write(
            dir,
            "purpose.csv",
            "weekday,time,0_work,1_business,2_school,3_shopping,4_private/ridesharing,5_leisure,6_home\n\
             0,00:00,1,0,0,1,0,1,2\n",
        );
        let per_purpose = |pairs: &[(f64, f64)]| {
            let rows: Vec<(&str, f64, f64)> = Purpose::ALL
                .iter()
                .flat_map(|p| pairs.iter().map(move |(v, w)| (p.as_str(), *v, *w)))
                .collect();
            weighted(&rows, "purpose")
        };
        write(dir, "distance.csv", &per_purpose(&[(3.0, 1.0), (12.0, 1.0)]));
        write(dir, "speed.csv", &per_purpose(&[(30.0, 1.0)]));
        write(dir, "stand.csv", &per_purpose(&[(1.0, 1.0), (4.0, 1.0)]));
        let mut charging: Vec<(&str, f64, f64)> =
            Purpose::ALL.iter().map(|p| (p.as_str(), 11.0, 1.0)).collect();
        charging.push(("urban_fast", 50.0, 1.0));
        charging.push(("highway_fast", 150.0, 1.0));
        write(dir, "charging_power.csv", &weighted(&charging, "location").replace("value", "power"));
    }

    #[test]
    fn tech_data_infers_kind_and_applies_overrides() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            tmp.path(),
            "tech.csv",
            "name,battery_capacity,energy_consumption,max_charging_capacity_slow,max_charging_capacity_fast,soc_min\n\
             bev_small,40,0.16,11,50,0.1\n\
             phev_mid,12,0.2,3.7,0,\n",
        );
        let cars = load_tech_data(&path).unwrap();
        assert_eq!(cars["bev_small"].kind, VehicleKind::Bev);
        assert_eq!(cars["bev_small"].soc_min, 0.1);
        assert_eq!(cars["phev_mid"].kind, VehicleKind::Phev);
        assert_eq!(cars["phev_mid"].soc_min, 0.2);
    }

    #[test]
    fn tech_data_rejects_bad_capacity() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            tmp.path(),
            "tech.csv",
            "name,battery_capacity,energy_consumption,max_charging_capacity_slow,max_charging_capacity_fast\n\
             bev_bad,0,0.16,11,50\n",
        );
        assert!(matches!(load_tech_data(&path), Err(SimError::Input { .. })));
    }

    #[test]
    fn regions_read_dynamic_car_columns() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            tmp.path(),
            "regions.csv",
            "region_id,region_type,bev_small,phev_mid\nr1,city,10,2\nr2,city,0,4\n",
        );
        let regions = load_regions(&path).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].car_counts["bev_small"], 10);
        assert_eq!(regions[1].car_counts["phev_mid"], 4);

        let dup = write(tmp.path(), "dup.csv", "region_id,region_type,a\nr1,c,1\nr1,c,2\n");
        assert!(load_regions(&dup).is_err());
    }

    #[test]
    fn weekly_profile_wraps_to_previous_week() {
        let clock = presets::demo_clock(1).unwrap();
        // demo clock starts on a Monday
        let profile = vec![(7 * 60, 1.0), (19 * 60, 2.0)];
        let series = expand_weekly(&profile, &clock);
        assert_eq!(series.len(), clock.total_steps());
        assert_eq!(series[0], 2.0);
        assert_eq!(series[7 * 4], 1.0);
        assert_eq!(series[19 * 4], 2.0);
    }

    #[test]
    fn region_type_tables_load_and_validate() {
        let tmp = TempDir::new().unwrap();
        write_region_type(&tmp.path().join("city"));
        let clock = presets::demo_clock(1).unwrap();
        let types = load_region_types(tmp.path(), &clock).unwrap();
        let city = &types["city"];
        city.tables
            .validate(clock.total_steps(), &TripLimits::default())
            .unwrap();
        assert_eq!(city.tables.charging.power_levels(), vec![11.0, 50.0, 150.0]);
    }

    #[test]
    fn missing_table_names_the_file() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("city");
        write_region_type(&dir);
        fs::remove_file(dir.join("speed.csv")).unwrap();
        let clock = presets::demo_clock(1).unwrap();
        match load_region_types(tmp.path(), &clock) {
            Err(SimError::Input { path, .. }) => assert!(path.ends_with("speed.csv")),
            other => panic!("expected input error, got {other:?}"),
        }
    }
}
