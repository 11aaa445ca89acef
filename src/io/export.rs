//! CSV and JSON export of run results.
//!
//! A run directory holds `metadata.json`, `grid_total.csv`, `analysis.csv`
//! and one subdirectory per region with its grid series and, when event
//! logs are kept, one event CSV per vehicle. Every file covers the reported
//! period only.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::ScenarioConfig;
use crate::error::SimError;
use crate::sim::analysis::{RunSummary, VehicleAnalysis};
use crate::sim::clock::SimClock;
use crate::sim::location::UseCase;
use crate::sim::orchestrator::SimulationOutput;
use crate::sim::region::GridTimeSeries;
use crate::sim::vehicle::EventRecord;

/// Column header of per-vehicle event files.
pub const EVENTS_HEADER: &str = "timestamp,event_start,event_time,location,use_case,\
                                 soc_start,soc_end,charging_demand_kwh,consumption_kwh,\
                                 station_power_kw,avg_charging_power_kw,charging_time,distance_km";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Writes a reported event log as CSV.
///
/// # Arguments
///
/// * `events` - Events with the lead week trimmed
/// * `battery_capacity` - Battery capacity (kWh) for energy columns
/// * `writer` - Destination implementing `Write`
///
/// # Errors
///
/// Returns [`SimError::Csv`] if writing fails.
pub fn write_events_csv(
    events: &[EventRecord],
    battery_capacity: f64,
    writer: impl Write,
) -> Result<(), SimError> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(EVENTS_HEADER.split(',').map(str::trim))?;
    for e in events {
        wtr.write_record(&[
            e.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            e.start.to_string(),
            e.duration.to_string(),
            e.location.to_string(),
            e.use_case.map(|uc| uc.to_string()).unwrap_or_default(),
            format!("{:.6}", e.soc_start),
            format!("{:.6}", e.soc_end),
            format!("{:.4}", e.charging_demand(battery_capacity)),
            format!("{:.4}", e.consumption(battery_capacity)),
            format!("{:.2}", e.rated_power),
            format!("{:.4}", e.avg_power),
            e.charging_steps.to_string(),
            format!("{:.3}", e.distance_km),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the reported steps of a grid series as CSV with a timestamp column.
///
/// # Errors
///
/// Returns [`SimError::Csv`] if writing fails.
pub fn write_grid_csv(grid: &GridTimeSeries, clock: &SimClock, writer: impl Write) -> Result<(), SimError> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    let mut header = vec!["timestamp".to_string()];
    header.extend(grid.columns());
    wtr.write_record(&header)?;
    for step in clock.lead_steps()..grid.steps() {
        let mut record = Vec::with_capacity(grid.width() + 1);
        record.push(clock.timestamp(step).format(TIMESTAMP_FORMAT).to_string());
        record.extend(grid.row(step).iter().map(|v| format!("{v:.4}")));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes one row of statistics per vehicle.
///
/// # Errors
///
/// Returns [`SimError::Csv`] if writing fails.
pub fn write_analysis_csv<'a>(
    rows: impl IntoIterator<Item = (&'a str, &'a VehicleAnalysis)>,
    writer: impl Write,
) -> Result<(), SimError> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    let mut header: Vec<String> = [
        "region",
        "vehicle",
        "car_type",
        "drive_count",
        "drive_km_total",
        "drive_km_mean",
        "drive_km_max",
        "consumption_kwh_total",
        "charge_count",
        "hpc_count",
        "charged_kwh_total",
        "charged_kwh_mean",
        "charged_kwh_max",
        "charging_time_mean",
        "charging_time_max",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(UseCase::ALL.iter().map(|uc| format!("{uc}_kwh")));
    header.extend(["soc_start".to_string(), "soc_end".to_string()]);
    wtr.write_record(&header)?;

    for (region, a) in rows {
        let mut record = vec![
            region.to_string(),
            a.vehicle.clone(),
            a.car_type.clone(),
            a.drives.count.to_string(),
            format!("{:.3}", a.drives.total),
            format!("{:.3}", a.drives.mean),
            format!("{:.3}", a.drives.max),
            format!("{:.4}", a.consumption.total),
            a.charged.count.to_string(),
            a.hpc_events.to_string(),
            format!("{:.4}", a.charged.total),
            format!("{:.4}", a.charged.mean),
            format!("{:.4}", a.charged.max),
            format!("{:.2}", a.charging_time.mean),
            format!("{:.0}", a.charging_time.max),
        ];
        record.extend(a.energy_by_use_case.iter().map(|e| format!("{e:.4}")));
        record.push(format!("{:.6}", a.soc_start));
        record.push(format!("{:.6}", a.soc_end));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the scenario and summary as pretty JSON.
///
/// # Errors
///
/// Returns [`SimError::Json`] if serialization or writing fails.
pub fn write_metadata(config: &ScenarioConfig, summary: &RunSummary, writer: impl Write) -> Result<(), SimError> {
    let metadata = serde_json::json!({
        "simbev_version": env!("CARGO_PKG_VERSION"),
        "created": chrono::Local::now().to_rfc3339(),
        "scenario": config,
        "summary": summary,
    });
    serde_json::to_writer_pretty(writer, &metadata)?;
    Ok(())
}

fn create(path: &Path) -> Result<io::BufWriter<File>, SimError> {
    Ok(io::BufWriter::new(File::create(path)?))
}

/// Writes every output file of a run into `dir`, creating it if needed.
///
/// # Errors
///
/// Returns [`SimError::Io`], [`SimError::Csv`] or [`SimError::Json`] if a
/// file cannot be written.
pub fn export_run_to(
    dir: &Path,
    output: &SimulationOutput,
    config: &ScenarioConfig,
    clock: &SimClock,
    summary: &RunSummary,
) -> Result<(), SimError> {
    fs::create_dir_all(dir)?;
    let out = &config.output;

    write_metadata(config, summary, create(&dir.join("metadata.json"))?)?;
    if out.grid_timeseries {
        write_grid_csv(&output.total, clock, create(&dir.join("grid_total.csv"))?)?;
    }
    if out.analysis {
        let rows = output
            .regions
            .iter()
            .flat_map(|r| r.vehicles.iter().map(move |v| (r.id.as_str(), &v.analysis)));
        write_analysis_csv(rows, create(&dir.join("analysis.csv"))?)?;
    }

    for region in &output.regions {
        let region_dir = dir.join(&region.id);
        fs::create_dir_all(&region_dir)?;
        if out.grid_timeseries {
            write_grid_csv(&region.grid, clock, create(&region_dir.join("grid.csv"))?)?;
        }
        if out.vehicle_events {
            for v in region.vehicles.iter().filter(|v| !v.events.is_empty()) {
                let path = region_dir.join(format!("{}_events.csv", v.name));
                write_events_csv(&v.events, v.battery_capacity, create(&path)?)?;
            }
        }
    }
    Ok(())
}

/// Creates a timestamped run directory under the configured output
/// directory and exports into it.
pub fn export_run(
    output: &SimulationOutput,
    config: &ScenarioConfig,
    clock: &SimClock,
    summary: &RunSummary,
) -> Result<PathBuf, SimError> {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H%M%S");
    let dir = config
        .output
        .directory
        .join(format!("{}_{stamp}", config.output.name));
    export_run_to(&dir, output, config, clock, summary)?;
    info!(dir = %dir.display(), "results written");
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::location::{Location, Purpose};

    fn clock() -> SimClock {
        let origin = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        SimClock::from_steps(origin, 60, 2, 6)
    }

    fn charge_event() -> EventRecord {
        EventRecord {
            timestamp: clock().timestamp(0),
            start: 0,
            duration: 3,
            location: Location::Parked(Purpose::Home),
            use_case: Some(UseCase::Home),
            soc_start: 0.5,
            soc_end: 0.7,
            avg_power: 3.0,
            rated_power: 11.0,
            charging_steps: 2,
            distance_km: 0.0,
        }
    }

    #[test]
    fn event_header_and_rows() {
        let mut buf = Vec::new();
        write_events_csv(&[charge_event()], 30.0, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("timestamp,event_start,event_time,location,use_case"));
        assert!(lines[1].starts_with("2024-01-01 00:00:00,0,3,home,home,0.500000,0.700000,6.0000,0.0000"));
    }

    #[test]
    fn grid_csv_skips_lead_steps() {
        let mut grid = GridTimeSeries::new(6, vec![11.0]);
        grid.update_grid_timeseries(UseCase::Work, 4.0, 11.0, 0, 6, 1.0);
        let mut buf = Vec::new();
        write_grid_csv(&grid, &clock(), &mut buf).unwrap();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let headers = rdr.headers().cloned().unwrap();
        assert_eq!(headers.len(), grid.width() + 1);
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[0][0], "2024-01-01 02:00:00");
        assert_eq!(rows[0][1].parse::<f64>().unwrap(), 4.0);
    }

    #[test]
    fn analysis_csv_has_one_row_per_vehicle() {
        let a = VehicleAnalysis::from_events("bev_00000", "bev", &[charge_event()], 30.0);
        let b = VehicleAnalysis::from_events("bev_00001", "bev", &[], 30.0);
        let mut buf = Vec::new();
        write_analysis_csv([("r1", &a), ("r1", &b)], &mut buf).unwrap();
        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let width = rdr.headers().unwrap().len();
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == width));
        assert_eq!(&rows[0][1], "bev_00000");
    }

    #[test]
    fn metadata_is_valid_json() {
        let grid = GridTimeSeries::new(6, vec![11.0]);
        let summary = RunSummary::from_results(&grid, std::iter::empty::<&VehicleAnalysis>(), 0, 0, 2, 1.0);
        let mut buf = Vec::new();
        write_metadata(&ScenarioConfig::demo(), &summary, &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["scenario"]["simulation"]["seed"], 42);
        assert!(value["summary"]["grid_energy_kwh"].is_number());
    }
}
