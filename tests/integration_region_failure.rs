//! Integration tests for a region that cannot complete its run.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use simbev::error::SimError;
use simbev::presets;
use simbev::sim::orchestrator::SimBev;
use simbev::sim::region::{RegionSpec, RegionType};
use simbev::sim::vehicle::{CarType, ChargingCapacity, VehicleKind};

/// Demo inputs plus a region whose long trips force HPC recovery on a car
/// without fast-charging capability.
fn sim_with_remote_region(threads: usize) -> SimBev {
    let clock = common::default_clock();
    let mut inputs = common::default_inputs(&clock);

    let stranded = CarType::new(
        "bev_no_fast",
        VehicleKind::Bev,
        5.0,
        0.25,
        ChargingCapacity { slow: 3.7, fast: 0.0 },
    )
    .unwrap();
    inputs
        .car_types
        .insert(stranded.name.clone(), Arc::new(stranded));
    inputs.region_types.insert(
        "remote".to_string(),
        Arc::new(RegionType {
            name: "remote".to_string(),
            tables: presets::demo_tables(&clock, 10.0).unwrap(),
        }),
    );
    inputs.regions.insert(
        1,
        RegionSpec {
            id: "region_remote".to_string(),
            region_type: "remote".to_string(),
            car_counts: BTreeMap::from([("bev_no_fast".to_string(), 2)]),
        },
    );

    SimBev::new(common::default_params(42, threads), clock, inputs).unwrap()
}

#[test]
fn failing_region_aborts_the_pool_with_its_error() {
    let err = sim_with_remote_region(3).run_multi().unwrap_err();
    match err {
        SimError::Region { region, source } => {
            assert_eq!(region, "region_remote");
            assert!(matches!(*source, SimError::Config(_)), "unexpected source {source}");
            assert!(source.to_string().contains("bev_no_fast"));
        }
        other => panic!("expected a region error, got {other}"),
    }
}

#[test]
fn failing_region_reports_the_same_error_serially() {
    let serial = sim_with_remote_region(1).run_multi().unwrap_err().to_string();
    let parallel = sim_with_remote_region(4).run_multi().unwrap_err().to_string();
    assert_eq!(serial, parallel);
    assert!(serial.starts_with("region region_remote:"));
}
