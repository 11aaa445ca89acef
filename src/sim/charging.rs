//! Charging-curve model and the time-step charging solver.

use crate::error::SimError;

/// Number of equal SoC slices the requested charge is split into.
pub const CURVE_SEGMENTS: usize = 10;

const EPS_MINUTES: f64 = 1e-9;

/// How the curve is evaluated between knots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    /// Holds the value of the previous knot.
    Step,
}

/// Relative charging power accepted by a battery as a function of SoC.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargingCurve {
    soc: Vec<f64>,
    factor: Vec<f64>,
    interpolation: Interpolation,
}

impl ChargingCurve {
    /// Creates a curve from `(soc, factor)` knots.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] unless the knots are strictly increasing
    /// in SoC, cover `[0, 1]`, and the curve stays positive below SoC 1.
    pub fn new(points: Vec<(f64, f64)>, interpolation: Interpolation) -> Result<Self, SimError> {
        if points.len() < 2 {
            return Err(SimError::config("charging curve needs at least two knots"));
        }
        if points.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(SimError::config("charging curve knots must be strictly increasing"));
        }
        let (first, last) = (points[0].0, points[points.len() - 1].0);
        if first > 0.0 || last < 1.0 {
            return Err(SimError::config(format!(
                "charging curve covers [{first}, {last}] instead of [0, 1]"
            )));
        }
        for &(soc, factor) in &points {
            let must_be_positive = soc < 1.0 || interpolation == Interpolation::Step;
            if !factor.is_finite() || factor < 0.0 || (must_be_positive && factor == 0.0) {
                return Err(SimError::config(format!(
                    "charging curve factor {factor} at SoC {soc} is not positive"
                )));
            }
        }
        let (soc, factor) = points.into_iter().unzip();
        Ok(Self {
            soc,
            factor,
            interpolation,
        })
    }

    /// Constant full power, used for AC charging.
    pub fn flat() -> Self {
        Self {
            soc: vec![0.0, 1.0],
            factor: vec![1.0, 1.0],
            interpolation: Interpolation::Step,
        }
    }

    /// Typical DC fast-charging taper, sampled every 10 % SoC.
    pub fn default_fast() -> Self {
        let (soc, factor) = (0..=10)
            .map(|i| {
                let soc = f64::from(i) / 10.0;
                let pct = soc * 100.0;
                let factor = (-0.01339 * pct * pct + 0.7143 * pct + 84.48) / 100.0;
                (soc, factor.min(1.0))
            })
            .unzip();
        Self {
            soc,
            factor,
            interpolation: Interpolation::Linear,
        }
    }

    /// Power factor at `soc`, clamped to the knot range.
    pub fn factor(&self, soc: f64) -> f64 {
        let idx = self.soc.partition_point(|&s| s <= soc);
        if idx == 0 {
            return self.factor[0];
        }
        if idx == self.soc.len() {
            return self.factor[idx - 1];
        }
        match self.interpolation {
            Interpolation::Step => self.factor[idx - 1],
            Interpolation::Linear => {
                let (s0, s1) = (self.soc[idx - 1], self.soc[idx]);
                let (f0, f1) = (self.factor[idx - 1], self.factor[idx]);
                f0 + (f1 - f0) * (soc - s0) / (s1 - s0)
            }
        }
    }
}

/// Inputs to [`solve`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargingRequest {
    pub soc_start: f64,
    pub soc_target: f64,
    /// Usable battery capacity (kWh).
    pub battery_capacity: f64,
    /// Maximum power the vehicle accepts (kW).
    pub vehicle_power: f64,
    /// Rated power of the charge point (kW).
    pub station_power: f64,
    /// Steps available before the vehicle must leave.
    pub max_time_steps: usize,
    /// Below this energy (kWh) the charge is not worth starting.
    pub min_energy: f64,
}

/// Result of a charging request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargingOutcome {
    pub time_steps: usize,
    /// Mean power over the occupied steps (kW).
    pub avg_power: f64,
    /// Power actually available: vehicle and charge point limits combined (kW).
    pub power_cap: f64,
    pub soc_end: f64,
    /// Energy delivered (kWh).
    pub energy: f64,
    /// Energy delivered in each occupied step (kWh). Diagnostic only: event
    /// logs and grid series spread `avg_power` evenly over the steps.
    pub step_energy: Vec<f64>,
}

impl ChargingOutcome {
    fn noop(soc_start: f64, power_cap: f64) -> Self {
        Self {
            time_steps: 0,
            avg_power: 0.0,
            power_cap,
            soc_end: soc_start,
            energy: 0.0,
            step_energy: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.time_steps == 0
    }
}

/// Computes how long charging from `soc_start` to `soc_target` takes.
///
/// The SoC range is cut into [`CURVE_SEGMENTS`] slices. Each slice charges at
/// the curve factor at its midpoint times the combined power limit of vehicle
/// and charge point. Slice durations are packed into steps of
/// `step_hours`, carrying partial steps forward. If the result exceeds
/// `max_time_steps` it is truncated and the reachable SoC recomputed.
///
/// A no-op (zero steps) is returned when nothing can or should be charged.
///
/// # Examples
///
/// ```
/// use simbev::sim::charging::{ChargingCurve, ChargingRequest, solve};
///
/// let req = ChargingRequest {
///     soc_start: 0.5,
///     soc_target: 1.0,
///     battery_capacity: 30.0,
///     vehicle_power: 11.0,
///     station_power: 11.0,
///     max_time_steps: 4,
///     min_energy: 0.0,
/// };
/// let out = solve(&req, &ChargingCurve::flat(), 0.25);
/// assert_eq!(out.time_steps, 4);
/// assert!((out.soc_end - (0.5 + 11.0 / 30.0)).abs() < 1e-9);
/// ```
pub fn solve(req: &ChargingRequest, curve: &ChargingCurve, step_hours: f64) -> ChargingOutcome {
    let power_cap = req.vehicle_power.min(req.station_power);
    if power_cap <= 0.0
        || req.battery_capacity <= 0.0
        || req.max_time_steps == 0
        || step_hours <= 0.0
        || req.soc_target <= req.soc_start
    {
        return ChargingOutcome::noop(req.soc_start, power_cap.max(0.0));
    }

    let slice = (req.soc_target - req.soc_start) / CURVE_SEGMENTS as f64;
    let slice_energy = slice * req.battery_capacity;
    let powers: Vec<f64> = (0..CURVE_SEGMENTS)
        .map(|i| {
            let mid = req.soc_start + slice * (i as f64 + 0.5);
            (curve.factor(mid) * power_cap).min(power_cap)
        })
        .collect();
    let mut remaining: Vec<f64> = powers.iter().map(|p| slice_energy / p * 60.0).collect();

    let step_minutes = step_hours * 60.0;
    let mut step_energy = Vec::new();
    let mut seg = 0;
    while seg < CURVE_SEGMENTS && step_energy.len() < req.max_time_steps {
        let mut room = step_minutes;
        let mut energy = 0.0;
        while room > EPS_MINUTES && seg < CURVE_SEGMENTS {
            let take = remaining[seg].min(room);
            energy += take * powers[seg] / 60.0;
            remaining[seg] -= take;
            room -= take;
            if remaining[seg] <= EPS_MINUTES {
                seg += 1;
            }
        }
        step_energy.push(energy);
    }

    let energy: f64 = step_energy.iter().sum();
    if energy < req.min_energy || energy <= 0.0 {
        return ChargingOutcome::noop(req.soc_start, power_cap);
    }
    let soc_end = if seg == CURVE_SEGMENTS {
        req.soc_target
    } else {
        (req.soc_start + energy / req.battery_capacity).min(req.soc_target)
    };
    let time_steps = step_energy.len();
    ChargingOutcome {
        time_steps,
        avg_power: energy / (time_steps as f64 * step_hours),
        power_cap,
        soc_end,
        energy: (soc_end - req.soc_start) * req.battery_capacity,
        step_energy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(soc_start: f64, soc_target: f64, power: f64, max_steps: usize) -> ChargingRequest {
        ChargingRequest {
            soc_start,
            soc_target,
            battery_capacity: 30.0,
            vehicle_power: power,
            station_power: power,
            max_time_steps: max_steps,
            min_energy: 0.0,
        }
    }

    #[test]
    fn flat_curve_reaches_target_within_window() {
        let out = solve(&request(0.8, 1.0, 11.0, 4), &ChargingCurve::flat(), 0.25);
        // 6 kWh at 11 kW is about 33 minutes.
        assert_eq!(out.time_steps, 3);
        assert!((out.soc_end - 1.0).abs() < 1e-12);
        assert!((out.energy - 6.0).abs() < 1e-9);
        assert!((out.avg_power - 8.0).abs() < 1e-9);
        assert!(out.avg_power <= out.power_cap + 1e-9);
    }

    #[test]
    fn truncates_at_max_steps() {
        let out = solve(&request(0.5, 1.0, 11.0, 4), &ChargingCurve::flat(), 0.25);
        assert_eq!(out.time_steps, 4);
        assert!((out.soc_end - 0.866_666_666).abs() < 1e-6);
        assert!((out.avg_power - 11.0).abs() < 1e-9);
    }

    #[test]
    fn step_energies_sum_to_soc_gain() {
        let out = solve(&request(0.1, 0.9, 50.0, 100), &ChargingCurve::default_fast(), 0.25);
        let sum: f64 = out.step_energy.iter().sum();
        assert!((sum - out.energy).abs() < 1e-6);
        assert!((out.energy - 0.8 * 30.0).abs() < 1e-6);
        assert!(out.step_energy.iter().all(|e| *e <= 50.0 * 0.25 + 1e-9));
    }

    #[test]
    fn noop_cases() {
        let flat = ChargingCurve::flat();
        assert!(solve(&request(0.9, 0.9, 11.0, 4), &flat, 0.25).is_noop());
        assert!(solve(&request(0.9, 0.5, 11.0, 4), &flat, 0.25).is_noop());
        assert!(solve(&request(0.5, 1.0, 11.0, 0), &flat, 0.25).is_noop());
        assert!(solve(&request(0.5, 1.0, 0.0, 4), &flat, 0.25).is_noop());

        let mut req = request(0.99, 1.0, 11.0, 4);
        req.min_energy = 1.0;
        let out = solve(&req, &flat, 0.25);
        assert!(out.is_noop());
        assert_eq!(out.soc_end, 0.99);
    }

    #[test]
    fn station_limits_power() {
        let mut req = request(0.2, 0.8, 150.0, 100);
        req.station_power = 50.0;
        let out = solve(&req, &ChargingCurve::default_fast(), 0.25);
        assert_eq!(out.power_cap, 50.0);
        assert!(out.avg_power <= 50.0 + 1e-9);
    }

    #[test]
    fn weak_station_still_follows_the_taper() {
        let curve = ChargingCurve::default_fast();
        let mut req = request(0.2, 0.8, 150.0, 100);
        req.battery_capacity = 60.0;
        req.station_power = 50.0;
        let out = solve(&req, &curve, 0.25);
        // 36 kWh at a tapered 50 kW takes about 54 minutes.
        assert_eq!(out.time_steps, 4);
        assert!(out.step_energy[0] < 0.25 * 49.0);
        assert!(out.step_energy[0] > out.step_energy[2]);
        assert!((out.soc_end - 0.8).abs() < 1e-12);

        // Same power cap reached from the vehicle side gives the same schedule.
        let mut car_limited = req;
        car_limited.vehicle_power = 50.0;
        car_limited.station_power = 150.0;
        assert_eq!(solve(&car_limited, &curve, 0.25).step_energy, out.step_energy);
    }

    #[test]
    fn default_fast_curve_tapers() {
        let curve = ChargingCurve::default_fast();
        assert!(curve.factor(0.3) > curve.factor(0.9));
        assert!(curve.factor(1.0) > 0.0);
        assert!(curve.factor(0.45) <= 1.0);
        assert_eq!(curve.factor(-1.0), curve.factor(0.0));
    }

    #[test]
    fn curve_validation() {
        assert!(ChargingCurve::new(vec![(0.0, 1.0)], Interpolation::Linear).is_err());
        assert!(ChargingCurve::new(vec![(0.1, 1.0), (1.0, 1.0)], Interpolation::Linear).is_err());
        assert!(ChargingCurve::new(vec![(0.0, 1.0), (0.9, 1.0)], Interpolation::Linear).is_err());
        assert!(ChargingCurve::new(vec![(0.0, 1.0), (0.5, 0.0), (1.0, 1.0)], Interpolation::Linear)
            .is_err());
        assert!(ChargingCurve::new(vec![(0.0, 1.0), (1.0, 0.0)], Interpolation::Linear).is_ok());
        assert!(ChargingCurve::new(vec![(0.0, 1.0), (1.0, 0.0)], Interpolation::Step).is_err());
        assert!(ChargingCurve::new(vec![(0.0, 1.0), (0.0, 1.0)], Interpolation::Step).is_err());
    }

    #[test]
    fn step_interpolation_holds_previous_knot() {
        let curve =
            ChargingCurve::new(vec![(0.0, 1.0), (0.5, 0.5), (1.0, 0.5)], Interpolation::Step)
                .unwrap();
        assert_eq!(curve.factor(0.49), 1.0);
        assert_eq!(curve.factor(0.5), 0.5);
        let lin = ChargingCurve::new(vec![(0.0, 1.0), (1.0, 0.5)], Interpolation::Linear).unwrap();
        assert!((lin.factor(0.5) - 0.75).abs() < 1e-12);
    }
}
