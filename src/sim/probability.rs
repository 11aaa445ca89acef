//! Empirical probability tables a region type is built from.

use rand::Rng;

use super::location::{Purpose, UseCase};
use super::types::TripLimits;
use crate::error::SimError;

/// Discrete distribution over `f64` values with inverse-CDF sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    values: Vec<f64>,
    cumulative: Vec<f64>,
}

impl Distribution {
    /// Builds a distribution from `(value, weight)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if there are no pairs, any value or
    /// weight is not finite, a weight is negative, or all weights are zero.
    pub fn new(pairs: impl IntoIterator<Item = (f64, f64)>) -> Result<Self, SimError> {
        let mut values = Vec::new();
        let mut cumulative = Vec::new();
        let mut total = 0.0;
        for (value, weight) in pairs {
            if !value.is_finite() || !weight.is_finite() || weight < 0.0 {
                return Err(SimError::config(format!(
                    "invalid distribution entry ({value}, {weight})"
                )));
            }
            total += weight;
            values.push(value);
            cumulative.push(total);
        }
        if total <= 0.0 {
            return Err(SimError::config("distribution has no positive weight"));
        }
        for c in &mut cumulative {
            *c = if *c >= total { 1.0 } else { *c / total };
        }
        Ok(Self { values, cumulative })
    }

    /// A distribution that always yields `value`.
    pub fn constant(value: f64) -> Self {
        Self {
            values: vec![value],
            cumulative: vec![1.0],
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        let idx = self.cumulative.partition_point(|&c| c <= u);
        self.values[idx.min(self.values.len() - 1)]
    }

    /// Values that can actually be drawn (positive weight).
    pub fn support(&self) -> impl Iterator<Item = f64> + '_ {
        let mut prev = 0.0;
        self.values
            .iter()
            .zip(&self.cumulative)
            .filter_map(move |(&v, &c)| {
                let positive = c > prev;
                prev = c;
                positive.then_some(v)
            })
    }
}

/// Normalized probability that a trip starts at each absolute step.
#[derive(Debug, Clone, PartialEq)]
pub struct TripStartSeries(Vec<f64>);

impl TripStartSeries {
    /// Normalizes raw start counts by their maximum.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] for negative or non-finite entries or an
    /// all-zero series.
    pub fn from_counts(counts: Vec<f64>) -> Result<Self, SimError> {
        if counts.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(SimError::config("trip-start series has invalid entries"));
        }
        let max = counts.iter().copied().fold(0.0, f64::max);
        if max <= 0.0 {
            return Err(SimError::config("trip-start series is all zero"));
        }
        Ok(Self(counts.into_iter().map(|c| c / max).collect()))
    }

    /// Probability at `step`; zero past the end of the series.
    pub fn get(&self, step: usize) -> f64 {
        self.0.get(step).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Destination-purpose weights per absolute step.
#[derive(Debug, Clone, PartialEq)]
pub struct PurposeTable {
    rows: Vec<[f64; 7]>,
}

impl PurposeTable {
    /// Builds the table; columns follow [`Purpose::ALL`].
    pub fn new(rows: Vec<[f64; 7]>) -> Result<Self, SimError> {
        if rows.iter().flatten().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SimError::config("purpose table has invalid weights"));
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Draws a destination for a trip starting at `step`.
    ///
    /// Returns `None` when the step is out of range or its weights sum to zero.
    pub fn sample<R: Rng + ?Sized>(&self, step: usize, rng: &mut R) -> Option<Purpose> {
        let row = self.rows.get(step)?;
        let total: f64 = row.iter().sum();
        if total <= 0.0 {
            return None;
        }
        let mut u = rng.random::<f64>() * total;
        for (purpose, &w) in Purpose::ALL.iter().zip(row) {
            if w > 0.0 && u < w {
                return Some(*purpose);
            }
            u -= w;
        }
        Purpose::ALL
            .iter()
            .zip(row)
            .rev()
            .find(|(_, w)| **w > 0.0)
            .map(|(p, _)| *p)
    }
}

/// One distribution per trip purpose.
#[derive(Debug, Clone, PartialEq)]
pub struct PurposeDistributions([Distribution; 7]);

impl PurposeDistributions {
    /// Collects per-purpose distributions; every purpose must be present.
    pub fn new(
        what: &str,
        mut lookup: impl FnMut(Purpose) -> Option<Distribution>,
    ) -> Result<Self, SimError> {
        let mut out = Vec::with_capacity(Purpose::ALL.len());
        for p in Purpose::ALL {
            out.push(
                lookup(p).ok_or_else(|| SimError::config(format!("no {what} table for {p}")))?,
            );
        }
        let arr: [Distribution; 7] = out
            .try_into()
            .map_err(|_| SimError::config(format!("incomplete {what} tables")))?;
        Ok(Self(arr))
    }

    pub fn get(&self, purpose: Purpose) -> &Distribution {
        &self.0[purpose.index()]
    }
}

/// Charge-point power availability at each destination and fast site.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargingPowerTable {
    slow: PurposeDistributions,
    urban_fast: Distribution,
    highway_fast: Distribution,
}

impl ChargingPowerTable {
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if a slow table contains negative powers
    /// or a fast table can draw a non-positive power.
    pub fn new(
        slow: PurposeDistributions,
        urban_fast: Distribution,
        highway_fast: Distribution,
    ) -> Result<Self, SimError> {
        for p in Purpose::ALL {
            if slow.get(p).support().any(|v| v < 0.0) {
                return Err(SimError::config(format!("negative charging power at {p}")));
            }
        }
        for (name, d) in [("urban", &urban_fast), ("highway", &highway_fast)] {
            if d.support().any(|v| v <= 0.0) {
                return Err(SimError::config(format!(
                    "{name} fast-charging powers must be positive"
                )));
            }
        }
        Ok(Self {
            slow,
            urban_fast,
            highway_fast,
        })
    }

    /// Draws a slow charge-point power at `purpose`; zero means none available.
    pub fn sample_slow<R: Rng + ?Sized>(&self, purpose: Purpose, rng: &mut R) -> f64 {
        self.slow.get(purpose).sample(rng)
    }

    /// Draws a fast charge-point power; non-fast use cases fall back to urban.
    pub fn sample_fast<R: Rng + ?Sized>(&self, use_case: UseCase, rng: &mut R) -> f64 {
        match use_case {
            UseCase::HighwayFast => self.highway_fast.sample(rng),
            _ => self.urban_fast.sample(rng),
        }
    }

    /// Distinct positive charge-point powers, ascending.
    pub fn power_levels(&self) -> Vec<f64> {
        let mut levels: Vec<f64> = Purpose::ALL
            .iter()
            .flat_map(|p| self.slow.get(*p).support())
            .chain(self.urban_fast.support())
            .chain(self.highway_fast.support())
            .filter(|v| *v > 0.0)
            .collect();
        levels.sort_by(f64::total_cmp);
        levels.dedup();
        levels
    }
}

/// All empirical tables describing one region type.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityTables {
    pub trip_starts: TripStartSeries,
    pub purposes: PurposeTable,
    /// Trip distance (km) by destination purpose.
    pub distance: PurposeDistributions,
    /// Average speed (km/h) by destination purpose.
    pub speed: PurposeDistributions,
    /// Parking duration (hours) by current location.
    pub stand: PurposeDistributions,
    pub charging: ChargingPowerTable,
}

impl ProbabilityTables {
    /// Checks the tables against the run horizon and trip floors.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if a time series is shorter than
    /// `total_steps` or no distance/speed combination satisfies `limits`
    /// for some purpose.
    pub fn validate(&self, total_steps: usize, limits: &TripLimits) -> Result<(), SimError> {
        if self.trip_starts.len() < total_steps {
            return Err(SimError::config(format!(
                "trip-start series covers {} of {total_steps} steps",
                self.trip_starts.len()
            )));
        }
        if self.purposes.len() < total_steps {
            return Err(SimError::config(format!(
                "purpose table covers {} of {total_steps} steps",
                self.purposes.len()
            )));
        }
        for p in Purpose::ALL {
            if self.fallback_route(p, limits).is_none() {
                return Err(SimError::config(format!(
                    "no distance/speed combination for {p} satisfies the trip limits"
                )));
            }
        }
        Ok(())
    }

    /// Shortest admissible distance at the fastest admissible speed.
    pub(crate) fn fallback_route(&self, purpose: Purpose, limits: &TripLimits) -> Option<(f64, f64)> {
        let speed = self
            .speed
            .get(purpose)
            .support()
            .filter(|s| *s >= limits.min_speed_kmh && *s > 0.0)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))?;
        let distance = self
            .distance
            .get(purpose)
            .support()
            .filter(|d| *d >= limits.min_distance_km && *d / speed <= limits.max_drive_hours)
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d))))?;
        Some((distance, speed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn distribution_rejects_bad_weights() {
        assert!(Distribution::new(Vec::new()).is_err());
        assert!(Distribution::new([(1.0, 0.0), (2.0, 0.0)]).is_err());
        assert!(Distribution::new([(1.0, -1.0)]).is_err());
        assert!(Distribution::new([(f64::NAN, 1.0)]).is_err());
    }

    #[test]
    fn distribution_never_draws_zero_weight() {
        let d = Distribution::new([(1.0, 0.0), (2.0, 1.0), (3.0, 0.0)]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..500 {
            assert_eq!(d.sample(&mut rng), 2.0);
        }
        assert_eq!(d.support().collect::<Vec<_>>(), vec![2.0]);
    }

    #[test]
    fn distribution_frequencies_follow_weights() {
        let d = Distribution::new([(0.0, 3.0), (1.0, 1.0)]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let ones: f64 = (0..n).map(|_| d.sample(&mut rng)).sum();
        let share = ones / f64::from(n);
        assert!((share - 0.25).abs() < 0.02, "share {share}");
    }

    #[test]
    fn trip_starts_normalize_by_max() {
        let s = TripStartSeries::from_counts(vec![0.0, 2.0, 4.0]).unwrap();
        assert_eq!(s.get(1), 0.5);
        assert_eq!(s.get(2), 1.0);
        assert_eq!(s.get(10), 0.0);
        assert!(TripStartSeries::from_counts(vec![0.0, 0.0]).is_err());
    }

    #[test]
    fn purpose_table_skips_empty_rows() {
        let mut row = [0.0; 7];
        row[Purpose::Leisure.index()] = 1.0;
        let table = PurposeTable::new(vec![[0.0; 7], row]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(table.sample(0, &mut rng), None);
        assert_eq!(table.sample(1, &mut rng), Some(Purpose::Leisure));
        assert_eq!(table.sample(2, &mut rng), None);
    }

    #[test]
    fn fast_tables_must_be_positive() {
        let slow = PurposeDistributions::new("charging", |_| Some(Distribution::constant(0.0)))
            .unwrap();
        let err = ChargingPowerTable::new(
            slow,
            Distribution::constant(0.0),
            Distribution::constant(150.0),
        );
        assert!(err.is_err());
    }

    #[test]
    fn power_levels_are_sorted_and_distinct() {
        let slow = PurposeDistributions::new("charging", |p| {
            Some(match p {
                Purpose::Home => Distribution::new([(0.0, 1.0), (11.0, 1.0)]).unwrap(),
                _ => Distribution::new([(22.0, 1.0), (11.0, 1.0)]).unwrap(),
            })
        })
        .unwrap();
        let table = ChargingPowerTable::new(
            slow,
            Distribution::constant(50.0),
            Distribution::constant(150.0),
        )
        .unwrap();
        assert_eq!(table.power_levels(), vec![11.0, 22.0, 50.0, 150.0]);
    }
}
