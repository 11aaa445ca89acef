use chrono::{Days, NaiveDate, NaiveDateTime};

use crate::error::SimError;

/// Days simulated ahead of the requested start date to reach a steady state.
pub const LEAD_DAYS: u64 = 7;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Maps simulation step indices onto wall-clock time.
///
/// Step 0 lies [`LEAD_DAYS`] before the requested start date; the lead
/// steps are simulated but trimmed from every exported result.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use simbev::sim::clock::SimClock;
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
/// let clock = SimClock::new(start, start, 15).unwrap();
/// assert_eq!(clock.steps_per_day(), 96);
/// assert_eq!(clock.lead_steps(), 7 * 96);
/// assert_eq!(clock.reported_steps(), 96);
/// assert_eq!(clock.to_time_steps(0.3), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimClock {
    origin: NaiveDateTime,
    step_minutes: u32,
    lead_steps: usize,
    total_steps: usize,
}

impl SimClock {
    /// Creates a clock covering `start_date..=end_date` plus the lead week.
    ///
    /// # Arguments
    ///
    /// * `start_date` - First reported day
    /// * `end_date` - Last reported day (inclusive)
    /// * `step_minutes` - Step length; must divide a day evenly
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if the step length does not divide a day
    /// or the end date precedes the start date.
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        step_minutes: u32,
    ) -> Result<Self, SimError> {
        if step_minutes == 0 || MINUTES_PER_DAY % step_minutes != 0 {
            return Err(SimError::config(format!(
                "step size of {step_minutes} min does not divide a day"
            )));
        }
        if end_date < start_date {
            return Err(SimError::config(format!(
                "end date {end_date} precedes start date {start_date}"
            )));
        }
        let origin_date = start_date
            .checked_sub_days(Days::new(LEAD_DAYS))
            .ok_or_else(|| SimError::config("start date out of range"))?;
        let steps_per_day = (MINUTES_PER_DAY / step_minutes) as usize;
        let reported_days = (end_date - start_date).num_days() as usize + 1;
        let lead_steps = LEAD_DAYS as usize * steps_per_day;
        Ok(Self {
            origin: origin_date.and_time(chrono::NaiveTime::MIN),
            step_minutes,
            lead_steps,
            total_steps: lead_steps + reported_days * steps_per_day,
        })
    }

    /// Builds a clock from raw step counts, mainly for tests.
    pub fn from_steps(
        origin: NaiveDateTime,
        step_minutes: u32,
        lead_steps: usize,
        total_steps: usize,
    ) -> Self {
        Self {
            origin,
            step_minutes: step_minutes.max(1),
            lead_steps: lead_steps.min(total_steps),
            total_steps,
        }
    }

    pub fn step_minutes(&self) -> u32 {
        self.step_minutes
    }

    pub fn step_hours(&self) -> f64 {
        f64::from(self.step_minutes) / 60.0
    }

    pub fn steps_per_day(&self) -> usize {
        (MINUTES_PER_DAY / self.step_minutes) as usize
    }

    pub fn lead_steps(&self) -> usize {
        self.lead_steps
    }

    /// Simulated steps including the lead week; the exclusive horizon.
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn reported_steps(&self) -> usize {
        self.total_steps - self.lead_steps
    }

    /// Wall-clock time at the start of `step`.
    pub fn timestamp(&self, step: usize) -> NaiveDateTime {
        self.origin + chrono::Duration::minutes(step as i64 * i64::from(self.step_minutes))
    }

    /// Converts a duration in hours into whole steps, rounding up, minimum 1.
    pub fn to_time_steps(&self, hours: f64) -> usize {
        let steps = (hours * 60.0 / f64::from(self.step_minutes) - 1e-9).ceil();
        if steps.is_finite() && steps >= 1.0 {
            steps as usize
        } else {
            1
        }
    }
}
