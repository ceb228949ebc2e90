//! Recurrence engine — the single copy of the eligibility date math.
//!
//! Pure functions from (definition, calendar date) to eligibility, and with
//! a day's record to the list of due dose segments. Every screen that needs
//! "what is due on date D" calls here instead of re-deriving the arithmetic.
//!
//! All arithmetic is over [`NaiveDate`] local calendar days; there is no
//! timezone anywhere in these computations.

use chrono::NaiveDate;

use crate::models::{DailyRecord, DurationMode, MedicationDefinition, Schedule};

/// One due dose on a given date, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoseSegment {
    pub key: String,
    pub label: String,
    pub completed: bool,
    pub color: String,
}

/// Whole days from `start` to `date`; negative before the start.
pub fn day_offset(start: NaiveDate, date: NaiveDate) -> i64 {
    date.signed_duration_since(start).num_days()
}

/// Does this medication have any doses due on `date`?
///
/// A missing start date means no lower bound for every kind. Unknown kinds
/// are reported active; whether to show them as "tracking unsupported" is
/// the caller's display decision.
pub fn is_active_on(def: &MedicationDefinition, date: NaiveDate) -> bool {
    match &def.schedule {
        Schedule::Daily(s) => s.start_date.map_or(true, |start| date >= start),
        Schedule::Interval(s) => match s.start_date {
            None => true,
            Some(start) => {
                let offset = day_offset(start, date);
                if s.interval_days <= 1 {
                    offset >= 0
                } else {
                    offset >= 0 && offset % i64::from(s.interval_days) == 0
                }
            }
        },
        Schedule::Cyclic(s) => match s.start_date {
            None => true,
            Some(start) => {
                let offset = day_offset(start, date);
                // cycle_days is >= 1 after config parsing; max(1) guards
                // hand-built values against a zero divisor
                offset >= 0 && offset % i64::from(s.cycle_days.max(1)) < i64::from(s.active_days)
            }
        },
        Schedule::Course(s) => match s.duration_mode {
            // Quantity-bounded courses are not date-limited; the progress
            // projection owns the dose-count bound.
            DurationMode::Quantity => s.start_date.map_or(true, |start| date >= start),
            DurationMode::Days => match s.start_date {
                None => true,
                Some(start) => {
                    let offset = day_offset(start, date);
                    offset >= 0 && offset < i64::from(s.course_duration)
                }
            },
        },
        Schedule::Unknown { .. } => true,
    }
}

/// The doses due on `date`, in definition order, with completion state
/// taken from `record` (an absent record or key means not taken).
///
/// Empty when the medication is inactive on `date`, and for unknown
/// schedule kinds (active with no tracked doses).
pub fn due_segments(
    def: &MedicationDefinition,
    date: NaiveDate,
    record: Option<&DailyRecord>,
) -> Vec<DoseSegment> {
    if matches!(def.schedule, Schedule::Unknown { .. }) || !is_active_on(def, date) {
        return Vec::new();
    }

    def.dose_keys
        .iter()
        .enumerate()
        .map(|(i, key)| DoseSegment {
            key: key.clone(),
            label: def.dose_label(i),
            completed: record.is_some_and(|r| r.is_completed(key)),
            color: def.color.clone(),
        })
        .collect()
}
