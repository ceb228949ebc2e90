//! Course progress — pure projection for duration-bounded medications.
//!
//! Previously re-derived ad hoc by the card renderer; lives here so every
//! consumer shows the same numbers. Never touches stored state.

use chrono::NaiveDate;

use crate::models::{DailyRecord, DurationMode, MedicationDefinition, Schedule};
use crate::recurrence::day_offset;

/// Display-ready course progress, e.g. "Day 3 of 10" or "Pill 5 of 20".
#[derive(Debug, Clone, PartialEq)]
pub struct CourseProgress {
    pub current: i64,
    pub total: i64,
    pub label: String,
    /// Fill fraction for bars/rings, clamped to [0, 1].
    pub fraction: f64,
}

/// Progress of a course medication as of `date`, with `record` supplying
/// today's completion state. `None` for non-course schedules.
pub fn course_progress(
    def: &MedicationDefinition,
    date: NaiveDate,
    record: Option<&DailyRecord>,
) -> Option<CourseProgress> {
    let Schedule::Course(course) = &def.schedule else {
        return None;
    };

    // A course without a start date behaves as if it started today.
    let offset = course
        .start_date
        .map_or(0, |start| day_offset(start, date));
    // course_duration is >= 1 after config parsing; max(1) keeps a
    // hand-built zero from dividing to NaN
    let total = i64::from(course.course_duration).max(1);

    let progress = match course.duration_mode {
        DurationMode::Days => {
            let current = offset + 1;
            CourseProgress {
                current,
                total,
                label: format!("Day {current} of {total}"),
                fraction: clamp_unit(offset as f64 / total as f64),
            }
        }
        DurationMode::Quantity => {
            let doses_per_day = def.dose_keys.len().max(1) as i64;
            let taken_today = record.map_or(0, |rec| {
                def.dose_keys
                    .iter()
                    .filter(|key| rec.is_completed(key))
                    .count() as i64
            });
            let current = offset.max(0) * doses_per_day + taken_today;
            CourseProgress {
                current,
                total,
                label: format!("{} {current} of {total}", capitalize(course.dosage_unit())),
                fraction: clamp_unit(current as f64 / total as f64),
            }
        }
    };

    Some(progress)
}

fn clamp_unit(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
