//! Medication definition and its schedule.
//!
//! The persisted `type` + `config` pair (a string tag and an open JSON
//! object) is modelled as the [`Schedule`] tagged union: one variant per
//! recognized kind with typed fields, plus a catch-all `Unknown` variant.
//! Config keys a variant does not recognize are kept in its `extra` map so
//! they survive a load/store round-trip.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A medication as defined by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationDefinition {
    /// Store-assigned rowid; 0 until inserted. Never reused after deletion.
    pub id: i64,
    pub name: String,
    /// Free-text dose label, e.g. "5mg".
    pub dosage: String,
    /// Display frequency text, e.g. "2x Daily".
    pub frequency: String,
    /// One stable key per dose slot per day. Keys double as the per-day
    /// completion map keys, so they must be unique across the whole set.
    pub dose_keys: Vec<String>,
    /// Display labels parallel to `dose_keys`; may be shorter, in which
    /// case callers fall back to "Dose N".
    pub dose_labels: Vec<String>,
    /// Display accent; not behaviorally significant.
    pub color: String,
    pub icon: String,
    pub schedule: Schedule,
}

impl MedicationDefinition {
    /// Display label for the dose slot at `index`, with positional fallback.
    pub fn dose_label(&self, index: usize) -> String {
        self.dose_labels
            .get(index)
            .filter(|l| !l.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("Dose {}", index + 1))
    }
}

/// Recurrence schedule, tagged by the persisted `type` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Schedule {
    /// Due every day (from `start_date`, if set).
    Daily(DailySchedule),
    /// Due every `interval_days` days from `start_date`.
    Interval(IntervalSchedule),
    /// Alternating on/off blocks of days, indefinitely.
    Cyclic(CyclicSchedule),
    /// Bounded course, either in elapsed days or cumulative dose count.
    Course(CourseSchedule),
    /// A kind this version does not track. Kept verbatim so newer data is
    /// tolerated, never rejected.
    Unknown { kind: String, raw: Map<String, Value> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySchedule {
    pub start_date: Option<NaiveDate>,
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalSchedule {
    pub start_date: Option<NaiveDate>,
    /// Every N days; values below 1 mean every day.
    pub interval_days: u32,
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclicSchedule {
    pub start_date: Option<NaiveDate>,
    /// Full cycle length in days.
    pub cycle_days: u32,
    /// Leading days of each cycle that are active.
    pub active_days: u32,
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSchedule {
    pub start_date: Option<NaiveDate>,
    pub duration_mode: DurationMode,
    /// Total days or total doses, depending on `duration_mode`.
    pub course_duration: u32,
    pub extra: Map<String, Value>,
}

impl CourseSchedule {
    /// Unit word for quantity-mode labels ("pill", "ml", ...).
    pub fn dosage_unit(&self) -> &str {
        self.extra
            .get("dosageUnit")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("pills")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationMode {
    Days,
    Quantity,
}

impl Default for IntervalSchedule {
    fn default() -> Self {
        Self {
            start_date: None,
            interval_days: 1,
            extra: Map::new(),
        }
    }
}

impl Default for CyclicSchedule {
    fn default() -> Self {
        Self {
            start_date: None,
            cycle_days: 28,
            active_days: 21,
            extra: Map::new(),
        }
    }
}

impl Default for CourseSchedule {
    fn default() -> Self {
        Self {
            start_date: None,
            duration_mode: DurationMode::Quantity,
            course_duration: 1,
            extra: Map::new(),
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Daily(DailySchedule::default())
    }
}

impl Schedule {
    /// Build from the persisted `type` tag and `config` JSON text.
    ///
    /// Malformed or missing JSON decodes to an empty config, never errors.
    /// Recognized keys are lifted into typed fields (tolerating numeric
    /// strings, which older app versions stored); the remainder lands in
    /// `extra`.
    pub fn from_db(kind: &str, config: Option<&str>) -> Self {
        let mut map = config
            .and_then(|s| serde_json::from_str::<Map<String, Value>>(s).ok())
            .unwrap_or_default();

        match kind {
            "daily" => Schedule::Daily(DailySchedule {
                start_date: take_date(&mut map, "startDate"),
                extra: map,
            }),
            "interval" => Schedule::Interval(IntervalSchedule {
                start_date: take_date(&mut map, "startDate"),
                interval_days: take_days(&mut map, "intervalDays", 1),
                extra: map,
            }),
            "cyclic" => Schedule::Cyclic(CyclicSchedule {
                start_date: take_date(&mut map, "startDate"),
                cycle_days: take_days(&mut map, "cycleDays", 28),
                active_days: take_days(&mut map, "activeDays", 21),
                extra: map,
            }),
            "course" => Schedule::Course(CourseSchedule {
                start_date: take_date(&mut map, "startDate"),
                duration_mode: match map.remove("durationMode").as_ref().and_then(Value::as_str)
                {
                    Some("days") => DurationMode::Days,
                    _ => DurationMode::Quantity,
                },
                course_duration: take_days(&mut map, "courseDuration", 1),
                extra: map,
            }),
            other => Schedule::Unknown {
                kind: other.to_string(),
                raw: map,
            },
        }
    }

    /// The persisted `type` tag.
    pub fn kind(&self) -> &str {
        match self {
            Schedule::Daily(_) => "daily",
            Schedule::Interval(_) => "interval",
            Schedule::Cyclic(_) => "cyclic",
            Schedule::Course(_) => "course",
            Schedule::Unknown { kind, .. } => kind,
        }
    }

    /// Rebuild the `config` JSON object: typed fields plus preserved extras.
    pub fn config_map(&self) -> Map<String, Value> {
        match self {
            Schedule::Daily(s) => {
                let mut map = s.extra.clone();
                put_date(&mut map, "startDate", s.start_date);
                map
            }
            Schedule::Interval(s) => {
                let mut map = s.extra.clone();
                put_date(&mut map, "startDate", s.start_date);
                map.insert("intervalDays".into(), s.interval_days.into());
                map
            }
            Schedule::Cyclic(s) => {
                let mut map = s.extra.clone();
                put_date(&mut map, "startDate", s.start_date);
                map.insert("cycleDays".into(), s.cycle_days.into());
                map.insert("activeDays".into(), s.active_days.into());
                map
            }
            Schedule::Course(s) => {
                let mut map = s.extra.clone();
                put_date(&mut map, "startDate", s.start_date);
                map.insert(
                    "durationMode".into(),
                    match s.duration_mode {
                        DurationMode::Days => "days",
                        DurationMode::Quantity => "quantity",
                    }
                    .into(),
                );
                map.insert("courseDuration".into(), s.course_duration.into());
                map
            }
            Schedule::Unknown { raw, .. } => raw.clone(),
        }
    }

    pub fn config_json(&self) -> String {
        Value::Object(self.config_map()).to_string()
    }
}

/// Parse a `YYYY-MM-DD` string by components.
///
/// Never goes through a timezone-aware parser: a stored calendar day must
/// stay the same day regardless of the device's UTC offset.
pub fn parse_day(s: &str) -> Option<NaiveDate> {
    let mut parts = s.split('-');
    let y: i32 = parts.next()?.parse().ok()?;
    let m: u32 = parts.next()?.parse().ok()?;
    let d: u32 = parts.next()?.parse().ok()?;
    NaiveDate::from_ymd_opt(y, m, d)
}

/// Dose keys in the form the starter data uses: `slug(name)_slug(label)`
/// ("Vitamin D" + "Morning" -> "vitamind_morning").
pub fn derive_dose_keys(name: &str, labels: &[String]) -> Vec<String> {
    labels
        .iter()
        .map(|label| format!("{}_{}", slug(name), slug(label)))
        .collect()
}

fn slug(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase()
}

fn take_date(map: &mut Map<String, Value>, key: &str) -> Option<NaiveDate> {
    let date = map.get(key).and_then(Value::as_str).and_then(parse_day);
    if date.is_some() {
        map.remove(key);
    }
    date
}

fn put_date(map: &mut Map<String, Value>, key: &str, date: Option<NaiveDate>) {
    if let Some(d) = date {
        map.insert(key.into(), d.format("%Y-%m-%d").to_string().into());
    }
}

/// Positive day count from a JSON number or numeric string; zero, negative,
/// and unparseable values fall back like absent ones.
fn take_days(map: &mut Map<String, Value>, key: &str, default: u32) -> u32 {
    let parsed = match map.remove(key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n >= 1 => u32::try_from(n).unwrap_or(default),
        _ => default,
    }
}
