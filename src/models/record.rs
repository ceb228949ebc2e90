//! Per-day completion record.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Completion state for one calendar day: dose key -> taken.
///
/// A record only exists once some key has been toggled for that date; the
/// store deletes any record whose map is emptied by cascade cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub completion: BTreeMap<String, bool>,
}

impl DailyRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            completion: BTreeMap::new(),
        }
    }

    /// True only for an explicit `true` entry; an absent key is not taken.
    pub fn is_completed(&self, key: &str) -> bool {
        self.completion.get(key).copied().unwrap_or(false)
    }
}
