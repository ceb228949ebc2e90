//! The persisted store: medication definitions and per-day records.
//!
//! One [`Store`] wraps one connection and is constructed at startup, then
//! passed to every consumer; tests and headless environments use
//! [`Store::open_in_memory`]. All operations are synchronous, and the two
//! composite operations (dose toggle, cascade delete) run inside explicit
//! transactions so no intermediate table state is ever observable.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use tracing;

use super::{sqlite, DatabaseError};
use crate::models::{DailyRecord, MedicationDefinition, Schedule};

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path` and bring it current.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: sqlite::open_database(path)?,
        })
    }

    /// In-memory store for tests and headless consumers.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: sqlite::open_memory_database()?,
        })
    }

    // ───────────────────────────────────────
    // Medications
    // ───────────────────────────────────────

    /// All medication definitions, ordered by id.
    ///
    /// Malformed or NULL JSON columns decode to empty containers; a bad row
    /// never fails the listing.
    pub fn list_medications(&self) -> Result<Vec<MedicationDefinition>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, dosage, frequency, times, color, icon, keys, type, config
             FROM medications ORDER BY id",
        )?;

        let rows = stmt.query_map([], medication_row)?;

        let mut meds = Vec::new();
        for row in rows {
            meds.push(definition_from_row(row?));
        }
        Ok(meds)
    }

    /// Insert a definition; the stored `id` field is ignored and the newly
    /// assigned id is returned.
    pub fn add_medication(&self, def: &MedicationDefinition) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO medications (name, dosage, frequency, times, color, icon, keys, type, config)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                def.name,
                def.dosage,
                def.frequency,
                encode_list(&def.dose_labels),
                def.color,
                def.icon,
                encode_list(&def.dose_keys),
                def.schedule.kind(),
                def.schedule.config_json(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Full-row replace by id; the caller supplies the complete definition.
    pub fn update_medication(&self, def: &MedicationDefinition) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE medications
             SET name=?1, dosage=?2, frequency=?3, times=?4, color=?5, icon=?6, keys=?7, type=?8, config=?9
             WHERE id=?10",
            params![
                def.name,
                def.dosage,
                def.frequency,
                encode_list(&def.dose_labels),
                def.color,
                def.icon,
                encode_list(&def.dose_keys),
                def.schedule.kind(),
                def.schedule.config_json(),
                def.id,
            ],
        )?;
        Ok(())
    }

    /// Delete a medication and scrub its dose keys from every record, in
    /// one transaction. Records left with an empty completion map are
    /// deleted outright; a failure anywhere rolls the whole thing back.
    pub fn delete_medication(&self, id: i64) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;

        let keys: Vec<String> = tx
            .query_row(
                "SELECT keys FROM medications WHERE id = ?1",
                params![id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten()
            .map(|json| decode_list(Some(&json)))
            .unwrap_or_default();

        tx.execute("DELETE FROM medications WHERE id = ?1", params![id])?;

        if !keys.is_empty() {
            // The one full-table scan in the system; deletion is rare.
            let mut stmt = tx.prepare("SELECT id, data FROM records")?;
            let records: Vec<(i64, Option<String>)> = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<_, _>>()?;
            drop(stmt);

            for (record_id, data) in records {
                let mut completion = decode_completion(data.as_deref());
                let before = completion.len();
                for key in &keys {
                    completion.remove(key);
                }
                if completion.len() == before {
                    continue;
                }
                if completion.is_empty() {
                    tx.execute("DELETE FROM records WHERE id = ?1", params![record_id])?;
                } else {
                    tx.execute(
                        "UPDATE records SET data = ?1 WHERE id = ?2",
                        params![encode_completion(&completion), record_id],
                    )?;
                }
            }
        }

        tx.commit()?;
        tracing::info!("Deleted medication {id} and pruned {} dose keys", keys.len());
        Ok(())
    }

    // ───────────────────────────────────────
    // Records
    // ───────────────────────────────────────

    pub fn get_record(&self, date: NaiveDate) -> Result<Option<DailyRecord>, DatabaseError> {
        let data: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT data FROM records WHERE date = ?1",
                params![date],
                |row| row.get(0),
            )
            .optional()?;

        Ok(data.map(|json| DailyRecord {
            date,
            completion: decode_completion(json.as_deref()),
        }))
    }

    /// Records for `start..=end`. The SQL comparison is textual, which is
    /// correct because dates are stored zero-padded `YYYY-MM-DD`.
    pub fn records_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, DailyRecord>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, data FROM records WHERE date >= ?1 AND date <= ?2")?;

        let rows = stmt.query_map(params![start, end], |row| {
            Ok((row.get::<_, NaiveDate>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut map = BTreeMap::new();
        for row in rows {
            let (date, data) = row?;
            map.insert(
                date,
                DailyRecord {
                    date,
                    completion: decode_completion(data.as_deref()),
                },
            );
        }
        Ok(map)
    }

    /// Atomic read-modify-write of one dose key for one date. Creates the
    /// record on first toggle; idempotent for a repeated (date, key, value).
    pub fn set_completion(
        &self,
        date: NaiveDate,
        key: &str,
        value: bool,
    ) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;

        let existing: Option<Option<String>> = tx
            .query_row(
                "SELECT data FROM records WHERE date = ?1",
                params![date],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(data) => {
                let mut completion = decode_completion(data.as_deref());
                completion.insert(key.to_string(), value);
                tx.execute(
                    "UPDATE records SET data = ?1 WHERE date = ?2",
                    params![encode_completion(&completion), date],
                )?;
            }
            None => {
                let mut completion = BTreeMap::new();
                completion.insert(key.to_string(), value);
                tx.execute(
                    "INSERT INTO records (date, data) VALUES (?1, ?2)",
                    params![date, encode_completion(&completion)],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    // ───────────────────────────────────────
    // Seed / reset
    // ───────────────────────────────────────

    /// Insert the starter medications, only when the table is empty.
    pub fn seed_defaults(&self) -> Result<(), DatabaseError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM medications", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(());
        }

        tracing::info!("Seeding starter medications");
        for def in starter_medications() {
            self.add_medication(&def)?;
        }
        Ok(())
    }

    /// Drop and recreate both data tables. Does not reseed.
    pub fn reset_all(&self) -> Result<(), DatabaseError> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS medications;
             DROP TABLE IF EXISTS records;",
        )?;
        sqlite::init_schema(&self.conn)
    }
}

// Internal row type, mapped before JSON decoding.
struct MedicationRow {
    id: i64,
    name: String,
    dosage: Option<String>,
    frequency: Option<String>,
    times: Option<String>,
    color: Option<String>,
    icon: Option<String>,
    keys: Option<String>,
    kind: Option<String>,
    config: Option<String>,
}

fn medication_row(row: &rusqlite::Row<'_>) -> Result<MedicationRow, rusqlite::Error> {
    Ok(MedicationRow {
        id: row.get(0)?,
        name: row.get(1)?,
        dosage: row.get(2)?,
        frequency: row.get(3)?,
        times: row.get(4)?,
        color: row.get(5)?,
        icon: row.get(6)?,
        keys: row.get(7)?,
        kind: row.get(8)?,
        config: row.get(9)?,
    })
}

fn definition_from_row(row: MedicationRow) -> MedicationDefinition {
    MedicationDefinition {
        id: row.id,
        name: row.name,
        dosage: row.dosage.unwrap_or_default(),
        frequency: row.frequency.unwrap_or_default(),
        dose_labels: decode_list(row.times.as_deref()),
        color: row.color.unwrap_or_default(),
        icon: row.icon.unwrap_or_default(),
        dose_keys: decode_list(row.keys.as_deref()),
        schedule: Schedule::from_db(row.kind.as_deref().unwrap_or("daily"), row.config.as_deref()),
    }
}

fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn decode_list(json: Option<&str>) -> Vec<String> {
    json.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

fn encode_completion(completion: &BTreeMap<String, bool>) -> String {
    serde_json::to_string(completion).unwrap_or_else(|_| "{}".to_string())
}

fn decode_completion(json: Option<&str>) -> BTreeMap<String, bool> {
    json.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

/// The two starter medications shipped with a fresh install.
fn starter_medications() -> Vec<MedicationDefinition> {
    vec![
        MedicationDefinition {
            id: 0,
            name: "Minoxidil".into(),
            dosage: "5mg".into(),
            frequency: "2x Daily".into(),
            dose_labels: vec!["Morning".into(), "Night".into()],
            color: "#FF6B6B".into(),
            icon: "Pill".into(),
            dose_keys: vec!["minoxidil_morning".into(), "minoxidil_night".into()],
            schedule: Schedule::default(),
        },
        MedicationDefinition {
            id: 0,
            name: "Vitamin D".into(),
            dosage: "1000IU".into(),
            frequency: "1x Daily".into(),
            dose_labels: vec!["Morning".into()],
            color: "#4ECDC4".into(),
            icon: "Sun".into(),
            dose_keys: vec!["vitamind_morning".into()],
            schedule: Schedule::default(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CyclicSchedule, IntervalSchedule};
    use serde_json::Map;

    fn test_store() -> Store {
        Store::open_in_memory().expect("in-memory store")
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn make_med(name: &str, keys: &[&str]) -> MedicationDefinition {
        MedicationDefinition {
            id: 0,
            name: name.into(),
            dosage: "10mg".into(),
            frequency: "1x Daily".into(),
            dose_keys: keys.iter().map(|k| k.to_string()).collect(),
            dose_labels: vec!["Morning".into()],
            color: "#3498DB".into(),
            icon: "Pill".into(),
            schedule: Schedule::default(),
        }
    }

    #[test]
    fn add_then_list_round_trips_every_field() {
        let store = test_store();
        let mut extra = Map::new();
        extra.insert("note".into(), serde_json::json!("with food"));
        let mut def = make_med("Iron", &["iron_morning"]);
        def.schedule = Schedule::Interval(IntervalSchedule {
            start_date: Some(day(2024, 1, 1)),
            interval_days: 3,
            extra,
        });

        let id = store.add_medication(&def).unwrap();
        assert!(id > 0);

        let listed = store.list_medications().unwrap();
        assert_eq!(listed.len(), 1);
        def.id = id;
        assert_eq!(listed[0], def);
    }

    #[test]
    fn ids_assigned_in_insertion_order() {
        let store = test_store();
        let a = store.add_medication(&make_med("A", &["a_m"])).unwrap();
        let b = store.add_medication(&make_med("B", &["b_m"])).unwrap();
        assert!(b > a);

        let listed = store.list_medications().unwrap();
        assert_eq!(
            listed.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![a, b]
        );
    }

    #[test]
    fn update_replaces_full_row() {
        let store = test_store();
        let mut def = make_med("Iron", &["iron_morning"]);
        def.id = store.add_medication(&def).unwrap();

        def.name = "Iron Bisglycinate".into();
        def.dosage = "25mg".into();
        def.schedule = Schedule::Cyclic(CyclicSchedule {
            start_date: Some(day(2024, 2, 1)),
            cycle_days: 14,
            active_days: 7,
            extra: Map::new(),
        });
        store.update_medication(&def).unwrap();

        let listed = store.list_medications().unwrap();
        assert_eq!(listed, vec![def]);
    }

    #[test]
    fn malformed_json_columns_decode_to_empty() {
        let store = test_store();
        store
            .conn
            .execute(
                "INSERT INTO medications (name, times, keys, type, config)
                 VALUES ('Broken', 'not json', '{oops', 'daily', 'also not json')",
                [],
            )
            .unwrap();

        let listed = store.list_medications().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].dose_keys.is_empty());
        assert!(listed[0].dose_labels.is_empty());
        assert_eq!(listed[0].schedule, Schedule::default());
    }

    #[test]
    fn set_completion_creates_then_updates() {
        let store = test_store();
        let d = day(2024, 6, 1);
        assert!(store.get_record(d).unwrap().is_none());

        store.set_completion(d, "iron_morning", true).unwrap();
        let rec = store.get_record(d).unwrap().unwrap();
        assert!(rec.is_completed("iron_morning"));

        store.set_completion(d, "iron_night", false).unwrap();
        let rec = store.get_record(d).unwrap().unwrap();
        assert!(rec.is_completed("iron_morning"));
        assert_eq!(rec.completion.get("iron_night"), Some(&false));

        // Only one row for the date
        let count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn set_completion_is_idempotent_and_last_write_wins() {
        let store = test_store();
        let d = day(2024, 6, 1);

        store.set_completion(d, "iron_morning", true).unwrap();
        store.set_completion(d, "iron_morning", true).unwrap();
        assert!(store.get_record(d).unwrap().unwrap().is_completed("iron_morning"));

        store.set_completion(d, "iron_morning", false).unwrap();
        store.set_completion(d, "iron_morning", true).unwrap();
        store.set_completion(d, "iron_morning", false).unwrap();
        let rec = store.get_record(d).unwrap().unwrap();
        assert_eq!(rec.completion.get("iron_morning"), Some(&false));
        assert_eq!(rec.completion.len(), 1);
    }

    #[test]
    fn records_in_range_inclusive_bounds() {
        let store = test_store();
        for d in 1..=5 {
            store
                .set_completion(day(2024, 6, d), "iron_morning", true)
                .unwrap();
        }

        let map = store
            .records_in_range(day(2024, 6, 2), day(2024, 6, 4))
            .unwrap();
        assert_eq!(
            map.keys().copied().collect::<Vec<_>>(),
            vec![day(2024, 6, 2), day(2024, 6, 3), day(2024, 6, 4)]
        );
    }

    #[test]
    fn records_in_range_spans_months_lexicographically() {
        let store = test_store();
        store.set_completion(day(2024, 9, 30), "a", true).unwrap();
        store.set_completion(day(2024, 10, 1), "a", true).unwrap();
        store.set_completion(day(2024, 11, 2), "a", true).unwrap();

        let map = store
            .records_in_range(day(2024, 9, 30), day(2024, 10, 31))
            .unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.contains_key(&day(2024, 10, 1)));
    }

    #[test]
    fn delete_scrubs_keys_and_drops_emptied_records() {
        let store = test_store();
        let mut iron = make_med("Iron", &["iron_morning", "iron_night"]);
        iron.id = store.add_medication(&iron).unwrap();
        let mut zinc = make_med("Zinc", &["zinc_morning"]);
        zinc.id = store.add_medication(&zinc).unwrap();

        let d1 = day(2024, 6, 1);
        let d2 = day(2024, 6, 2);
        store.set_completion(d1, "iron_morning", true).unwrap();
        store.set_completion(d1, "zinc_morning", true).unwrap();
        store.set_completion(d2, "iron_night", true).unwrap();

        store.delete_medication(iron.id).unwrap();

        // d1 keeps zinc's entry only; d2 is gone entirely
        let rec = store.get_record(d1).unwrap().unwrap();
        assert_eq!(rec.completion.len(), 1);
        assert!(rec.is_completed("zinc_morning"));
        assert!(store.get_record(d2).unwrap().is_none());

        let listed = store.list_medications().unwrap();
        assert_eq!(listed, vec![zinc]);
    }

    #[test]
    fn delete_without_matching_keys_leaves_records_alone() {
        let store = test_store();
        let mut iron = make_med("Iron", &["iron_morning"]);
        iron.id = store.add_medication(&iron).unwrap();
        store
            .set_completion(day(2024, 6, 1), "zinc_morning", true)
            .unwrap();

        store.delete_medication(iron.id).unwrap();

        let rec = store.get_record(day(2024, 6, 1)).unwrap().unwrap();
        assert!(rec.is_completed("zinc_morning"));
    }

    #[test]
    fn delete_of_missing_id_is_a_no_op() {
        let store = test_store();
        store.set_completion(day(2024, 6, 1), "a", true).unwrap();
        store.delete_medication(999).unwrap();
        assert!(store.get_record(day(2024, 6, 1)).unwrap().is_some());
    }

    #[test]
    fn seed_only_fills_an_empty_table() {
        let store = test_store();
        store.seed_defaults().unwrap();
        let seeded = store.list_medications().unwrap();
        assert_eq!(seeded.len(), 2);
        assert_eq!(seeded[0].name, "Minoxidil");
        assert_eq!(seeded[0].dose_keys, vec!["minoxidil_morning", "minoxidil_night"]);
        assert_eq!(seeded[1].name, "Vitamin D");

        // Second call never overwrites or duplicates
        store.seed_defaults().unwrap();
        assert_eq!(store.list_medications().unwrap().len(), 2);

        // Non-empty table is left untouched even after a manual wipe of one row
        store.delete_medication(seeded[0].id).unwrap();
        store.seed_defaults().unwrap();
        assert_eq!(store.list_medications().unwrap().len(), 1);
    }

    #[test]
    fn reset_drops_data_but_not_the_schema() {
        let store = test_store();
        store.seed_defaults().unwrap();
        store.set_completion(day(2024, 6, 1), "minoxidil_morning", true).unwrap();

        store.reset_all().unwrap();

        assert!(store.list_medications().unwrap().is_empty());
        assert!(store.get_record(day(2024, 6, 1)).unwrap().is_none());
        assert_eq!(sqlite::count_tables(&store.conn).unwrap(), 3);
        // No auto-reseed
        assert!(store.list_medications().unwrap().is_empty());
    }

    #[test]
    fn record_dates_round_trip_zero_padded() {
        let store = test_store();
        store.set_completion(day(2024, 1, 7), "a", true).unwrap();
        let stored: String = store
            .conn
            .query_row("SELECT date FROM records", [], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, "2024-01-07");
    }
}
