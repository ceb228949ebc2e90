//! Medication tracking core.
//!
//! Three pieces, used together by whatever shell renders them:
//! a versioned SQLite [`Store`] for definitions and per-day completion
//! records, the pure [`recurrence`] engine deciding which doses are due on
//! a calendar date, and the [`progress`] projection for bounded courses.
//! The shell owns screens and widgets; no business rule lives outside this
//! crate.

pub mod config;
pub mod db;
pub mod models;
pub mod progress;
pub mod recurrence;

pub use db::{DatabaseError, Store};
pub use models::{
    DailyRecord, DurationMode, MedicationDefinition, Schedule,
};
pub use progress::{course_progress, CourseProgress};
pub use recurrence::{due_segments, is_active_on, DoseSegment};

use tracing_subscriber::EnvFilter;

/// Initialize tracing for embedding shells; honors RUST_LOG when set.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} core v{}", config::APP_NAME, config::APP_VERSION);
}
