use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Medtrack";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset
pub fn default_log_filter() -> &'static str {
    "medtrack=info"
}

/// Get the application data directory
/// ~/Medtrack/ on all platforms (user-visible, single-user local data)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Medtrack")
}

/// Path of the tracker database
pub fn database_path() -> PathBuf {
    app_data_dir().join("medtrack.db")
}
