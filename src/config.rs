// ⚙️ Configuration - environment driven, with builder overrides for tests

use std::env;
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "swift_codes.db";
pub const DEFAULT_CODES_FILE: &str = "data/swift_codes.csv";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SWIFT_DB_PATH
    pub db_path: PathBuf,
    /// SWIFT_CODES_FILE_PATH
    pub codes_file: PathBuf,
    /// SWIFT_BIND_ADDR
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            codes_file: PathBuf::from(DEFAULT_CODES_FILE),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            db_path: var("SWIFT_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            codes_file: var("SWIFT_CODES_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.codes_file),
            bind_addr: var("SWIFT_BIND_ADDR").unwrap_or(defaults.bind_addr),
        }
    }

    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = db_path.into();
        self
    }

    pub fn with_codes_file(mut self, codes_file: impl Into<PathBuf>) -> Self {
        self.codes_file = codes_file.into();
        self
    }

    pub fn with_bind_addr(mut self, bind_addr: impl Into<String>) -> Self {
        self.bind_addr = bind_addr.into();
        self
    }
}

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,swift_registry=debug".into()),
        )
        .init();
}
