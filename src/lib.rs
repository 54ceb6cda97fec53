// SWIFT Code Registry - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod code;       // Code identity: prefix + headquarters/branch role
pub mod config;
pub mod db;         // SQLite-backed registry store
pub mod entities;
pub mod error;
pub mod hierarchy;  // Headquarters ↔ branch resolution (bulk + incremental)
pub mod import;     // CSV bulk import
pub mod service;    // Add / delete / lookup orchestration
pub mod store;      // Registry store contract

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use code::{classify, normalize_code, CodeError, CodeIdentity, CodeRole};
pub use config::Config;
pub use db::{setup_database, SqliteStore};
pub use entities::{
    CountryEntry, CountryListing, NewSwiftCode, SwiftCode, SwiftCodeDetails, SwiftCodeSummary,
};
pub use error::RegistryError;
pub use hierarchy::{resolve_bulk, BulkResolution, Resolver};
pub use import::{import_registry, load_csv, ImportReport, LoadedRows};
pub use service::{MutationOutcome, RegistryService};
pub use store::{BranchUpdate, Event, RegistryStats, RegistryStore, StoreError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
