// 📥 Bulk Import - registry file → resolved hierarchy → SQLite
//
// Each row is trimmed, country fields and the code upper-cased, and missing
// values replaced by UNKNOWN before the two-pass hierarchy resolution runs.

use crate::code::{self, CodeError};
use crate::entities::{SwiftCode, UNKNOWN};
use crate::error::RegistryError;
use crate::hierarchy::resolve_bulk;
use crate::store::{Event, RegistryStore};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// One row of the registry file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportRow {
    #[serde(rename = "COUNTRY ISO2 CODE", default)]
    pub country_iso2: Option<String>,

    #[serde(rename = "SWIFT CODE", default)]
    pub swift_code: Option<String>,

    #[serde(rename = "CODE TYPE", default)]
    pub code_type: Option<String>,

    #[serde(rename = "NAME", default)]
    pub name: Option<String>,

    #[serde(rename = "ADDRESS", default)]
    pub address: Option<String>,

    #[serde(rename = "TOWN NAME", default)]
    pub town_name: Option<String>,

    #[serde(rename = "COUNTRY NAME", default)]
    pub country_name: Option<String>,

    #[serde(rename = "TIME ZONE", default)]
    pub time_zone: Option<String>,
}

fn field(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

impl ImportRow {
    /// Normalize the row. Fails only when the code cannot be classified.
    pub fn into_swift_code(self) -> Result<SwiftCode, CodeError> {
        let swift_code = code::normalize_code(&field(self.swift_code));
        let identity = code::classify(&swift_code)?;

        Ok(SwiftCode {
            country_iso2: field(self.country_iso2).to_uppercase(),
            swift_code: identity.code,
            code_type: field(self.code_type),
            name: field(self.name),
            address: field(self.address),
            town_name: field(self.town_name),
            country_name: field(self.country_name).to_uppercase(),
            time_zone: field(self.time_zone),
            is_headquarter: identity.is_headquarter,
            branches: Vec::new(),
        })
    }
}

/// A row left out of the import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub line: usize,
    pub reason: String,
}

/// Parsed file contents, ready for hierarchy resolution
#[derive(Debug, Default)]
pub struct LoadedRows {
    pub codes: Vec<SwiftCode>,
    pub skipped: Vec<SkippedRow>,
}

pub fn load_csv(csv_path: &Path) -> Result<LoadedRows> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;
    read_rows(file)
}

pub fn read_rows<R: Read>(reader: R) -> Result<LoadedRows> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut loaded = LoadedRows::default();

    for (index, result) in rdr.deserialize::<ImportRow>().enumerate() {
        // Header is line 1
        let line = index + 2;
        let row = result.with_context(|| format!("Failed to deserialize row on line {}", line))?;

        match row.into_swift_code() {
            Ok(code) => loaded.codes.push(code),
            Err(e) => {
                warn!(line, reason = %e, "Skipping row");
                loaded.skipped.push(SkippedRow {
                    line,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(loaded)
}

// ============================================================================
// IMPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub parsed: usize,
    pub inserted: usize,
    pub headquarters: usize,
    pub linked_branches: usize,
    pub orphaned_branches: usize,
    pub superseded_headquarters: Vec<String>,
    pub duplicate_codes: Vec<String>,
    pub skipped_rows: Vec<SkippedRow>,
}

/// Replace the registry contents with `loaded`, linking branches to their
/// headquarters on the way in.
pub async fn import_registry(
    store: &dyn RegistryStore,
    loaded: LoadedRows,
) -> Result<ImportReport, RegistryError> {
    let parsed = loaded.codes.len();
    let resolution = resolve_bulk(loaded.codes);

    let inserted = store.replace_all(&resolution.entities).await?;

    let report = ImportReport {
        parsed,
        inserted,
        headquarters: resolution.headquarters(),
        linked_branches: resolution.linked_branches,
        orphaned_branches: resolution.orphaned_branches.len(),
        superseded_headquarters: resolution.superseded_headquarters,
        duplicate_codes: resolution.duplicate_codes,
        skipped_rows: loaded.skipped,
    };

    info!(
        inserted = report.inserted,
        headquarters = report.headquarters,
        linked = report.linked_branches,
        orphaned = report.orphaned_branches,
        skipped = report.skipped_rows.len(),
        "Registry import complete"
    );

    let event = Event::new(
        "registry_imported",
        "registry",
        serde_json::to_value(&report).map_err(crate::store::StoreError::from)?,
        "csv_importer",
    );
    if let Err(e) = store.record_event(&event).await {
        warn!(error = %e, "Failed to record import event");
    }

    Ok(report)
}
