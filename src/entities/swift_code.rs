// 🏦 SWIFT Code Entity - one registry record + its public views
//
// Identity is the code itself (globally unique). Hierarchy membership is
// derived from the code: headquarters carry the list of branch codes that
// share their prefix, branches carry nothing.

use crate::code::PREFIX_LEN;
use serde::{Deserialize, Serialize};

/// Placeholder for descriptive fields that the source did not provide
pub const UNKNOWN: &str = "UNKNOWN";

// ============================================================================
// REGISTRY RECORD
// ============================================================================

/// Persisted record shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwiftCode {
    #[serde(rename = "countryISO2")]
    pub country_iso2: String,
    pub swift_code: String,
    pub code_type: String,
    pub name: String,
    pub address: String,
    pub town_name: String,
    pub country_name: String,
    pub time_zone: String,
    pub is_headquarter: bool,

    /// Full codes of linked branches. Always empty for a branch.
    #[serde(default)]
    pub branches: Vec<String>,
}

impl SwiftCode {
    /// Hierarchy grouping key. Falls back to the whole code for codes
    /// that never passed classification.
    pub fn prefix(&self) -> &str {
        self.swift_code.get(..PREFIX_LEN).unwrap_or(&self.swift_code)
    }

    /// Set-add: a branch code appears at most once
    pub fn link_branch(&mut self, branch_code: &str) -> bool {
        if self.branches.iter().any(|b| b == branch_code) {
            return false;
        }
        self.branches.push(branch_code.to_string());
        true
    }

    pub fn to_summary(&self) -> SwiftCodeSummary {
        SwiftCodeSummary {
            address: self.address.clone(),
            bank_name: self.name.clone(),
            country_iso2: self.country_iso2.clone(),
            country_name: self.country_name.clone(),
            is_headquarter: self.is_headquarter,
            swift_code: self.swift_code.clone(),
        }
    }

    pub fn to_country_entry(&self) -> CountryEntry {
        CountryEntry {
            address: self.address.clone(),
            bank_name: self.name.clone(),
            country_iso2: self.country_iso2.clone(),
            is_headquarter: self.is_headquarter,
            swift_code: self.swift_code.clone(),
        }
    }
}

// ============================================================================
// INPUT
// ============================================================================

/// Body of an add request. Every field is optional at the wire level so
/// that a missing field becomes a validation error, not a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSwiftCode {
    pub address: Option<String>,
    pub bank_name: Option<String>,
    #[serde(rename = "countryISO2")]
    pub country_iso2: Option<String>,
    pub country_name: Option<String>,
    pub is_headquarter: Option<bool>,
    pub swift_code: Option<String>,
}

// ============================================================================
// PUBLIC VIEWS
// ============================================================================

/// Public fields of a single code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwiftCodeSummary {
    pub address: String,
    pub bank_name: String,
    #[serde(rename = "countryISO2")]
    pub country_iso2: String,
    pub country_name: String,
    pub is_headquarter: bool,
    pub swift_code: String,
}

/// Response of a lookup by code. `branches` is present only for
/// headquarters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwiftCodeDetails {
    #[serde(flatten)]
    pub code: SwiftCodeSummary,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<SwiftCodeSummary>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryEntry {
    pub address: String,
    pub bank_name: String,
    #[serde(rename = "countryISO2")]
    pub country_iso2: String,
    pub is_headquarter: bool,
    pub swift_code: String,
}

/// Response of a lookup by country
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryListing {
    #[serde(rename = "countryISO2")]
    pub country_iso2: String,
    pub country_name: String,
    pub swift_codes: Vec<CountryEntry>,
}
