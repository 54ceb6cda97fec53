// 🧭 Registry Service - add/delete/lookup orchestration
//
// Each request: validate → classify → resolve hierarchy → persist → report.
// Mutations on one prefix are serialised so the lookup-then-update steps of
// two requests on the same hierarchy cannot interleave.

use crate::code::{self, PREFIX_LEN};
use crate::entities::{
    CountryListing, NewSwiftCode, SwiftCode, SwiftCodeDetails, SwiftCodeSummary, UNKNOWN,
};
use crate::error::RegistryError;
use crate::hierarchy::Resolver;
use crate::store::{Event, RegistryStore};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

const MISSING_FIELDS: &str = "Missing required fields. Please provide address, bankName, \
     countryISO2, countryName, isHeadquarter, and swiftCode.";

const ACTOR: &str = "registry_service";

/// Successful mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MutationOutcome {
    Created { swift_code: String, message: String },
    Deleted { swift_code: String, message: String },
}

impl MutationOutcome {
    pub fn message(&self) -> &str {
        match self {
            MutationOutcome::Created { message, .. } | MutationOutcome::Deleted { message, .. } => {
                message
            }
        }
    }
}

/// Lock for one prefix plus the number of requests holding or waiting for it
#[derive(Default)]
struct PrefixSlot {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

type PrefixLocks = Mutex<HashMap<String, PrefixSlot>>;

/// Held prefix lock. Dropping it releases the lock and forgets the prefix
/// once nobody else holds or waits for it.
struct PrefixGuard<'a> {
    locks: &'a PrefixLocks,
    prefix: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PrefixGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = locks.get_mut(&self.prefix) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                locks.remove(&self.prefix);
            }
        }
    }
}

pub struct RegistryService {
    store: Arc<dyn RegistryStore>,
    prefix_locks: PrefixLocks,
}

impl RegistryService {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self {
            store,
            prefix_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &dyn RegistryStore {
        self.store.as_ref()
    }

    /// Serialise mutations on one hierarchy. The map entry lives only while
    /// someone holds or waits for the lock.
    async fn lock_prefix(&self, prefix: &str) -> PrefixGuard<'_> {
        let lock = {
            let mut locks = self
                .prefix_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let slot = locks.entry(prefix.to_string()).or_default();
            slot.users += 1;
            Arc::clone(&slot.lock)
        };

        // Built before awaiting so a cancelled waiter still gives up its slot
        let mut held = PrefixGuard {
            locks: &self.prefix_locks,
            prefix: prefix.to_string(),
            guard: None,
        };
        held.guard = Some(lock.lock_owned().await);
        held
    }

    async fn audit(&self, event_type: &str, entity_id: &str, data: serde_json::Value) {
        let event = Event::new(event_type, entity_id, data, ACTOR);
        if let Err(e) = self.store.record_event(&event).await {
            warn!(error = %e, entity = %entity_id, "Failed to record audit event");
        }
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Validate, normalize and insert a new code, keeping its hierarchy
    /// consistent.
    pub async fn add(&self, request: NewSwiftCode) -> Result<MutationOutcome, RegistryError> {
        let entity = validate_new_code(request)?;
        let prefix = entity.prefix().to_string();

        let _guard = self.lock_prefix(&prefix).await;

        if self.store.find_by_code(&entity.swift_code).await?.is_some() {
            return Err(RegistryError::Conflict(format!(
                "SWIFT code {} already exists in the database",
                entity.swift_code
            )));
        }

        let resolver = Resolver::new(self.store.as_ref());
        let data = if entity.is_headquarter {
            let hq = resolver.add_headquarters(entity.clone()).await?;
            serde_json::json!({ "isHeadquarter": true, "adoptedBranches": hq.branches })
        } else {
            let linked = resolver.add_branch(&entity).await?;
            serde_json::json!({ "isHeadquarter": false, "headquarters": linked })
        };

        self.audit("swift_code_added", &entity.swift_code, data).await;

        Ok(MutationOutcome::Created {
            message: format!("Successfully added SWIFT code {}", entity.swift_code),
            swift_code: entity.swift_code,
        })
    }

    /// Delete a code. Deleting a branch unlinks it from its headquarters;
    /// deleting a headquarters leaves its branches in place, orphaned.
    pub async fn delete(&self, raw_code: &str) -> Result<MutationOutcome, RegistryError> {
        let swift_code = code::normalize_code(raw_code);
        if swift_code.is_empty() {
            return Err(RegistryError::Validation("SWIFT code is required".to_string()));
        }

        // Unknown codes never reach the lock table
        if self.store.find_by_code(&swift_code).await?.is_none() {
            return Err(not_found_for_delete(&swift_code));
        }

        let prefix = swift_code.get(..PREFIX_LEN).unwrap_or(&swift_code).to_string();
        let _guard = self.lock_prefix(&prefix).await;

        let Some(existing) = self.store.find_by_code(&swift_code).await? else {
            return Err(not_found_for_delete(&swift_code));
        };

        if existing.is_headquarter {
            if !existing.branches.is_empty() {
                info!(
                    headquarters = %swift_code,
                    orphaned = existing.branches.len(),
                    "Deleting headquarters, branches stay in the registry"
                );
            }
        } else {
            Resolver::new(self.store.as_ref())
                .unlink_branch(&existing)
                .await?;
        }

        if self.store.delete(&swift_code).await? == 0 {
            warn!(code = %swift_code, "Record disappeared between lookup and delete");
            return Err(RegistryError::DeleteFailed(format!(
                "Failed to delete SWIFT code {}",
                swift_code
            )));
        }

        self.audit(
            "swift_code_deleted",
            &swift_code,
            serde_json::json!({ "isHeadquarter": existing.is_headquarter }),
        )
        .await;

        Ok(MutationOutcome::Deleted {
            message: format!("Successfully deleted SWIFT code {}", swift_code),
            swift_code,
        })
    }

    // ========================================================================
    // LOOKUPS
    // ========================================================================

    /// A single code. Headquarters come with their branches expanded.
    pub async fn lookup(&self, raw_code: &str) -> Result<SwiftCodeDetails, RegistryError> {
        let swift_code = code::normalize_code(raw_code);

        let Some(entity) = self.store.find_by_code(&swift_code).await? else {
            return Err(RegistryError::NotFound(format!(
                "SWIFT code {} not found",
                swift_code
            )));
        };

        let branches = if entity.is_headquarter {
            let found = self.store.find_by_codes(&entity.branches).await?;
            Some(found.iter().map(SwiftCode::to_summary).collect::<Vec<SwiftCodeSummary>>())
        } else {
            None
        };

        Ok(SwiftCodeDetails {
            code: entity.to_summary(),
            branches,
        })
    }

    /// All codes of one country; the country code is case-insensitive
    pub async fn by_country(&self, raw_iso2: &str) -> Result<CountryListing, RegistryError> {
        let country_iso2 = raw_iso2.trim().to_uppercase();
        let codes = self.store.find_by_country(&country_iso2).await?;

        let Some(first) = codes.first() else {
            return Err(RegistryError::NotFound(format!(
                "SWIFT codes for country {} not found",
                country_iso2
            )));
        };

        Ok(CountryListing {
            country_name: first.country_name.clone(),
            swift_codes: codes.iter().map(SwiftCode::to_country_entry).collect(),
            country_iso2,
        })
    }
}

fn not_found_for_delete(swift_code: &str) -> RegistryError {
    RegistryError::NotFound(format!(
        "SWIFT code {} not found in the database",
        swift_code
    ))
}

// ============================================================================
// VALIDATION
// ============================================================================

fn required(field: Option<String>) -> Option<String> {
    field
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Turn an add request into a normalized record, or explain what is wrong
/// with it.
pub fn validate_new_code(request: NewSwiftCode) -> Result<SwiftCode, RegistryError> {
    let (
        Some(address),
        Some(bank_name),
        Some(country_iso2),
        Some(country_name),
        Some(declared_headquarter),
        Some(raw_code),
    ) = (
        required(request.address),
        required(request.bank_name),
        required(request.country_iso2),
        required(request.country_name),
        request.is_headquarter,
        required(request.swift_code),
    )
    else {
        return Err(RegistryError::Validation(MISSING_FIELDS.to_string()));
    };

    let identity = code::classify(&code::normalize_code(&raw_code))?;
    debug!(code = %identity, "Validated new SWIFT code");

    if declared_headquarter && !identity.is_headquarter {
        return Err(RegistryError::Validation(
            "Headquarters SWIFT codes must end with XXX.".to_string(),
        ));
    }
    if !declared_headquarter && identity.is_headquarter {
        return Err(RegistryError::Validation(
            "SWIFT codes ending with XXX must be registered as headquarters.".to_string(),
        ));
    }

    Ok(SwiftCode {
        country_iso2: country_iso2.to_uppercase(),
        swift_code: identity.code,
        code_type: UNKNOWN.to_string(),
        name: bank_name,
        address,
        town_name: UNKNOWN.to_string(),
        country_name: country_name.to_uppercase(),
        time_zone: UNKNOWN.to_string(),
        is_headquarter: identity.is_headquarter,
        branches: Vec::new(),
    })
}
