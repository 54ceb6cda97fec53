// 🗄️ Registry Store - persistence contract the hierarchy logic depends on
//
// Every method is atomic for a single record. Nothing here spans two
// records in one transaction except `replace_all`, which reloads the whole
// registry during a bulk import.

use crate::entities::SwiftCode;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// `swift_code` uniqueness violated
    #[error("SWIFT code {0} already exists")]
    Duplicate(String),

    /// Prefix index already points at a headquarters
    #[error("a headquarters already exists for prefix {0}")]
    HeadquarterExists(String),

    #[error("database error: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store connection lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Mutation of a headquarters' branch list. `Add` and `Remove` are set
/// operations applied by the store itself, so two writers touching the same
/// headquarters never overwrite each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchUpdate {
    Add(String),
    Remove(String),
}

/// Audit trail entry ("every change is an event")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(event_type: &str, entity_id: &str, data: serde_json::Value, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Counts reported by `swift-registry stats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: i64,
    pub headquarters: i64,
    pub branches: i64,
    pub linked_branches: i64,
    pub orphaned_branches: i64,
}

#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn find_by_code(&self, code: &str) -> StoreResult<Option<SwiftCode>>;

    /// Existing records among `codes`, in the order given. Missing codes are
    /// skipped.
    async fn find_by_codes(&self, codes: &[String]) -> StoreResult<Vec<SwiftCode>>;

    /// First record with this prefix and role
    async fn find_by_prefix(&self, prefix: &str, is_headquarter: bool)
        -> StoreResult<Option<SwiftCode>>;

    async fn find_branches_by_prefix(&self, prefix: &str) -> StoreResult<Vec<SwiftCode>>;

    /// `iso2` must already be upper-cased
    async fn find_by_country(&self, iso2: &str) -> StoreResult<Vec<SwiftCode>>;

    async fn insert(&self, entity: &SwiftCode) -> StoreResult<()>;

    async fn update_branch_list(&self, headquarter_code: &str, update: BranchUpdate)
        -> StoreResult<()>;

    /// Returns the number of records removed (0 or 1)
    async fn delete(&self, code: &str) -> StoreResult<usize>;

    /// Clear the registry and load `entities` in one transaction
    async fn replace_all(&self, entities: &[SwiftCode]) -> StoreResult<usize>;

    async fn stats(&self) -> StoreResult<RegistryStats>;

    async fn record_event(&self, event: &Event) -> StoreResult<()>;

    async fn events_for(&self, entity_id: &str) -> StoreResult<Vec<Event>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_new() {
        let event = Event::new(
            "swift_code_added",
            "CHASUS33XXX",
            serde_json::json!({"isHeadquarter": true}),
            "api",
        );

        assert_eq!(event.event_id.len(), 36);
        assert_eq!(event.entity_id, "CHASUS33XXX");
        assert_eq!(event.data["isHeadquarter"], true);
    }

    #[test]
    fn test_store_error_messages() {
        assert_eq!(
            StoreError::Duplicate("CHASUS33XXX".into()).to_string(),
            "SWIFT code CHASUS33XXX already exists"
        );
        assert_eq!(
            StoreError::HeadquarterExists("CHASUS33".into()).to_string(),
            "a headquarters already exists for prefix CHASUS33"
        );
    }
}
