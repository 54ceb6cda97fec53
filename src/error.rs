use crate::code::CodeError;
use crate::store::StoreError;
use thiserror::Error;

/// Outcome of a failed registry operation. The display text of every
/// variant except `Store` is safe to hand back to the caller.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Missing or contradictory input
    #[error("{0}")]
    Validation(String),

    /// Duplicate code, or a second headquarters for one prefix
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// The record vanished between lookup and delete
    #[error("{0}")]
    DeleteFailed(String),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl RegistryError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Conflict(_) => 409,
            Self::NotFound(_) => 404,
            Self::DeleteFailed(_) => 404,
            Self::Store(_) => 500,
        }
    }

    /// Message for the response body. Store details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Store(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Insert failures that break a registry invariant become conflicts
    pub(crate) fn from_insert(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(code) => {
                Self::Conflict(format!("SWIFT code {} already exists in the database", code))
            }
            StoreError::HeadquarterExists(prefix) => Self::Conflict(format!(
                "A headquarters SWIFT code already exists for prefix {}",
                prefix
            )),
            other => Self::Store(other),
        }
    }
}

impl From<CodeError> for RegistryError {
    fn from(err: CodeError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status() {
        assert_eq!(RegistryError::Validation("x".into()).http_status(), 400);
        assert_eq!(RegistryError::Conflict("x".into()).http_status(), 409);
        assert_eq!(RegistryError::NotFound("x".into()).http_status(), 404);
        assert_eq!(RegistryError::DeleteFailed("x".into()).http_status(), 404);
        assert_eq!(RegistryError::Store(StoreError::Poisoned).http_status(), 500);
    }

    #[test]
    fn test_store_details_not_leaked() {
        let err = RegistryError::Store(StoreError::Poisoned);
        assert_eq!(err.public_message(), "Internal server error");

        let err = RegistryError::NotFound("SWIFT code AAAABBCC not found".into());
        assert_eq!(err.public_message(), "SWIFT code AAAABBCC not found");
    }

    #[test]
    fn test_from_insert() {
        let err = RegistryError::from_insert(StoreError::Duplicate("CHASUS33BRN".into()));
        assert!(matches!(err, RegistryError::Conflict(_)));
        assert_eq!(
            err.to_string(),
            "SWIFT code CHASUS33BRN already exists in the database"
        );

        let err = RegistryError::from_insert(StoreError::HeadquarterExists("CHASUS33".into()));
        assert!(matches!(err, RegistryError::Conflict(_)));

        let err = RegistryError::from_insert(StoreError::Poisoned);
        assert!(matches!(err, RegistryError::Store(_)));
    }

    #[test]
    fn test_code_error_is_validation() {
        let err: RegistryError = CodeError::Empty.into();
        assert_eq!(err.http_status(), 400);
    }
}
