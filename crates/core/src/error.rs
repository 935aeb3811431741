//! Store error taxonomy.

use thiserror::Error;

/// Result type used across the store and service layers.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the profile store and its orchestrating service.
///
/// Conflicts and precondition failures are distinct variants so callers can
/// map them to distinct client-facing statuses; `Internal` is the catch-all
/// for unclassified storage or queue failures. Raw driver errors never
/// escape the store boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A profile already exists for this wallet address.
    #[error("profile already exists")]
    ProfileAlreadyExists,

    /// The requested gamer tag is held by another profile.
    #[error("gamer tag already in use")]
    GamerTagInUse,

    /// The referrer and the new profile share a wallet address.
    #[error("a user cannot refer themselves")]
    SelfReferral,

    /// The named referrer has no profile.
    #[error("referrer does not exist")]
    ReferrerNotFound,

    /// The referee already has a referral on record.
    #[error("user already referred")]
    AlreadyReferred,

    /// No profile exists for this wallet address.
    #[error("profile does not exist")]
    ProfileNotFound,

    /// Unclassified storage, cache, or queue failure.
    #[error("internal failure: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is a uniqueness/precondition conflict rather than
    /// an infrastructure failure.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::ProfileAlreadyExists
                | StoreError::GamerTagInUse
                | StoreError::SelfReferral
                | StoreError::ReferrerNotFound
                | StoreError::AlreadyReferred
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_distinguishable_from_internal() {
        assert!(StoreError::ProfileAlreadyExists.is_conflict());
        assert!(StoreError::AlreadyReferred.is_conflict());
        assert!(!StoreError::ProfileNotFound.is_conflict());
        assert!(!StoreError::internal("boom").is_conflict());
    }
}
