//! Storage-constraint error classification.
//!
//! Two halves, split so the mapping itself stays a pure function:
//! extraction pulls the normalized `(SQLSTATE, constraint)` pair out of a
//! raw driver error; classification maps known uniqueness violations onto
//! the domain taxonomy. Everything unclassifiable becomes
//! `StoreError::Internal`.

use playerdex_core::StoreError;

/// PostgreSQL SQLSTATE for `unique_violation`.
/// See <https://www.postgresql.org/docs/current/errcodes-appendix.html>.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Constraint names in the schema. Load-bearing: the classifier keys off
/// them, so renaming a constraint in a migration must be mirrored here.
pub const PROFILES_PKEY: &str = "profiles_pkey";
pub const PROFILES_GAMER_TAG_KEY: &str = "profiles_gamer_tag_key";
pub const REFERRALS_REFEREE_KEY: &str = "referrals_referee_key";

/// Normalized `(code, constraint)` pair extracted from a database error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbViolation {
    pub code: String,
    pub constraint: String,
}

/// Pull the SQLSTATE code and violated constraint out of a sqlx error.
/// Returns `None` for anything that is not a database-reported error or
/// that names no constraint (I/O failures, pool errors, row decoding).
pub fn extract_violation(err: &sqlx::Error) -> Option<DbViolation> {
    let db_err = match err {
        sqlx::Error::Database(db_err) => db_err,
        _ => return None,
    };

    let code = db_err.code()?.into_owned();
    let constraint = db_err.constraint()?.to_string();

    Some(DbViolation { code, constraint })
}

/// Map a normalized violation onto the conflict taxonomy. Pure; anything
/// other than a known uniqueness violation yields `None`.
pub fn classify_violation(violation: &DbViolation) -> Option<StoreError> {
    if violation.code != UNIQUE_VIOLATION {
        return None;
    }

    match violation.constraint.as_str() {
        PROFILES_PKEY => Some(StoreError::ProfileAlreadyExists),
        PROFILES_GAMER_TAG_KEY => Some(StoreError::GamerTagInUse),
        REFERRALS_REFEREE_KEY => Some(StoreError::AlreadyReferred),
        _ => None,
    }
}

/// Classify a raw sqlx error at the store boundary: a known conflict, or
/// an opaque internal failure tagged with the failing operation.
pub fn store_error(operation: &str, err: sqlx::Error) -> StoreError {
    if let Some(violation) = extract_violation(&err) {
        if let Some(classified) = classify_violation(&violation) {
            return classified;
        }
    }

    StoreError::internal(format!("{operation}: {err}"))
}
