//! Domain model for the playerdex profile service.
//!
//! Pure types only: profile/referral records, the store error taxonomy,
//! and input validation. Infrastructure (Postgres, Redis, the task queue)
//! lives in `playerdex-infra`.

pub mod error;
pub mod profile;
pub mod validate;

pub use error::{StoreError, StoreResult};
pub use profile::{Profile, Referral};
pub use validate::{validate_gamer_tag, validate_wallet_address, ValidationError};
