//! Profile storage: the store abstraction and its implementations.

pub mod classify;
pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use playerdex_core::{Profile, Referral, StoreResult};

pub use memory::InMemoryProfileStore;
pub use postgres::PgProfileStore;

/// A pending enrichment side effect, recorded in the same transaction as
/// the profile write (transactional outbox row). The orchestrator enqueues
/// it after commit and clears it; markers left behind by a crash are
/// re-delivered by the relay sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentMarker {
    pub id: i64,
    pub wallet_address: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for the composite profile-creation transaction.
#[derive(Debug, Clone)]
pub struct CreateProfileTxParams {
    pub wallet_address: String,
    pub gamer_tag: String,
    /// Wallet address of an existing sponsoring profile, if any.
    pub referrer: Option<String>,
}

/// Result of the composite profile-creation transaction.
#[derive(Debug, Clone)]
pub struct CreateProfileTxResult {
    pub profile: Profile,
    pub referral: Option<Referral>,
    /// Side effect to execute after commit.
    pub pending: EnrichmentMarker,
}

/// Profile and referral persistence.
///
/// All errors are pre-classified into the `StoreError` taxonomy; raw driver
/// errors never cross this boundary.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn create_profile(&self, wallet_address: &str, gamer_tag: &str) -> StoreResult<Profile>;

    async fn get_profile(&self, wallet_address: &str) -> StoreResult<Profile>;

    /// Update the gamer tag; `None` leaves it unchanged. `wallet_address`
    /// and `created_at` are immutable.
    async fn update_profile(
        &self,
        wallet_address: &str,
        gamer_tag: Option<&str>,
    ) -> StoreResult<Profile>;

    async fn delete_profile(&self, wallet_address: &str) -> StoreResult<()>;

    async fn list_profiles(&self, limit: i64, offset: i64) -> StoreResult<Vec<Profile>>;

    async fn count_profiles(&self) -> StoreResult<i64>;

    async fn create_referral(&self, referrer: &str, referee: &str) -> StoreResult<Referral>;

    /// The referral naming `wallet_address` as referee, if one exists.
    async fn get_referrer(&self, wallet_address: &str) -> StoreResult<Option<Referral>>;

    async fn list_referrals(
        &self,
        referrer: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Referral>>;

    async fn count_referrals(&self, referrer: &str) -> StoreResult<i64>;

    /// Atomically create a profile, its optional referral, and the
    /// enrichment outbox marker. Either all rows are persisted or none.
    ///
    /// Conflicts surface as `ProfileAlreadyExists` / `GamerTagInUse` /
    /// `SelfReferral` / `ReferrerNotFound` / `AlreadyReferred`.
    async fn create_profile_tx(
        &self,
        params: CreateProfileTxParams,
    ) -> StoreResult<CreateProfileTxResult>;

    /// Outbox markers older than `older_than`, oldest first: the ones whose
    /// post-commit dispatch evidently never ran.
    async fn stale_enrichment_markers(
        &self,
        older_than: Duration,
        limit: i64,
    ) -> StoreResult<Vec<EnrichmentMarker>>;

    /// Remove a marker once its task has been enqueued.
    async fn clear_enrichment_marker(&self, id: i64) -> StoreResult<()>;
}
