//! In-memory profile store for tests/dev.
//!
//! Mirrors the constraint semantics of the Postgres store (same error
//! taxonomy, same precedence) so service-level behavior can be exercised
//! without a database.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use playerdex_core::{Profile, Referral, StoreError, StoreResult};

use super::{CreateProfileTxParams, CreateProfileTxResult, EnrichmentMarker, ProfileStore};

#[derive(Debug, Default)]
struct Inner {
    profiles: HashMap<String, Profile>,
    referrals: Vec<Referral>,
    next_referral_id: i64,
    outbox: Vec<EnrichmentMarker>,
    next_marker_id: i64,
}

impl Inner {
    fn gamer_tag_taken(&self, gamer_tag: &str, except_wallet: Option<&str>) -> bool {
        self.profiles.values().any(|p| {
            p.gamer_tag == gamer_tag && Some(p.wallet_address.as_str()) != except_wallet
        })
    }

    fn insert_profile(&mut self, wallet_address: &str, gamer_tag: &str) -> StoreResult<Profile> {
        if self.profiles.contains_key(wallet_address) {
            return Err(StoreError::ProfileAlreadyExists);
        }
        if self.gamer_tag_taken(gamer_tag, None) {
            return Err(StoreError::GamerTagInUse);
        }

        let profile = Profile {
            wallet_address: wallet_address.to_string(),
            gamer_tag: gamer_tag.to_string(),
            created_at: Utc::now(),
        };
        self.profiles
            .insert(wallet_address.to_string(), profile.clone());
        Ok(profile)
    }

    fn insert_referral(&mut self, referrer: &str, referee: &str) -> StoreResult<Referral> {
        if self.referrals.iter().any(|r| r.referee == referee) {
            return Err(StoreError::AlreadyReferred);
        }

        self.next_referral_id += 1;
        let referral = Referral {
            id: self.next_referral_id,
            referrer: referrer.to_string(),
            referee: referee.to_string(),
            referred_at: Utc::now(),
        };
        self.referrals.push(referral.clone());
        Ok(referral)
    }

    fn insert_marker(&mut self, wallet_address: &str) -> EnrichmentMarker {
        self.next_marker_id += 1;
        let marker = EnrichmentMarker {
            id: self.next_marker_id,
            wallet_address: wallet_address.to_string(),
            created_at: Utc::now(),
        };
        self.outbox.push(marker.clone());
        marker
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    inner: Mutex<Inner>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outbox markers not yet cleared. Test visibility.
    pub fn outbox_len(&self) -> usize {
        self.inner.lock().unwrap().outbox.len()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn create_profile(&self, wallet_address: &str, gamer_tag: &str) -> StoreResult<Profile> {
        self.inner
            .lock()
            .unwrap()
            .insert_profile(wallet_address, gamer_tag)
    }

    async fn get_profile(&self, wallet_address: &str) -> StoreResult<Profile> {
        self.inner
            .lock()
            .unwrap()
            .profiles
            .get(wallet_address)
            .cloned()
            .ok_or(StoreError::ProfileNotFound)
    }

    async fn update_profile(
        &self,
        wallet_address: &str,
        gamer_tag: Option<&str>,
    ) -> StoreResult<Profile> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(tag) = gamer_tag {
            if inner.gamer_tag_taken(tag, Some(wallet_address)) {
                return Err(StoreError::GamerTagInUse);
            }
        }

        let profile = inner
            .profiles
            .get_mut(wallet_address)
            .ok_or(StoreError::ProfileNotFound)?;
        if let Some(tag) = gamer_tag {
            profile.gamer_tag = tag.to_string();
        }
        Ok(profile.clone())
    }

    async fn delete_profile(&self, wallet_address: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();

        if inner.profiles.remove(wallet_address).is_none() {
            return Err(StoreError::ProfileNotFound);
        }
        // Referral rows cascade with their profiles.
        inner
            .referrals
            .retain(|r| r.referrer != wallet_address && r.referee != wallet_address);
        Ok(())
    }

    async fn list_profiles(&self, limit: i64, offset: i64) -> StoreResult<Vec<Profile>> {
        let inner = self.inner.lock().unwrap();

        let mut profiles: Vec<Profile> = inner.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| {
            (a.created_at, &a.wallet_address).cmp(&(b.created_at, &b.wallet_address))
        });

        Ok(profiles
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_profiles(&self) -> StoreResult<i64> {
        Ok(self.inner.lock().unwrap().profiles.len() as i64)
    }

    async fn create_referral(&self, referrer: &str, referee: &str) -> StoreResult<Referral> {
        self.inner.lock().unwrap().insert_referral(referrer, referee)
    }

    async fn get_referrer(&self, wallet_address: &str) -> StoreResult<Option<Referral>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .referrals
            .iter()
            .find(|r| r.referee == wallet_address)
            .cloned())
    }

    async fn list_referrals(
        &self,
        referrer: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Referral>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .referrals
            .iter()
            .filter(|r| r.referrer == referrer)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_referrals(&self, referrer: &str) -> StoreResult<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .referrals
            .iter()
            .filter(|r| r.referrer == referrer)
            .count() as i64)
    }

    async fn create_profile_tx(
        &self,
        params: CreateProfileTxParams,
    ) -> StoreResult<CreateProfileTxResult> {
        if let Some(referrer) = &params.referrer {
            if referrer == &params.wallet_address {
                return Err(StoreError::SelfReferral);
            }
        }

        let mut inner = self.inner.lock().unwrap();

        // Run every check before the first mutation so a failure leaves no
        // partial state, matching the transactional store.
        if inner.profiles.contains_key(&params.wallet_address) {
            return Err(StoreError::ProfileAlreadyExists);
        }
        if inner.gamer_tag_taken(&params.gamer_tag, None) {
            return Err(StoreError::GamerTagInUse);
        }
        if let Some(referrer) = &params.referrer {
            if !inner.profiles.contains_key(referrer) {
                return Err(StoreError::ReferrerNotFound);
            }
            if inner
                .referrals
                .iter()
                .any(|r| r.referee == params.wallet_address)
            {
                return Err(StoreError::AlreadyReferred);
            }
        }

        let profile = inner.insert_profile(&params.wallet_address, &params.gamer_tag)?;
        let referral = match &params.referrer {
            Some(referrer) => Some(inner.insert_referral(referrer, &params.wallet_address)?),
            None => None,
        };
        let pending = inner.insert_marker(&params.wallet_address);

        Ok(CreateProfileTxResult {
            profile,
            referral,
            pending,
        })
    }

    async fn stale_enrichment_markers(
        &self,
        older_than: Duration,
        limit: i64,
    ) -> StoreResult<Vec<EnrichmentMarker>> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_default();

        Ok(self
            .inner
            .lock()
            .unwrap()
            .outbox
            .iter()
            .filter(|m| m.created_at < cutoff)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn clear_enrichment_marker(&self, id: i64) -> StoreResult<()> {
        self.inner.lock().unwrap().outbox.retain(|m| m.id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const WALLET_A: &str = "0xaF98EE24f2B9cD08E61dDcC0b3aE1A222F518AB1";
    const WALLET_B: &str = "0xB17d0E0bd527c2EA1c1b904298Aaa9FBfa132dD2";
    const WALLET_C: &str = "0xC44C9eE11366ae4E2F259e145e3Aa1b755AbdB33";

    fn create_params(wallet: &str, tag: &str, referrer: Option<&str>) -> CreateProfileTxParams {
        CreateProfileTxParams {
            wallet_address: wallet.to_string(),
            gamer_tag: tag.to_string(),
            referrer: referrer.map(String::from),
        }
    }

    #[tokio::test]
    async fn create_without_referrer_persists_only_the_profile() {
        let store = InMemoryProfileStore::new();

        let result = store
            .create_profile_tx(create_params(WALLET_A, "foo", None))
            .await
            .unwrap();

        assert_eq!(result.profile.wallet_address, WALLET_A);
        assert_eq!(result.profile.gamer_tag, "foo");
        assert!(result.referral.is_none());
        assert_eq!(result.pending.wallet_address, WALLET_A);
        assert_eq!(store.count_profiles().await.unwrap(), 1);
        assert_eq!(store.get_referrer(WALLET_A).await.unwrap(), None);
    }

    #[tokio::test]
    async fn create_with_referrer_links_the_two_profiles() {
        let store = InMemoryProfileStore::new();
        store.create_profile(WALLET_B, "sponsor").await.unwrap();

        let result = store
            .create_profile_tx(create_params(WALLET_A, "foo", Some(WALLET_B)))
            .await
            .unwrap();

        let referral = result.referral.unwrap();
        assert_eq!(referral.referrer, WALLET_B);
        assert_eq!(referral.referee, WALLET_A);
        assert_eq!(store.count_referrals(WALLET_B).await.unwrap(), 1);
        assert_eq!(
            store.get_referrer(WALLET_A).await.unwrap().unwrap().referrer,
            WALLET_B
        );
    }

    #[tokio::test]
    async fn self_referral_persists_nothing() {
        let store = InMemoryProfileStore::new();

        let err = store
            .create_profile_tx(create_params(WALLET_A, "foo", Some(WALLET_A)))
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::SelfReferral);
        assert_eq!(store.count_profiles().await.unwrap(), 0);
        assert_eq!(store.outbox_len(), 0);
    }

    #[tokio::test]
    async fn unknown_referrer_persists_nothing() {
        let store = InMemoryProfileStore::new();

        let err = store
            .create_profile_tx(create_params(WALLET_A, "foo", Some(WALLET_B)))
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::ReferrerNotFound);
        assert_eq!(store.count_profiles().await.unwrap(), 0);
        assert_eq!(store.outbox_len(), 0);
    }

    #[tokio::test]
    async fn referee_can_only_be_referred_once() {
        let store = InMemoryProfileStore::new();
        store.create_profile(WALLET_B, "sponsor").await.unwrap();
        store.create_profile(WALLET_C, "other").await.unwrap();
        store.create_referral(WALLET_B, WALLET_A).await.unwrap();

        let err = store
            .create_profile_tx(create_params(WALLET_A, "foo", Some(WALLET_C)))
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::AlreadyReferred);
        // The profile insert was rolled back along with the referral.
        assert!(matches!(
            store.get_profile(WALLET_A).await,
            Err(StoreError::ProfileNotFound)
        ));
    }

    #[tokio::test]
    async fn duplicate_wallet_and_gamer_tag_are_distinct_conflicts() {
        let store = InMemoryProfileStore::new();
        store.create_profile(WALLET_A, "foo").await.unwrap();

        let err = store
            .create_profile_tx(create_params(WALLET_A, "bar", None))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::ProfileAlreadyExists);

        let err = store
            .create_profile_tx(create_params(WALLET_B, "foo", None))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::GamerTagInUse);

        assert_eq!(store.count_profiles().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_creates_for_one_wallet_have_a_single_winner() {
        let store = Arc::new(InMemoryProfileStore::new());

        let attempts = (0..8).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .create_profile_tx(create_params(WALLET_A, &format!("tag_{i}"), None))
                    .await
            })
        });

        let mut successes = 0;
        let mut conflicts = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => successes += 1,
                Err(StoreError::ProfileAlreadyExists) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(store.count_profiles().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_changes_only_the_gamer_tag() {
        let store = InMemoryProfileStore::new();
        let created = store.create_profile(WALLET_A, "foo").await.unwrap();

        let updated = store
            .update_profile(WALLET_A, Some("newtag"))
            .await
            .unwrap();
        assert_eq!(updated.gamer_tag, "newtag");
        assert_eq!(updated.wallet_address, WALLET_A);
        assert_eq!(updated.created_at, created.created_at);

        // None leaves the tag unchanged.
        let unchanged = store.update_profile(WALLET_A, None).await.unwrap();
        assert_eq!(unchanged.gamer_tag, "newtag");

        assert!(matches!(
            store.update_profile(WALLET_B, Some("x")).await,
            Err(StoreError::ProfileNotFound)
        ));
    }

    #[tokio::test]
    async fn list_and_count_paginate() {
        let store = InMemoryProfileStore::new();
        store.create_profile(WALLET_A, "aaa").await.unwrap();
        store.create_profile(WALLET_B, "bbb").await.unwrap();
        store.create_profile(WALLET_C, "ccc").await.unwrap();

        assert_eq!(store.count_profiles().await.unwrap(), 3);
        assert_eq!(store.list_profiles(2, 0).await.unwrap().len(), 2);
        assert_eq!(store.list_profiles(2, 2).await.unwrap().len(), 1);
        assert_eq!(store.list_profiles(10, 3).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn stale_markers_honor_the_grace_period() {
        let store = InMemoryProfileStore::new();
        store
            .create_profile_tx(create_params(WALLET_A, "foo", None))
            .await
            .unwrap();

        // Under a generous grace period the fresh marker is invisible.
        assert!(store
            .stale_enrichment_markers(Duration::from_secs(60), 10)
            .await
            .unwrap()
            .is_empty());

        // With no grace period it is due for re-delivery.
        let stale = store
            .stale_enrichment_markers(Duration::ZERO, 10)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);

        store.clear_enrichment_marker(stale[0].id).await.unwrap();
        assert_eq!(store.outbox_len(), 0);
    }
}
