//! Profile service: orchestrates the store, cache, and task queue.
//!
//! This is the layer that executes side effects the store only records.
//! The composite create returns with its outbox marker still pending; the
//! service enqueues the enrichment task after commit and clears the marker.
//! Markers whose dispatch never happened (crash between commit and enqueue,
//! broker outage) are re-delivered by the relay sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use playerdex_core::{Profile, Referral, StoreError, StoreResult};

use crate::cache::{Cache, CacheLookup};
use crate::enrichment::{ens_cache_key, CacheEnsNamePayload, TASK_CACHE_ENS_NAME};
use crate::jobs::{Queue, TaskDistributor};
use crate::store::{CreateProfileTxParams, EnrichmentMarker, ProfileStore};

/// Enrichment scheduling policy, built once at startup.
#[derive(Debug, Clone)]
pub struct EnrichmentPolicy {
    /// Queue for enqueues riding on profile creation.
    pub create_queue: Queue,
    /// Delay before a creation-time task becomes claimable.
    pub create_delay: Duration,
    /// Queue for cache-miss refreshes triggered by reads.
    pub refresh_queue: Queue,
    /// Retry budget for enrichment tasks.
    pub max_retries: u32,
}

impl Default for EnrichmentPolicy {
    fn default() -> Self {
        Self {
            create_queue: Queue::Critical,
            create_delay: Duration::from_secs(10),
            refresh_queue: Queue::Default,
            max_retries: 10,
        }
    }
}

/// A profile plus its derived name.
///
/// `ens_name` is empty when the name is still unresolved (a refresh task is
/// then in flight) or when resolution found nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedProfile {
    pub profile: Profile,
    pub ens_name: String,
}

/// Handle to the running outbox relay.
pub struct RelayHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RelayHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

pub struct ProfileService {
    store: Arc<dyn ProfileStore>,
    cache: Arc<dyn Cache>,
    distributor: TaskDistributor,
    policy: EnrichmentPolicy,
}

impl ProfileService {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        cache: Arc<dyn Cache>,
        distributor: TaskDistributor,
        policy: EnrichmentPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            distributor,
            policy,
        }
    }

    /// Direct access for the plain CRUD/listing operations that need no
    /// orchestration.
    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    /// Create a profile and its optional referral, then schedule the ENS
    /// enrichment recorded by the transaction.
    ///
    /// A dispatch failure after commit does not fail the call: the marker
    /// row survives and the relay re-delivers it.
    pub async fn create_profile_with_referral(
        &self,
        wallet_address: &str,
        gamer_tag: &str,
        referrer: Option<&str>,
    ) -> StoreResult<(Profile, Option<Referral>)> {
        let result = self
            .store
            .create_profile_tx(CreateProfileTxParams {
                wallet_address: wallet_address.to_string(),
                gamer_tag: gamer_tag.to_string(),
                referrer: referrer.map(String::from),
            })
            .await?;

        if let Err(e) = self.dispatch_marker(&result.pending).await {
            warn!(
                wallet_address,
                error = %e,
                "post-commit enrichment dispatch failed, leaving marker for relay"
            );
        }

        info!(wallet_address, gamer_tag, "created profile");
        Ok((result.profile, result.referral))
    }

    /// Fetch a profile together with its cached ENS name; a cache miss
    /// schedules an asynchronous refresh and reports the name as empty.
    pub async fn get_profile_with_enrichment(
        &self,
        wallet_address: &str,
    ) -> StoreResult<EnrichedProfile> {
        let profile = self.store.get_profile(wallet_address).await?;
        let ens_name = self.cached_name_or_schedule(wallet_address).await?;

        Ok(EnrichedProfile { profile, ens_name })
    }

    /// Update the gamer tag and return the profile with its cached ENS
    /// name, scheduling a refresh on cache miss as the read path does.
    pub async fn update_profile_with_enrichment(
        &self,
        wallet_address: &str,
        gamer_tag: Option<&str>,
    ) -> StoreResult<EnrichedProfile> {
        let profile = self.store.update_profile(wallet_address, gamer_tag).await?;
        let ens_name = self.cached_name_or_schedule(wallet_address).await?;

        info!(wallet_address, "updated profile");
        Ok(EnrichedProfile { profile, ens_name })
    }

    /// List a page of profiles with whatever names are already cached.
    /// Misses schedule default-queue backfills; the page never waits on
    /// resolution.
    pub async fn list_profiles_with_enrichment(
        &self,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<EnrichedProfile>> {
        let profiles = self.store.list_profiles(limit, offset).await?;

        let mut enriched = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let ens_name = self.cached_name_or_schedule(&profile.wallet_address).await?;
            enriched.push(EnrichedProfile { profile, ens_name });
        }
        Ok(enriched)
    }

    /// Cache-aside read: hits (including negative ones) return immediately;
    /// a miss fires a refresh task and reports the empty name. Failing to
    /// schedule that refresh is an error: the caller is told enrichment
    /// could not be arranged rather than being silently left stale.
    async fn cached_name_or_schedule(&self, wallet_address: &str) -> StoreResult<String> {
        let lookup = self
            .cache
            .get(&ens_cache_key(wallet_address))
            .await
            .map_err(|e| StoreError::internal(format!("ens cache read: {e}")))?;

        match lookup {
            CacheLookup::Value(name) => Ok(name),
            CacheLookup::Empty => Ok(String::new()),
            CacheLookup::Miss => {
                self.enqueue_enrichment(wallet_address, self.policy.refresh_queue, None)
                    .await
                    .map_err(|e| StoreError::internal(format!("schedule ens refresh: {e}")))?;
                Ok(String::new())
            }
        }
    }

    /// Enqueue the task a pending outbox marker stands for, then clear the
    /// marker. Order matters: clearing first could lose the task, enqueueing
    /// first can at worst duplicate it.
    pub async fn dispatch_marker(&self, marker: &EnrichmentMarker) -> StoreResult<()> {
        self.enqueue_enrichment(
            &marker.wallet_address,
            self.policy.create_queue,
            Some(self.policy.create_delay),
        )
        .await
        .map_err(|e| StoreError::internal(format!("enqueue enrichment: {e}")))?;

        self.store.clear_enrichment_marker(marker.id).await?;
        Ok(())
    }

    async fn enqueue_enrichment(
        &self,
        wallet_address: &str,
        queue: Queue,
        delay: Option<Duration>,
    ) -> Result<(), crate::jobs::TaskStoreError> {
        self.distributor
            .enqueue(
                TASK_CACHE_ENS_NAME,
                &CacheEnsNamePayload {
                    wallet_address: wallet_address.to_string(),
                },
                queue,
                self.policy.max_retries,
                delay,
            )
            .await?;
        Ok(())
    }

    /// Spawn the outbox relay: periodically re-delivers markers older than
    /// `grace` whose post-commit dispatch evidently never ran.
    pub fn spawn_outbox_relay(
        self: &Arc<Self>,
        interval: Duration,
        grace: Duration,
    ) -> RelayHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let service = self.clone();

        let join = tokio::spawn(async move {
            info!("enrichment outbox relay started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                match service.store.stale_enrichment_markers(grace, 100).await {
                    Ok(markers) => {
                        for marker in markers {
                            debug!(
                                wallet_address = %marker.wallet_address,
                                marker_id = marker.id,
                                "relaying stranded enrichment marker"
                            );
                            if let Err(e) = service.dispatch_marker(&marker).await {
                                warn!(marker_id = marker.id, error = %e, "relay dispatch failed");
                            }
                        }
                    }
                    Err(e) => error!(error = %e, "failed to scan enrichment outbox"),
                }
            }
            debug!("enrichment outbox relay stopped");
        });

        RelayHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}
