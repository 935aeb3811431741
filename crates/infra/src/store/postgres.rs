//! Postgres-backed profile store.
//!
//! Uniqueness, referential integrity, and the composite-create transaction
//! boundary are the only synchronization used on the write path: concurrent
//! creates race on the database constraints and the loser gets a classified
//! conflict. Error classification happens here, once, via `classify`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};

use playerdex_core::{Profile, Referral, StoreError, StoreResult};

use super::classify::store_error;
use super::{CreateProfileTxParams, CreateProfileTxResult, EnrichmentMarker, ProfileStore};

#[derive(Debug, Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn create_profile(&self, wallet_address: &str, gamer_tag: &str) -> StoreResult<Profile> {
        let row = sqlx::query(
            r#"
            INSERT INTO profiles (wallet_address, gamer_tag)
            VALUES ($1, $2)
            RETURNING wallet_address, gamer_tag, created_at
            "#,
        )
        .bind(wallet_address)
        .bind(gamer_tag)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("create_profile", e))?;

        profile_from_row(&row)
    }

    async fn get_profile(&self, wallet_address: &str) -> StoreResult<Profile> {
        let row = sqlx::query(
            "SELECT wallet_address, gamer_tag, created_at FROM profiles WHERE wallet_address = $1",
        )
        .bind(wallet_address)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("get_profile", e))?;

        match row {
            Some(row) => profile_from_row(&row),
            None => Err(StoreError::ProfileNotFound),
        }
    }

    async fn update_profile(
        &self,
        wallet_address: &str,
        gamer_tag: Option<&str>,
    ) -> StoreResult<Profile> {
        let row = sqlx::query(
            r#"
            UPDATE profiles
            SET gamer_tag = COALESCE($2, gamer_tag)
            WHERE wallet_address = $1
            RETURNING wallet_address, gamer_tag, created_at
            "#,
        )
        .bind(wallet_address)
        .bind(gamer_tag)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("update_profile", e))?;

        match row {
            Some(row) => profile_from_row(&row),
            None => Err(StoreError::ProfileNotFound),
        }
    }

    async fn delete_profile(&self, wallet_address: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM profiles WHERE wallet_address = $1")
            .bind(wallet_address)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("delete_profile", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProfileNotFound);
        }

        Ok(())
    }

    async fn list_profiles(&self, limit: i64, offset: i64) -> StoreResult<Vec<Profile>> {
        let rows = sqlx::query(
            r#"
            SELECT wallet_address, gamer_tag, created_at
            FROM profiles
            ORDER BY created_at, wallet_address
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("list_profiles", e))?;

        rows.iter().map(profile_from_row).collect()
    }

    async fn count_profiles(&self) -> StoreResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM profiles")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("count_profiles", e))?;

        row.try_get("total")
            .map_err(|e| StoreError::internal(format!("count_profiles: {e}")))
    }

    async fn create_referral(&self, referrer: &str, referee: &str) -> StoreResult<Referral> {
        let row = sqlx::query(
            r#"
            INSERT INTO referrals (referrer, referee)
            VALUES ($1, $2)
            RETURNING id, referrer, referee, referred_at
            "#,
        )
        .bind(referrer)
        .bind(referee)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("create_referral", e))?;

        referral_from_row(&row)
    }

    async fn get_referrer(&self, wallet_address: &str) -> StoreResult<Option<Referral>> {
        let row = sqlx::query(
            "SELECT id, referrer, referee, referred_at FROM referrals WHERE referee = $1",
        )
        .bind(wallet_address)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("get_referrer", e))?;

        row.as_ref().map(referral_from_row).transpose()
    }

    async fn list_referrals(
        &self,
        referrer: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Referral>> {
        let rows = sqlx::query(
            r#"
            SELECT id, referrer, referee, referred_at
            FROM referrals
            WHERE referrer = $1
            ORDER BY referred_at, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(referrer)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("list_referrals", e))?;

        rows.iter().map(referral_from_row).collect()
    }

    async fn count_referrals(&self, referrer: &str) -> StoreResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM referrals WHERE referrer = $1")
            .bind(referrer)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("count_referrals", e))?;

        row.try_get("total")
            .map_err(|e| StoreError::internal(format!("count_referrals: {e}")))
    }

    async fn create_profile_tx(
        &self,
        params: CreateProfileTxParams,
    ) -> StoreResult<CreateProfileTxResult> {
        // Cheap precondition, checked before touching the database.
        if let Some(referrer) = &params.referrer {
            if referrer == &params.wallet_address {
                return Err(StoreError::SelfReferral);
            }
        }

        // Any early return below drops the transaction, which rolls it back.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin", e))?;

        let profile =
            insert_profile_tx(&mut tx, &params.wallet_address, &params.gamer_tag).await?;

        let referral = match &params.referrer {
            Some(referrer) => {
                if !profile_exists_tx(&mut tx, referrer).await? {
                    return Err(StoreError::ReferrerNotFound);
                }
                Some(insert_referral_tx(&mut tx, referrer, &params.wallet_address).await?)
            }
            None => None,
        };

        let pending = insert_enrichment_marker_tx(&mut tx, &params.wallet_address).await?;

        tx.commit().await.map_err(|e| store_error("commit", e))?;

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

        let rows = sqlx::query(
            r#"
            SELECT id, wallet_address, created_at
            FROM enrichment_outbox
            WHERE created_at < $1
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("stale_enrichment_markers", e))?;

        rows.iter().map(marker_from_row).collect()
    }

    async fn clear_enrichment_marker(&self, id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM enrichment_outbox WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("clear_enrichment_marker", e))?;

        Ok(())
    }
}

async fn insert_profile_tx(
    tx: &mut Transaction<'_, Postgres>,
    wallet_address: &str,
    gamer_tag: &str,
) -> StoreResult<Profile> {
    let row = sqlx::query(
        r#"
        INSERT INTO profiles (wallet_address, gamer_tag)
        VALUES ($1, $2)
        RETURNING wallet_address, gamer_tag, created_at
        "#,
    )
    .bind(wallet_address)
    .bind(gamer_tag)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| store_error("create_profile", e))?;

    profile_from_row(&row)
}

async fn profile_exists_tx(
    tx: &mut Transaction<'_, Postgres>,
    wallet_address: &str,
) -> StoreResult<bool> {
    let row = sqlx::query("SELECT 1 AS present FROM profiles WHERE wallet_address = $1")
        .bind(wallet_address)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| store_error("lookup_referrer", e))?;

    Ok(row.is_some())
}

async fn insert_referral_tx(
    tx: &mut Transaction<'_, Postgres>,
    referrer: &str,
    referee: &str,
) -> StoreResult<Referral> {
    let row = sqlx::query(
        r#"
        INSERT INTO referrals (referrer, referee)
        VALUES ($1, $2)
        RETURNING id, referrer, referee, referred_at
        "#,
    )
    .bind(referrer)
    .bind(referee)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| store_error("create_referral", e))?;

    referral_from_row(&row)
}

async fn insert_enrichment_marker_tx(
    tx: &mut Transaction<'_, Postgres>,
    wallet_address: &str,
) -> StoreResult<EnrichmentMarker> {
    let row = sqlx::query(
        r#"
        INSERT INTO enrichment_outbox (wallet_address)
        VALUES ($1)
        RETURNING id, wallet_address, created_at
        "#,
    )
    .bind(wallet_address)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| store_error("record_enrichment_marker", e))?;

    marker_from_row(&row)
}

fn profile_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<Profile> {
    let read = |e: sqlx::Error| StoreError::internal(format!("bad profile row: {e}"));

    Ok(Profile {
        wallet_address: row.try_get("wallet_address").map_err(read)?,
        gamer_tag: row.try_get("gamer_tag").map_err(read)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(read)?,
    })
}

fn referral_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<Referral> {
    let read = |e: sqlx::Error| StoreError::internal(format!("bad referral row: {e}"));

    Ok(Referral {
        id: row.try_get("id").map_err(read)?,
        referrer: row.try_get("referrer").map_err(read)?,
        referee: row.try_get("referee").map_err(read)?,
        referred_at: row
            .try_get::<DateTime<Utc>, _>("referred_at")
            .map_err(read)?,
    })
}

fn marker_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<EnrichmentMarker> {
    let read = |e: sqlx::Error| StoreError::internal(format!("bad outbox row: {e}"));

    Ok(EnrichmentMarker {
        id: row.try_get("id").map_err(read)?,
        wallet_address: row.try_get("wallet_address").map_err(read)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(read)?,
    })
}
