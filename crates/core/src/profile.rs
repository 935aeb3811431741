use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user identity profile, keyed by wallet address.
///
/// `wallet_address` is immutable and case-preserved; only `gamer_tag` may
/// change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub wallet_address: String,
    pub gamer_tag: String,
    pub created_at: DateTime<Utc>,
}

/// A one-time referral link recorded as a side effect of profile creation.
///
/// A user may be referred at most once, ever; referrals are never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    pub id: i64,
    /// Wallet address of the sponsoring, pre-existing profile.
    pub referrer: String,
    /// Wallet address of the newly created profile.
    pub referee: String,
    pub referred_at: DateTime<Utc>,
}
