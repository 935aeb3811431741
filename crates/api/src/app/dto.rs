use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use playerdex_core::{Profile, Referral};
use playerdex_infra::EnrichedProfile;

const DEFAULT_PAGE_SIZE: u32 = 30;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    pub wallet_address: String,
    pub gamer_tag: String,
    #[serde(default)]
    pub referrer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub gamer_tag: Option<String>,
}

/// Page query parameters, normalized to 1-based pages with a clamped size.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl PageQuery {
    pub fn normalize(self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, page_size)
    }

    pub fn limit_offset(self) -> (i64, i64) {
        let (page, page_size) = self.normalize();
        (page_size as i64, ((page - 1) * page_size) as i64)
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileBody {
    pub wallet_address: String,
    pub ens_name: String,
    pub gamer_tag: String,
    pub created_at: DateTime<Utc>,
}

impl ProfileBody {
    pub fn new(profile: Profile, ens_name: String) -> Self {
        Self {
            wallet_address: profile.wallet_address,
            ens_name,
            gamer_tag: profile.gamer_tag,
            created_at: profile.created_at,
        }
    }
}

impl From<EnrichedProfile> for ProfileBody {
    fn from(enriched: EnrichedProfile) -> Self {
        Self::new(enriched.profile, enriched.ens_name)
    }
}

#[derive(Debug, Serialize)]
pub struct ReferralBody {
    pub referrer: String,
    pub referee: String,
    pub referred_at: DateTime<Utc>,
}

impl From<Referral> for ReferralBody {
    fn from(referral: Referral) -> Self {
        Self {
            referrer: referral.referrer,
            referee: referral.referee,
            referred_at: referral.referred_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateProfileResponse {
    pub profile: ProfileBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral: Option<ReferralBody>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub profile: ProfileBody,
}

#[derive(Debug, Serialize)]
pub struct ListProfilesResponse {
    pub page: u32,
    pub page_size: u32,
    pub total_profiles: i64,
    pub profiles: Vec<ProfileBody>,
}

#[derive(Debug, Serialize)]
pub struct ReferrerResponse {
    pub referral: Option<ReferralBody>,
}

#[derive(Debug, Serialize)]
pub struct ListReferralsResponse {
    pub page: u32,
    pub page_size: u32,
    pub total_referrals: i64,
    pub referrals: Vec<ReferralBody>,
}
