use std::sync::Arc;

use playerdex_infra::ProfileService;

use crate::auth::AccessVerifier;

/// Shared handles injected into every request handler.
pub struct AppServices {
    pub profiles: Arc<ProfileService>,
    pub verifier: Arc<dyn AccessVerifier>,
}
