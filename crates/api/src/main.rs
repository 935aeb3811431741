use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use playerdex_api::app::services::AppServices;
use playerdex_api::auth::{AccessVerifier, AllowAllVerifier};
use playerdex_api::config::AppConfig;
use playerdex_infra::cache::{Cache, RedisCache};
use playerdex_infra::enrichment::{CacheEnsNameHandler, HttpNameResolver, TASK_CACHE_ENS_NAME};
use playerdex_infra::jobs::{
    PgTaskStore, ProcessorConfig, TaskDistributor, TaskProcessor, TaskStore,
};
use playerdex_infra::store::{PgProfileStore, ProfileStore};
use playerdex_infra::{EnrichmentPolicy, ProfileService};

#[tokio::main]
async fn main() {
    playerdex_observability::init();

    let config = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to postgres");

    let cache: Arc<dyn Cache> =
        Arc::new(RedisCache::new(&config.redis_url).expect("failed to open redis cache"));
    let task_store: Arc<dyn TaskStore> = Arc::new(PgTaskStore::new(pool.clone()));
    let profile_store: Arc<dyn ProfileStore> = Arc::new(PgProfileStore::new(pool));

    let profiles = Arc::new(ProfileService::new(
        profile_store,
        cache.clone(),
        TaskDistributor::new(task_store.clone()),
        EnrichmentPolicy::default(),
    ));

    let resolver = HttpNameResolver::new(&config.resolver_url, Duration::from_secs(10))
        .expect("failed to build name resolver");
    let mut processor = TaskProcessor::new(
        task_store,
        ProcessorConfig {
            workers: config.worker_count,
            ..ProcessorConfig::default()
        },
    );
    processor.register_handler(
        TASK_CACHE_ENS_NAME,
        Arc::new(CacheEnsNameHandler::new(Arc::new(resolver), cache)),
    );
    let _processor = processor.start();
    let _relay = profiles.spawn_outbox_relay(Duration::from_secs(30), Duration::from_secs(30));

    let verifier: Arc<dyn AccessVerifier> = Arc::new(AllowAllVerifier::new());
    let services = Arc::new(AppServices { profiles, verifier });

    let app = playerdex_api::app::build_app(services, &config);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind listen address");

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
