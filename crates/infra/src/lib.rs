//! Infrastructure layer: Postgres storage, Redis cache, the durable task
//! queue, and the ENS enrichment pipeline.

pub mod cache;
pub mod enrichment;
pub mod jobs;
pub mod service;
pub mod store;

pub use service::{EnrichedProfile, EnrichmentPolicy, ProfileService, RelayHandle};
