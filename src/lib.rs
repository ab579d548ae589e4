pub mod cache;
pub mod config;
pub mod discover;
pub mod mask;
pub mod providers;
pub mod search;
pub mod tts;
pub mod types;
pub mod weather;

use crate::cache::TtlCache;
use crate::config::ConfigStore;
use crate::types::{SearchResult, Weather};

/// Shared per-process state, constructed once in `main` and handed to every
/// request handler behind an `Arc`.
#[derive(Debug)]
pub struct AppState {
    pub config: ConfigStore,
    pub http_client: reqwest::Client,
    // One cache instance per concern, per process
    pub discover_cache: TtlCache<Vec<SearchResult>>,
    pub weather_cache: TtlCache<Weather>,
    // Concurrency control for external calls
    pub outbound_limit: std::sync::Arc<tokio::sync::Semaphore>,
}

pub use types::*;

impl AppState {
    pub fn new(config: ConfigStore, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
            discover_cache: TtlCache::new(
                discover::DISCOVER_CACHE_TTL,
                discover::DISCOVER_CACHE_MAX_SIZE,
            ),
            weather_cache: TtlCache::new(
                weather::WEATHER_CACHE_TTL,
                weather::WEATHER_CACHE_MAX_SIZE,
            ),
            outbound_limit: std::sync::Arc::new(tokio::sync::Semaphore::new(32)),
        }
    }
}
