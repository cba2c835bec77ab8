//! Router wiring over the in-memory record store, shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response};
use figflag::application::public::PublicSnapshotService;
use figflag::application::snapshot::SnapshotBuilder;
pub use figflag::application::test_support::InMemoryStore;
use figflag::cache::{CacheConfig, FreshnessCache, MemoryCache};
use figflag::config::CorsSettings;
use figflag::infra::http::{HttpState, build_router};
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub cache: Arc<MemoryCache>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(InMemoryStore::seeded())
    }

    pub fn with_store(store: Arc<InMemoryStore>) -> Self {
        let config = CacheConfig::default();
        let cache = Arc::new(MemoryCache::new(&config));
        let freshness: Arc<dyn FreshnessCache> = cache.clone();

        let builder = SnapshotBuilder::new(store.clone(), store.clone(), store.clone());
        let snapshots = Arc::new(PublicSnapshotService::new(
            store.clone(),
            store.clone(),
            builder,
            freshness,
            config,
        ));
        let state = HttpState {
            snapshots,
            health: store.clone(),
        };
        let cors = CorsSettings {
            max_age: Duration::from_secs(86_400),
        };

        Self {
            router: build_router(state, &cors),
            store,
            cache,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
    }

    /// Wait for the background cache write of the previous miss to land.
    pub async fn wait_for_cache_entries(&self, expected: usize) {
        for _ in 0..200 {
            if self.cache.len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("cache never reached {expected} entries");
    }
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    String::from_utf8(bytes.to_vec()).expect("body should be utf8")
}
