use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    application::{
        error::HttpError,
        public::{PublicSnapshotOutcome, PublicSnapshotService},
        repos::HealthRepo,
    },
    config::CorsSettings,
};

use super::{
    db_health_response,
    middleware::{SnapshotLog, log_responses, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub snapshots: Arc<PublicSnapshotService>,
    pub health: Arc<dyn HealthRepo>,
}

pub fn build_router(state: HttpState, cors: &CorsSettings) -> Router {
    Router::new()
        .route("/public/{project_slug}/{environment}", get(public_snapshot))
        .route("/_health/db", get(db_health))
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
        .layer(build_cors_layer(cors))
}

fn build_cors_layer(cors: &CorsSettings) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, IF_NONE_MATCH])
        .expose_headers([ETAG, CACHE_CONTROL])
        .max_age(cors.max_age)
}

async fn public_snapshot(
    State(state): State<HttpState>,
    Path((project_slug, environment)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let if_none_match = headers
        .get(IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok());

    match state
        .snapshots
        .resolve(&project_slug, &environment, if_none_match)
        .await
    {
        Ok(outcome) => {
            let log = SnapshotLog::served(&project_slug, &environment, &outcome);
            let cache_control = state.snapshots.config().cache_control();
            let mut response = snapshot_response(outcome, &cache_control);
            response.extensions_mut().insert(log);
            response
        }
        Err(err) => {
            let mut response = HttpError::from(err).into_response();
            response
                .extensions_mut()
                .insert(SnapshotLog::failed(&project_slug, &environment));
            response
        }
    }
}

fn snapshot_response(outcome: PublicSnapshotOutcome, cache_control: &str) -> Response {
    let etag = outcome.etag().as_str().to_string();
    let mut response = match outcome {
        PublicSnapshotOutcome::Body { body, .. } => {
            let mut response = (StatusCode::OK, body).into_response();
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
        PublicSnapshotOutcome::NotModified { .. } => StatusCode::NOT_MODIFIED.into_response(),
    };

    let headers = response.headers_mut();
    insert_header(headers, ETAG, &etag);
    insert_header(headers, CACHE_CONTROL, cache_control);
    response
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

async fn db_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.ping().await)
}

async fn not_found() -> Response {
    HttpError::new(
        "infra::http::fallback",
        StatusCode::NOT_FOUND,
        "not_found",
        "no route matches the request",
    )
    .into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;
    use crate::application::public::SnapshotSource;
    use crate::application::snapshot::SnapshotBuilder;
    use crate::application::test_support::InMemoryStore;
    use crate::cache::{CacheConfig, ETag, MemoryCache};

    fn state(store: &Arc<InMemoryStore>) -> HttpState {
        let config = CacheConfig::default();
        let builder = SnapshotBuilder::new(store.clone(), store.clone(), store.clone());
        let snapshots = Arc::new(PublicSnapshotService::new(
            store.clone(),
            store.clone(),
            builder,
            Arc::new(MemoryCache::new(&config)),
            config,
        ));
        HttpState {
            snapshots,
            health: store.clone(),
        }
    }

    async fn request(state: HttpState, project: &str, environment: &str) -> Response {
        public_snapshot(
            State(state),
            Path((project.to_string(), environment.to_string())),
            HeaderMap::new(),
        )
        .await
    }

    #[tokio::test]
    async fn snapshot_handler_records_cache_decision() {
        let store = InMemoryStore::seeded();

        let response = request(state(&store), "acme", "prod").await;
        assert_eq!(response.status(), StatusCode::OK);
        let log = response
            .extensions()
            .get::<SnapshotLog>()
            .expect("snapshot log");
        assert_eq!(log.project, "acme");
        assert_eq!(log.environment, "prod");
        assert_eq!(log.source, Some(SnapshotSource::Store));
        assert_eq!(log.outcome, "miss");

        let response = request(state(&store), "acme", "staging").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let log = response
            .extensions()
            .get::<SnapshotLog>()
            .expect("snapshot log");
        assert_eq!(log.environment, "staging");
        assert_eq!(log.outcome, "error");
    }

    #[tokio::test]
    async fn body_outcome_carries_validators_and_json_type() {
        let body = r#"{"project":"acme"}"#.to_string();
        let etag = ETag::compute(body.as_bytes());
        let response = snapshot_response(
            PublicSnapshotOutcome::Body {
                body: body.clone(),
                etag: etag.clone(),
                source: SnapshotSource::Store,
            },
            "public, max-age=5, stale-while-revalidate=60",
        );

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ETAG], etag.as_str());
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            response.headers()[CACHE_CONTROL],
            "public, max-age=5, stale-while-revalidate=60"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        assert_eq!(bytes.as_ref(), body.as_bytes());
    }

    #[tokio::test]
    async fn not_modified_outcome_has_empty_body() {
        let etag = ETag::compute(b"{}");
        let response = snapshot_response(
            PublicSnapshotOutcome::NotModified {
                etag: etag.clone(),
                source: SnapshotSource::Cache,
            },
            "public, max-age=5, stale-while-revalidate=60",
        );

        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers()[ETAG], etag.as_str());
        assert!(response.headers().contains_key(CACHE_CONTROL));
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        assert!(bytes.is_empty());
    }
}
