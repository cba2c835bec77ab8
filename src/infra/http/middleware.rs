use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::{
    error::ErrorReport,
    public::{PublicSnapshotOutcome, SnapshotSource},
};

const RESPONSE_TARGET: &str = "figflag::http::response";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Which snapshot a request asked for and how it was answered.
///
/// The snapshot handler attaches this to its response; [`log_responses`]
/// takes it back out so the cache decision lands in the access log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotLog {
    pub project: String,
    pub environment: String,
    pub source: Option<SnapshotSource>,
    /// `hit`, `miss`, `not_modified`, or `error` when no snapshot was produced.
    pub outcome: &'static str,
}

impl SnapshotLog {
    pub fn served(project: &str, environment: &str, outcome: &PublicSnapshotOutcome) -> Self {
        Self {
            project: project.to_string(),
            environment: environment.to_string(),
            source: Some(outcome.source()),
            outcome: outcome.cache_outcome(),
        }
    }

    pub fn failed(project: &str, environment: &str) -> Self {
        Self {
            project: project.to_string(),
            environment: environment.to_string(),
            source: None,
            outcome: "error",
        }
    }

    fn source_str(&self) -> Option<&'static str> {
        self.source.map(SnapshotSource::as_str)
    }
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Log snapshot reads at `debug`, 4xx at `warn` and 5xx at `error`.
///
/// Failures carry the handler's `ErrorReport`; snapshot routes add the
/// project, environment and cache decision from [`SnapshotLog`].
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();
    let snapshot = response.extensions_mut().remove::<SnapshotLog>();
    let project = snapshot.as_ref().map(|log| log.project.as_str());
    let environment = snapshot.as_ref().map(|log| log.environment.as_str());
    let cache_outcome = snapshot.as_ref().map(|log| log.outcome);

    if !status.is_client_error() && !status.is_server_error() {
        if let Some(log) = snapshot.as_ref() {
            debug!(
                target: RESPONSE_TARGET,
                status = status.as_u16(),
                path = %path,
                elapsed_ms,
                project = log.project.as_str(),
                environment = log.environment.as_str(),
                source = log.source_str(),
                outcome = log.outcome,
                request_id = request_id.as_str(),
                "snapshot served",
            );
        }
        return response;
    }

    let (source, messages) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = messages
        .first()
        .map(String::as_str)
        .unwrap_or("no diagnostic available");

    if status.is_server_error() {
        error!(
            target: RESPONSE_TARGET,
            status = status.as_u16(),
            method = %method,
            path = %path,
            elapsed_ms,
            project,
            environment,
            outcome = cache_outcome,
            source,
            detail,
            chain = ?messages,
            request_id = request_id.as_str(),
            "request failed",
        );
    } else {
        warn!(
            target: RESPONSE_TARGET,
            status = status.as_u16(),
            method = %method,
            path = %path,
            elapsed_ms,
            project,
            environment,
            outcome = cache_outcome,
            source,
            detail,
            chain = ?messages,
            request_id = request_id.as_str(),
            "client request error",
        );
    }

    response
}
