use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{application::public::PublicSnapshotError, infra::error::InfraError};

/// Error chain attached to a response so the logging middleware can report
/// what the client never sees.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Client-facing failure rendered as `{"error": "<code>"}`.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    code: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        code: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code,
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        code: &'static str,
        error: &dyn StdError,
    ) -> Self {
        Self {
            status,
            code,
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(json!({ "error": self.code }))).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<PublicSnapshotError> for HttpError {
    fn from(error: PublicSnapshotError) -> Self {
        const SOURCE: &str = "infra::http::public_snapshot_error";
        match error {
            PublicSnapshotError::ProjectNotFound => HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "project_not_found",
                "no project matches the requested slug",
            ),
            PublicSnapshotError::EnvironmentNotFound => HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "environment_not_found",
                "no environment of the project matches the requested slug",
            ),
            err @ (PublicSnapshotError::Repo(_) | PublicSnapshotError::Encode(_)) => {
                HttpError::from_error(
                    SOURCE,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    &err,
                )
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;
    use crate::application::repos::RepoError;

    async fn body_of(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    #[tokio::test]
    async fn not_found_errors_use_distinct_codes() {
        let response = HttpError::from(PublicSnapshotError::ProjectNotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await, r#"{"error":"project_not_found"}"#);

        let response = HttpError::from(PublicSnapshotError::EnvironmentNotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_of(response).await,
            r#"{"error":"environment_not_found"}"#
        );
    }

    #[tokio::test]
    async fn store_failures_hide_detail_but_keep_report() {
        let error = HttpError::from(PublicSnapshotError::Repo(RepoError::Persistence(
            "connection reset by peer".into(),
        )));
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .cloned()
            .expect("report attached");
        assert!(report.messages[0].contains("connection reset by peer"));
        assert_eq!(body_of(response).await, r#"{"error":"internal_error"}"#);
    }

    #[test]
    fn report_walks_the_source_chain() {
        let error = InfraError::from(std::io::Error::other("disk gone"));
        let report =
            ErrorReport::from_error("test", StatusCode::INTERNAL_SERVER_ERROR, &error);
        assert_eq!(report.messages[0], "io error: disk gone");
    }
}
