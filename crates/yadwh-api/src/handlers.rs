//! Webhook handlers.
//!
//! The orchestrator run is spawned onto its own task, so a client that
//! disconnects mid-update does not abort a container halfway through its
//! pipeline.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{error, info};

use yadwh_core::ContainerDescriptor;
use yadwh_orchestrator::{AuthError, OrchestratorError};

use crate::{ApiState, SECRET_HEADER};

/// Error body for non-2xx responses.
#[derive(serde::Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: msg.to_string(),
        }),
    )
        .into_response()
}

/// HTTP status for an invocation-level failure.
pub fn status_for(err: &OrchestratorError) -> StatusCode {
    match err {
        OrchestratorError::Auth(AuthError::NotFound) => StatusCode::NOT_FOUND,
        OrchestratorError::Auth(AuthError::Mismatch) => StatusCode::UNAUTHORIZED,
        OrchestratorError::Discovery(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Query parameters accepted on `/{name}`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct SecretQuery {
    pub secret: Option<String>,
}

/// Pick the secret from query, header, then body; first non-empty wins.
pub fn extract_secret(query: &SecretQuery, headers: &HeaderMap, body: &[u8]) -> Option<String> {
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };

    query
        .secret
        .as_deref()
        .and_then(non_empty)
        .or_else(|| {
            headers
                .get(SECRET_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(non_empty)
        })
        .or_else(|| non_empty(&String::from_utf8_lossy(body)))
}

// ── Routes ─────────────────────────────────────────────────────

/// ANY /{name}
pub async fn trigger(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(query): Query<SecretQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match extract_secret(&query, &headers, &body) {
        Some(secret) => run_webhook(state, name, secret).await,
        None => error_response("secret not found", StatusCode::UNAUTHORIZED),
    }
}

/// ANY /{name}/{secret}
pub async fn trigger_with_path_secret(
    State(state): State<ApiState>,
    Path((name, secret)): Path<(String, String)>,
) -> Response {
    run_webhook(state, name, secret).await
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn run_webhook(state: ApiState, name: String, secret: String) -> Response {
    let orchestrator = state.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.process(&name, &secret).await });

    match task.await {
        Ok(Ok(result)) => {
            info!(
                group = %result.group,
                updated = result.succeeded_count(),
                failed = result.failed_count(),
                "webhook processed"
            );
            let updated: Vec<ContainerDescriptor> =
                result.updated().into_iter().cloned().collect();
            (StatusCode::OK, Json(updated)).into_response()
        }
        Ok(Err(e)) => error_response(&e.to_string(), status_for(&e)),
        Err(e) => {
            error!(error = %e, "webhook task failed");
            error_response("webhook task failed", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::sync::Arc;
    use yadwh_core::{CredentialStore, DEFAULT_LABEL_KEY, GroupCredential};
    use yadwh_orchestrator::Orchestrator;
    use yadwh_runtime::{MemoryRuntime, Operation};

    const SECRET: &str = "abcdefghijkl";

    fn test_state(rt: &MemoryRuntime) -> ApiState {
        let store = CredentialStore::from_credentials([GroupCredential::new("BACKEND_PROD", SECRET)]);
        ApiState {
            orchestrator: Orchestrator::new(Arc::new(rt.clone()), Arc::new(store)),
        }
    }

    fn labeled_runtime() -> MemoryRuntime {
        let rt = MemoryRuntime::new();
        rt.publish("nginx:latest", "sha256:n1");
        rt.run("web", "nginx:latest", &[(DEFAULT_LABEL_KEY, "BACKEND_PROD")]);
        rt
    }

    fn query(secret: Option<&str>) -> Query<SecretQuery> {
        Query(SecretQuery {
            secret: secret.map(str::to_string),
        })
    }

    #[test]
    fn secret_prefers_query_then_header_then_body() {
        let mut headers = HeaderMap::new();
        headers.insert(SECRET_HEADER, HeaderValue::from_static("from-header"));

        let q = SecretQuery {
            secret: Some("from-query".to_string()),
        };
        assert_eq!(extract_secret(&q, &headers, b"from-body").as_deref(), Some("from-query"));

        let empty = SecretQuery {
            secret: Some(String::new()),
        };
        assert_eq!(extract_secret(&empty, &headers, b"from-body").as_deref(), Some("from-header"));
        assert_eq!(
            extract_secret(&SecretQuery::default(), &HeaderMap::new(), b" from-body\n").as_deref(),
            Some("from-body")
        );
        assert_eq!(extract_secret(&SecretQuery::default(), &HeaderMap::new(), b""), None);
    }

    #[tokio::test]
    async fn missing_secret_is_unauthorized() {
        let rt = labeled_runtime();
        let resp = trigger(
            State(test_state(&rt)),
            Path("BACKEND_PROD".to_string()),
            query(None),
            HeaderMap::new(),
            Bytes::new(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(rt.calls_of(Operation::List), 0);
    }

    #[tokio::test]
    async fn query_secret_triggers_update() {
        let rt = labeled_runtime();
        let resp = trigger(
            State(test_state(&rt)),
            Path("BACKEND_PROD".to_string()),
            query(Some(SECRET)),
            HeaderMap::new(),
            Bytes::new(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(rt.calls_of(Operation::Start), 1);
    }

    #[tokio::test]
    async fn path_secret_statuses() {
        let rt = labeled_runtime();
        let state = test_state(&rt);

        let ok = trigger_with_path_secret(
            State(state.clone()),
            Path(("BACKEND_PROD".to_string(), SECRET.to_string())),
        )
        .await;
        assert_eq!(ok.status(), StatusCode::OK);

        let wrong = trigger_with_path_secret(
            State(state.clone()),
            Path(("BACKEND_PROD".to_string(), "short".to_string())),
        )
        .await;
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let unknown = trigger_with_path_secret(
            State(state),
            Path(("UNKNOWN_GROUP".to_string(), SECRET.to_string())),
        )
        .await;
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listing_failure_is_internal_error() {
        let rt = labeled_runtime();
        rt.fail_all(Operation::List);
        let resp = trigger_with_path_secret(
            State(test_state(&rt)),
            Path(("BACKEND_PROD".to_string(), SECRET.to_string())),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let resp = healthz().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
