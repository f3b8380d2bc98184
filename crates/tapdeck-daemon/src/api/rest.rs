//! REST API over the façade
//!
//! Every response is a JSON object carrying `success` and `message`, plus
//! the payload fields of the endpoint. Paths outside the API fall back to
//! the static web UI when one is configured.

use std::path::Path;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tapdeck_common::{RegistryError, TapdeckError};
use thiserror::Error;
use tokio::task::JoinError;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::warn;

use super::service::TapdeckService;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub uid: String,
    #[serde(alias = "action_class")]
    pub action_kind: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub parameter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnregisterRequest {
    pub uid: String,
}

/// Error rendered as a `success: false` envelope
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] TapdeckError),

    #[error("Malformed request: {0}")]
    BadRequest(String),

    #[error("Request aborted: {0}")]
    Aborted(#[from] JoinError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Domain(TapdeckError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Domain(TapdeckError::Registry(RegistryError::NotFound(_))) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Domain(_) | ApiError::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            warn!(%status, %message, "Request failed");
        }
        (status, envelope(false, message, json!({}))).into_response()
    }
}

/// `{success, message}` merged with the fields of `payload`
fn envelope(success: bool, message: impl Into<String>, payload: Value) -> Json<Value> {
    let mut body = json!({
        "success": success,
        "message": message.into(),
    });
    if let (Some(body), Value::Object(fields)) = (body.as_object_mut(), payload) {
        body.extend(fields);
    }
    Json(body)
}

/// Build the API router, serving `static_dir` for every other path
pub fn router(service: TapdeckService, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/latest", get(latest))
        .route("/registry", get(registry))
        .route("/register", post(register))
        .route("/unregister", post(unregister))
        .route("/actions", get(actions));
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(service)
}

async fn health(State(service): State<TapdeckService>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": tapdeck_common::VERSION,
        "bindings": service.binding_count(),
        "dispatch": service.stats(),
    }))
}

async fn latest(State(service): State<TapdeckService>) -> Json<Value> {
    match service.get_latest() {
        Some(latest) => envelope(true, "Latest scanned tag", json!({ "latest": latest })),
        None => envelope(true, "No tag scanned yet", json!({ "latest": null })),
    }
}

async fn registry(State(service): State<TapdeckService>) -> Json<Value> {
    let bindings = service.list_bindings();
    envelope(
        true,
        format!("{} tag(s) registered", bindings.len()),
        json!({ "bindings": bindings }),
    )
}

async fn register(
    State(service): State<TapdeckService>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    // Registry writes fsync the snapshot
    let binding = tokio::task::spawn_blocking(move || {
        service.register(
            &req.action_kind,
            &req.uid,
            req.alias.as_deref(),
            req.parameter.as_deref(),
        )
    })
    .await??;
    Ok(envelope(
        true,
        format!("Registered tag {}", binding.uid),
        json!({ "binding": binding }),
    ))
}

async fn unregister(
    State(service): State<TapdeckService>,
    body: Result<Json<UnregisterRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    let removed = tokio::task::spawn_blocking(move || service.unregister(&req.uid)).await??;
    Ok(envelope(
        true,
        format!("Unregistered tag {}", removed.uid),
        json!({ "binding": removed }),
    ))
}

async fn actions(State(service): State<TapdeckService>) -> Json<Value> {
    envelope(
        true,
        "Available actions",
        json!({ "actions": service.list_action_kinds() }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::latest::LatestCell;
    use crate::infra::registry::{MemorySnapshot, Registry};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> (Router, MemorySnapshot) {
        let snapshot = MemorySnapshot::new();
        let registry = Arc::new(Registry::open(snapshot.clone()).unwrap());
        let service = TapdeckService::new(registry, Arc::new(LatestCell::new()));
        (router(service, None), snapshot)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["bindings"], 0);
    }

    #[tokio::test]
    async fn test_register_then_list() {
        let (app, snapshot) = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/register",
            Some(json!({
                "uid": "04a1b2",
                "action_kind": "ReplaceTracklist",
                "alias": "Bedtime",
                "parameter": "local:track:foo",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["binding"]["uid"], "04A1B2");
        assert_eq!(body["binding"]["action_kind"], "ReplaceTracklist");
        assert_eq!(body["binding"]["parameter"], "local:track:foo");
        assert_eq!(snapshot.records().unwrap().len(), 1);

        let (status, body) = send(&app, Method::GET, "/registry", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bindings"].as_array().unwrap().len(), 1);
        assert_eq!(body["bindings"][0]["alias"], "Bedtime");
    }

    #[tokio::test]
    async fn test_validation_error_is_bad_request() {
        let (app, _) = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/register",
            Some(json!({"uid": "01", "action_kind": "SetVolume", "parameter": "101"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("SetVolume"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::POST, "/register", Some(json!({"uid": "01"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_unregister_unknown_is_not_found() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::POST, "/unregister", Some(json!({"uid": "FF"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_server_error() {
        let (app, snapshot) = app();
        snapshot.set_fail_writes(true);
        let (status, body) = send(
            &app,
            Method::POST,
            "/register",
            Some(json!({"uid": "01", "action_kind": "Stop"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);

        let (_, body) = send(&app, Method::GET, "/registry", None).await;
        assert!(body["bindings"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_before_first_scan() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::GET, "/latest", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["latest"].is_null());
        assert_eq!(body["message"], "No tag scanned yet");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_registrations_all_persist() {
        let (app, snapshot) = app();
        let requests: Vec<_> = (0..16u8)
            .map(|i| {
                let app = app.clone();
                tokio::spawn(async move {
                    send(
                        &app,
                        Method::POST,
                        "/register",
                        Some(json!({"uid": format!("{i:02X}"), "action_kind": "NextTrack"})),
                    )
                    .await
                })
            })
            .collect();

        for request in requests {
            let (status, _) = request.await.unwrap();
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(snapshot.records().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_static_ui_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Tapdeck</h1>").unwrap();
        let registry = Arc::new(Registry::open(MemorySnapshot::new()).unwrap());
        let app = router(
            TapdeckService::new(registry, Arc::new(LatestCell::new())),
            Some(dir.path()),
        );

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"<h1>Tapdeck</h1>");

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/missing.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // API routes win over files
        let (status, body) = send(&app, Method::GET, "/registry", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_no_static_dir_means_not_found() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_actions_listing() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::GET, "/actions", None).await;
        assert_eq!(status, StatusCode::OK);
        let actions = body["actions"].as_object().unwrap();
        assert_eq!(actions.len(), 8);
        assert!(actions.contains_key("ToggleShuffle"));
    }
}
