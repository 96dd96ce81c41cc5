use axum::{
    http::{HeaderValue, Method},
    routing::{get, patch, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::auth::JwtVerifier;
use crate::config::{AppConfig, Environment};
use crate::database::SessionStore;
use crate::handlers::{self, sessions};
use crate::observer::InvalidationPipeline;
use crate::services::SessionLedger;

/// Shared per-process state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<SessionLedger>,
    pub store: Arc<dyn SessionStore>,
    pub verifier: Arc<JwtVerifier>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SessionStore>,
        observers: InvalidationPipeline,
        verifier: JwtVerifier,
    ) -> Self {
        let ledger = SessionLedger::new(store.clone(), Arc::new(observers));
        Self {
            ledger: Arc::new(ledger),
            store,
            verifier: Arc::new(verifier),
        }
    }
}

pub fn app(state: AppState, config: &AppConfig) -> Router {
    let mut router = Router::new()
        // Public
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        // Bearer-token scoped
        .merge(session_routes())
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.api.max_request_size_bytes));

    if let Some(cors) = cors_layer(config) {
        router = router.layer(cors);
    }
    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", get(sessions::list).post(sessions::create))
        .route(
            "/api/sessions/:id",
            patch(sessions::update).delete(sessions::delete),
        )
        .route("/api/sessions/:id/status", put(sessions::update_status))
        .route("/api/patients/:id/sessions", get(sessions::list_for_patient))
        .route(
            "/api/patients/:id/sessions/open",
            get(sessions::list_open_for_patient),
        )
}

fn cors_layer(config: &AppConfig) -> Option<CorsLayer> {
    if config.environment == Environment::Development {
        return Some(CorsLayer::permissive());
    }
    if !config.security.enable_cors {
        return None;
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{generate_jwt, Claims};
    use crate::observer::View;
    use crate::testing::{MemoryStore, RecordingObserver};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "router-test-secret";

    struct Harness {
        router: Router,
        store: Arc<MemoryStore>,
        recorder: RecordingObserver,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let recorder = RecordingObserver::new();
        let mut observers = InvalidationPipeline::new();
        observers.register_observer(Box::new(recorder.clone()));

        let state = AppState::new(
            store.clone(),
            observers,
            JwtVerifier::new(SECRET, "authenticated"),
        );
        let router = app(state, &AppConfig::development());
        Harness { router, store, recorder }
    }

    fn token(user: Uuid) -> String {
        generate_jwt(&Claims::new(user, None, "authenticated", 1), SECRET).unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn request(method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("authorization", format!("Bearer {}", token(user)));
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn health_reports_store_state() {
        let h = harness();

        let (status, body) = send(&h.router, request("GET", "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "connected");
        assert!(body["timestamp"].is_string());

        h.store.set_failing(true);
        let (status, body) = send(&h.router, request("GET", "/health", None, None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert_eq!(body["database"], "disconnected");
        assert_eq!(body["message"], "Database connection failed");
        assert!(!body.to_string().contains("simulated outage"));
    }

    #[tokio::test]
    async fn create_then_list() {
        let h = harness();
        let user = Uuid::new_v4();
        let patient = h.store.add_patient(user, "Ana");

        let (status, body) = send(
            &h.router,
            request(
                "POST",
                "/api/sessions",
                Some(user),
                Some(json!({ "pacienteId": patient.id, "data": "2024-03-15", "valorPraticado": 150 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["situacao"], "ABERTO");
        assert_eq!(body["data"]["tipo"], "CONSULTA");
        assert_eq!(body["data"]["valorPraticado"], 150.0);
        assert_eq!(body["data"]["dataPagamento"], Value::Null);

        let (status, body) = send(&h.router, request("GET", "/api/sessions", Some(user), None)).await;
        assert_eq!(status, StatusCode::OK);
        let items = body["data"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["pacienteNome"], "Ana");
        assert_eq!(items[0]["pacienteId"], patient.id);
    }

    #[tokio::test]
    async fn anonymous_list_is_empty_but_mutations_are_401() {
        let h = harness();

        let (status, body) = send(&h.router, request("GET", "/api/sessions", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));

        let (status, body) = send(
            &h.router,
            request("PUT", "/api/sessions/1/status", None, Some(json!({ "situacao": "PAGO" }))),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Not authenticated");
    }

    #[tokio::test]
    async fn foreign_session_is_forbidden() {
        let h = harness();
        let owner = Uuid::new_v4();
        let patient = h.store.add_patient(owner, "Ana");
        let (_, created) = send(
            &h.router,
            request(
                "POST",
                "/api/sessions",
                Some(owner),
                Some(json!({ "pacienteId": patient.id, "data": "2024-03-15", "valorPraticado": 100 })),
            ),
        )
        .await;
        let id = created["data"]["id"].as_i64().unwrap();

        let (status, body) = send(
            &h.router,
            request("DELETE", &format!("/api/sessions/{}", id), Some(Uuid::new_v4()), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Unauthorized");
        assert!(h.store.session(id as i32).is_some());
    }

    #[tokio::test]
    async fn foreign_patient_is_not_found() {
        let h = harness();
        let patient = h.store.add_patient(Uuid::new_v4(), "Ana");

        let (status, body) = send(
            &h.router,
            request(
                "POST",
                "/api/sessions",
                Some(Uuid::new_v4()),
                Some(json!({ "pacienteId": patient.id, "data": "2024-03-15", "valorPraticado": 100 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Patient not found");
    }

    #[tokio::test]
    async fn status_update_accepts_english_alias_and_invalidates_payments() {
        let h = harness();
        let user = Uuid::new_v4();
        let patient = h.store.add_patient(user, "Ana");
        let (_, created) = send(
            &h.router,
            request(
                "POST",
                "/api/sessions",
                Some(user),
                Some(json!({ "pacienteId": patient.id, "data": "2024-03-15", "valorPraticado": 100 })),
            ),
        )
        .await;
        let id = created["data"]["id"].as_i64().unwrap() as i32;
        h.recorder.clear();

        let (status, _) = send(
            &h.router,
            request(
                "PUT",
                &format!("/api/sessions/{}/status", id),
                Some(user),
                Some(json!({ "situacao": "PAID" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(h.store.session(id).unwrap().data_pagamento.is_some());
        assert_eq!(h.recorder.views(), vec![View::SessionList, View::Payments]);

        let (_, open) = send(
            &h.router,
            request("GET", &format!("/api/patients/{}/sessions/open", patient.id), Some(user), None),
        )
        .await;
        assert_eq!(open["data"], json!([]));
    }

    #[tokio::test]
    async fn patch_changes_only_given_fields() {
        let h = harness();
        let user = Uuid::new_v4();
        let patient = h.store.add_patient(user, "Ana");
        let (_, created) = send(
            &h.router,
            request(
                "POST",
                "/api/sessions",
                Some(user),
                Some(json!({
                    "pacienteId": patient.id,
                    "data": "2024-03-15",
                    "valorPraticado": 100,
                    "observacoes": "inicial"
                })),
            ),
        )
        .await;
        let id = created["data"]["id"].as_i64().unwrap();

        let (status, body) = send(
            &h.router,
            request(
                "PATCH",
                &format!("/api/sessions/{}", id),
                Some(user),
                Some(json!({ "valorPraticado": 99.9 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["valorPraticado"], 99.9);
        assert_eq!(body["data"]["observacoes"], "inicial");
    }

    #[tokio::test]
    async fn malformed_requests_are_400() {
        let h = harness();
        let user = Uuid::new_v4();
        let patient = h.store.add_patient(user, "Ana");

        let (status, body) = send(
            &h.router,
            request(
                "POST",
                "/api/sessions",
                Some(user),
                Some(json!({ "pacienteId": patient.id, "data": "ontem", "valorPraticado": 100 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");

        let (status, body) = send(
            &h.router,
            request("POST", "/api/sessions", Some(user), Some(json!({ "pacienteId": "x" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_JSON");

        let (status, _) = send(&h.router, request("DELETE", "/api/sessions/abc", Some(user), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
