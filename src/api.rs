use std::path::PathBuf;

use axum::{
    body::Bytes,
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::spawn;
use tracing::{error, info, warn};

use crate::{
    app_state::{AppState, Status},
    assistant::ChatReply,
    error::AssistantError,
    ingest::{self, FaqSource},
    models::{ProductAnswer, ProductFilter},
};

/// Mensaje que ve el usuario cuando la base de conocimiento no responde.
const DEGRADED_ANSWER: &str =
    "The FAQ knowledge base is unavailable right now. Product search still works; please try again later.";

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct QuestionPayload {
    question: String,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct IngestPayload {
    #[serde(default)]
    csv_path: Option<String>,
}

#[derive(Serialize)]
pub struct FaqResponse {
    answer: String,
}

#[derive(Serialize)]
pub struct ProductResponse {
    filter: ProductFilter,
    result: ProductAnswer,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/faq", post(faq_handler))
        .route("/api/products", post(products_handler))
        .route("/api/ingest", post(ingest_handler))
        .route("/api/status", get(status_handler))
        .route("/api/health", get(health_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

/// Traduce errores de resolver a una respuesta degradada, sin tumbar el proceso.
fn resolver_error(err: AssistantError) -> ApiError {
    match err {
        AssistantError::EmptyKnowledgeBase { .. } | AssistantError::StoreUnavailable(_) => {
            warn!("Store no disponible al resolver la consulta: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": err.to_string(),
                    "answer": DEGRADED_ANSWER,
                    "needs_ingestion": err.needs_ingestion(),
                })),
            )
        }
        other => {
            error!("Error al resolver la consulta: {other}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Error al procesar la consulta: {other}")})),
            )
        }
    }
}

// --- Handlers ---

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<QuestionPayload>,
) -> Result<Json<ChatReply>, ApiError> {
    state
        .assistant
        .answer(&payload.question)
        .await
        .map(Json)
        .map_err(resolver_error)
}

#[axum::debug_handler]
async fn faq_handler(
    State(state): State<AppState>,
    Json(payload): Json<QuestionPayload>,
) -> Result<Json<FaqResponse>, ApiError> {
    let answer = state
        .assistant
        .faq()
        .resolve_faq(&payload.question)
        .await
        .map_err(resolver_error)?;
    Ok(Json(FaqResponse { answer }))
}

#[axum::debug_handler]
async fn products_handler(
    State(state): State<AppState>,
    Json(payload): Json<QuestionPayload>,
) -> Result<Json<ProductResponse>, ApiError> {
    let resolver = state.assistant.products();
    let filter = resolver.parse(&payload.question);
    let result = resolver.resolve_filter(&filter).map_err(resolver_error)?;
    Ok(Json(ProductResponse { filter, result }))
}

/// Reconstrucción administrativa de la base de conocimiento, en segundo plano.
#[axum::debug_handler]
async fn ingest_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // Cuerpo vacío = valores por defecto; un cuerpo inválido no dispara la ingesta.
    let payload: IngestPayload = if body.iter().all(u8::is_ascii_whitespace) {
        IngestPayload::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            warn!("Petición de ingesta rechazada: {e}");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"error": format!("Cuerpo de ingesta inválido: {e}")})),
            )
        })?
    };
    let csv = payload
        .csv_path
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| state.config.faq_csv.clone());
    let source = FaqSource::from_option(csv.as_deref());

    {
        let mut status = state.status.lock().unwrap_or_else(|p| p.into_inner());
        if status.is_busy {
            return Err((
                StatusCode::CONFLICT,
                Json(json!({"error": "Ya hay una ingesta en curso."})),
            ));
        }
        status.is_busy = true;
        status.message = format!("Iniciando ingesta desde {source}...");
        status.progress = 0.0;
    }

    spawn(async move {
        let result = ingest::ingest_faq(&state.knowledge, &source, state.status.clone()).await;

        let mut status = state.status.lock().unwrap_or_else(|p| p.into_inner());
        status.is_busy = false;
        status.progress = 0.0;
        match result {
            Ok(summary) => {
                info!("Ingesta completada. {summary}");
                status.message = format!("¡Ingesta completada! {summary}");
            }
            Err(err) => {
                error!("Error de ingesta: {err}");
                status.message = format!("Error en la ingesta: {err}");
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status.lock().unwrap_or_else(|p| p.into_inner()).clone())
}

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let catalog = state.catalog.count();
    let knowledge = state.knowledge.count();

    let healthy = matches!((&catalog, &knowledge), (Ok(_), Ok(n)) if *n > 0);
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let overall = if healthy { "ok" } else { "degraded" };
    let describe = |r: &Result<usize, AssistantError>| match r {
        Ok(n) => json!({"status": "ok", "count": n}),
        Err(e) => json!({"status": "error", "error": e.to_string()}),
    };

    (
        code,
        Json(json!({
            "status": overall,
            "catalog": describe(&catalog),
            "knowledge": describe(&knowledge),
            "collection": state.knowledge.collection(),
            "embedding_model": state.knowledge.embeddings().model_id(),
        })),
    )
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .take()
    {
        let _ = sender.send(());
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogStore;
    use crate::config::AppConfig;
    use crate::embeddings::EmbeddingManager;
    use crate::vector_store::KnowledgeStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state(dir: &std::path::Path) -> AppState {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        let catalog = CatalogStore::in_memory().unwrap();
        catalog.seed_if_empty().unwrap();
        let knowledge = KnowledgeStore::open(dir, "faqs", EmbeddingManager::local(384));
        AppState::new(config, Arc::new(catalog), Arc::new(knowledge), None)
    }

    async fn call(app: Router, method: &str, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn wait_for_ingestion(state: &AppState) {
        for _ in 0..200 {
            if !state.status.lock().unwrap().is_busy {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("la ingesta no terminó");
    }

    #[tokio::test]
    async fn chat_routes_products() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(state(dir.path()));
        let (status, body) = call(app, "POST", "/api/chat", json!({"question": "top 2 nike"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["intent"], "product");
        assert_eq!(body["products"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn faq_without_index_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(state(dir.path()));
        let (status, body) = call(app, "POST", "/api/chat", json!({"question": "refund policy"})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["answer"], DEGRADED_ANSWER);
        assert_eq!(body["needs_ingestion"], true);
    }

    #[tokio::test]
    async fn ingest_then_answer_faq() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let app = create_router(state.clone());

        let (status, _) = call(app.clone(), "POST", "/api/ingest", json!({})).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        wait_for_ingestion(&state).await;
        assert!(state.status.lock().unwrap().message.starts_with("¡Ingesta completada!"));

        let (status, body) = call(app.clone(), "POST", "/api/faq", json!({"question": "how do I cancel an order"})).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["answer"].as_str().unwrap().contains("cancel"));

        let (status, body) = call(app, "GET", "/api/health", serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn malformed_ingest_body_leaves_collection_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let app = create_router(state.clone());

        for body in [json!({"csv_path": 42}), json!({"csv": "faq.csv"}), json!([1, 2])] {
            let (status, response) = call(app.clone(), "POST", "/api/ingest", body).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert!(response["error"].as_str().unwrap().starts_with("Cuerpo de ingesta inválido"));
        }

        assert!(!state.status.lock().unwrap().is_busy);
        assert_eq!(state.knowledge.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_ingest_body_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let request = Request::builder()
            .method("POST")
            .uri("/api/ingest")
            .body(Body::empty())
            .unwrap();
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        wait_for_ingestion(&state).await;
        assert!(state.knowledge.count().unwrap() > 0);
    }

    #[tokio::test]
    async fn concurrent_ingest_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        state.status.lock().unwrap().is_busy = true;
        let (status, _) = call(create_router(state), "POST", "/api/ingest", json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn products_endpoint_exposes_filter() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(state(dir.path()));
        let (status, body) = call(app, "POST", "/api/products", json!({"question": "xyz-nonexistent-brand rating 5"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filter"]["min_rating"], 5.0);
        assert_eq!(body["result"]["kind"], "results");

        let dir = tempfile::tempdir().unwrap();
        let app = create_router(state(dir.path()));
        let (_, body) = call(app, "POST", "/api/products", json!({"question": "puma under 10"})).await;
        assert_eq!(body["result"]["kind"], "empty");
    }
}
