//! HTTP front end for the single-turn AI service.

use axum::{
    Json, Router,
    extract::{ConnectInfo, Request, State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

use crate::clients::LLMError;
use crate::config::Config;
use crate::schemas::{ChatRequest, ChatResponse, ExplainRequest, ExplainResponse, HealthResponse};
use crate::service::{AIService, new_request_id, provider_from_config};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct AppState {
    pub service: AIService,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    InvalidBody(#[from] JsonRejection),
    #[error("Upstream model error: {0}")]
    Upstream(#[from] LLMError),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            ApiError::InvalidBody(rejection) => (rejection.status(), rejection.body_text()),
            ApiError::Upstream(e) => {
                error!(error = %e, "provider call failed");
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ApiError> {
    if value.is_empty() {
        return Err(ApiError::Validation(format!(
            "{}: String should have at least 1 character",
            field
        )));
    }
    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "AI Application Engineer Journey started" }))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    require_non_empty("prompt", &request.prompt)?;
    Ok(Json(state.service.chat(&request.prompt).await?))
}

async fn explain(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExplainRequest>, JsonRejection>,
) -> Result<Json<ExplainResponse>, ApiError> {
    let Json(request) = payload?;
    require_non_empty("topic", &request.topic)?;
    Ok(Json(
        state
            .service
            .explain(&request.topic, request.context.as_deref())
            .await?,
    ))
}

/// Peer address of the connection, when the server was started with connect info.
fn client_addr(request: &Request) -> Option<String> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
}

/// Reuse or mint an `X-Request-ID`, echo it on the response and log one
/// `http.request` event per request.
async fn request_logging(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(new_request_id);

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    let client = client_addr(&request).unwrap_or_else(|| "-".to_string());

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        query = %query,
        client = %client,
        status_code = response.status().as_u16(),
        latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "http.request"
    );

    response
}

pub fn router(state: Arc<AppState>) -> Router {
    let ai = Router::new()
        .route("/chat", post(chat))
        .route("/explain", post(explain));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/ai", ai)
        .with_state(state)
        .layer(middleware::from_fn(request_logging))
}

pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let service = AIService::new(provider_from_config(config));
    info!(provider = service.provider_name(), "AI service ready");

    let app = router(Arc::new(AppState { service }));
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .map_err(|e| anyhow::anyhow!("server error: {}", e))
}
