use crate::generate_payload::{GeneratePayload, ValidatePayload};
use crate::generate_response::{ApiError, GenerateResponse, HealthResponse, ResponseMetadata};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::ACCEPT, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use curriculum_generator::{
    check_upload, AnthropicService, GenerationSettings, Generator, GeneratorConfig,
    InvocationMode, SchemaValidator, ValidationResult,
};
use futures::StreamExt;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    /// `None` when no model credential is configured.
    pub generator: Option<Arc<Generator>>,
    pub model: String,
}

impl AppState {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        let generator = match AnthropicService::new(config) {
            Ok(service) => Some(Arc::new(Generator::new(
                Arc::new(service),
                GenerationSettings::from(config),
            ))),
            Err(e) => {
                log::warn!("Model client unavailable: {}", e);
                None
            }
        };
        Self {
            generator,
            model: config.model.clone(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/validate", post(validate))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<GeneratePayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    // credentials are checked before the body is looked at
    let generator = state.generator.clone().ok_or_else(|| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "configuration",
            "ANTHROPIC_API_KEY environment variable not set",
        )
    })?;

    let Json(payload) = payload.map_err(|rejection| {
        ApiError::new(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text())
    })?;
    let request = payload.into_request()?;

    if wants_event_stream(&headers) {
        log::info!("Starting streaming generation");
        let run = generator.spawn(request, InvocationMode::Streaming);
        let events = run
            .into_event_stream()
            .map(|event| Event::default().json_data(&event));
        return Ok(Sse::new(events)
            .keep_alive(KeepAlive::default())
            .into_response());
    }

    log::info!("Starting blocking generation");
    let metadata = ResponseMetadata {
        model_used: generator.model_name().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        enable_research: request.enable_research,
        use_extended_thinking: request.use_extended_thinking,
    };
    let result = generator
        .spawn(request, InvocationMode::Blocking)
        .finish()
        .await?;

    Ok(Json(GenerateResponse::from_result(result, metadata)).into_response())
}

pub async fn validate(Json(body): Json<ValidatePayload>) -> Result<Json<ValidationResult>, ApiError> {
    if let Some(filename) = &body.filename {
        check_upload(filename, body.mime_type.as_deref(), &body.xml, body.document_type)
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, "invalid_upload", e.to_string()))?;
    }

    let result = SchemaValidator::new(body.document_type).validate(&body.xml);
    log::debug!(
        "Validated {:?} document: {} error(s), {} warning(s)",
        body.document_type,
        result.errors().len(),
        result.warnings().len()
    );
    Ok(Json(result))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.model.clone(),
        credentials_configured: state.generator.is_some(),
    })
}
