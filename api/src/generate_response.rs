use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use curriculum_generator::{GenerationError, TerminalResult};
use serde::Serialize;

/// Body of a blocking `POST /generate` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub message: String,
    pub content: String,
    pub xml_content: Option<String>,
    #[serde(rename = "hasValidXML")]
    pub has_valid_xml: bool,
    pub validation_errors: Vec<String>,
    pub validation_warnings: Vec<String>,
    pub attempts: u32,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub model_used: String,
    pub timestamp: String,
    pub enable_research: bool,
    pub use_extended_thinking: bool,
}

impl GenerateResponse {
    pub fn from_result(result: TerminalResult, metadata: ResponseMetadata) -> Self {
        let message = if result.success {
            format!("Module generated successfully in {} attempt(s)", result.attempts)
        } else if result.extraction_failed {
            format!(
                "No complete XML document was produced after {} attempt(s)",
                result.attempts
            )
        } else {
            format!(
                "Generated XML failed validation after {} attempt(s)",
                result.attempts
            )
        };

        Self {
            success: result.success,
            message,
            content: result.content,
            has_valid_xml: result.success,
            xml_content: result.xml_content,
            validation_errors: result.validation_errors,
            validation_warnings: result.validation_warnings,
            attempts: result.attempts,
            metadata,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub credentials_configured: bool,
}

/// JSON error body, `{ "error": kind, "message": text }`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            error: error.to_string(),
            message: message.into(),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        let status = match &err {
            GenerationError::Configuration(_) | GenerationError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GenerationError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            GenerationError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GenerationError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GenerationError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (GenerationError::Configuration("no key".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                GenerationError::InvalidRequest { field: "skillsData".into() },
                StatusCode::BAD_REQUEST,
            ),
            (
                GenerationError::Timeout { after: Duration::from_secs(120) },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (GenerationError::Network("reset".into()), StatusCode::BAD_GATEWAY),
            (
                GenerationError::Provider { status: 500, message: "boom".into() },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_response_shape() {
        let result = TerminalResult {
            success: false,
            content: "raw".into(),
            xml_content: Some("<Module/>".into()),
            validation_errors: vec!["Missing required <Projects> section".into()],
            validation_warnings: Vec::new(),
            attempts: 3,
            extraction_failed: false,
        };
        let body = GenerateResponse::from_result(
            result,
            ResponseMetadata {
                model_used: "m".into(),
                timestamp: "2026-01-01T00:00:00Z".into(),
                enable_research: false,
                use_extended_thinking: true,
            },
        );
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["hasValidXML"], false);
        assert_eq!(value["xmlContent"], "<Module/>");
        assert_eq!(value["attempts"], 3);
        assert_eq!(value["metadata"]["useExtendedThinking"], true);
        assert!(value["message"].as_str().unwrap().contains("failed validation"));
    }
}
