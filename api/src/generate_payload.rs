use curriculum_generator::{
    CourseContext, DocumentKind, GenerationError, GenerationRequest, StructuredInput,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePayload {
    pub projects_data: Option<Value>,
    pub skills_data: Option<Value>,
    pub research_data: Option<Value>,
    pub structured_input: Option<StructuredInput>,
    pub course_context: Option<CourseContext>,
    #[serde(default)]
    pub enable_research: bool,
    #[serde(default)]
    pub use_extended_thinking: bool,
}

impl GeneratePayload {
    pub fn into_request(self) -> Result<GenerationRequest, GenerationError> {
        Ok(GenerationRequest {
            projects_data: required("projectsData", self.projects_data)?,
            skills_data: required("skillsData", self.skills_data)?,
            research_data: required("researchData", self.research_data)?,
            structured_input: self.structured_input,
            course_context: self.course_context,
            enable_research: self.enable_research,
            use_extended_thinking: self.use_extended_thinking,
        })
    }
}

// null and blank strings count as missing
fn required(field: &str, value: Option<Value>) -> Result<Value, GenerationError> {
    match value {
        None | Some(Value::Null) => Err(GenerationError::InvalidRequest {
            field: field.to_string(),
        }),
        Some(Value::String(s)) if s.trim().is_empty() => Err(GenerationError::InvalidRequest {
            field: field.to_string(),
        }),
        Some(value) => Ok(value),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePayload {
    pub xml: String,
    #[serde(default = "default_document_type")]
    pub document_type: DocumentKind,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
}

fn default_document_type() -> DocumentKind {
    DocumentKind::Module
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(body: Value) -> GeneratePayload {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_complete_payload() {
        let request = payload(json!({
            "projectsData": {"briefs": []},
            "skillsData": "HTTP, SQL",
            "researchData": ["caching"],
            "structuredInput": {"cohortSize": 18, "technologies": ["Rust"]},
            "enableResearch": true
        }))
        .into_request()
        .unwrap();

        assert!(request.enable_research);
        assert!(!request.use_extended_thinking);
        assert_eq!(request.structured_input.unwrap().cohort_size, Some(18));
    }

    #[test]
    fn test_missing_fields_are_named() {
        let err = payload(json!({"projectsData": {}, "researchData": "x"}))
            .into_request()
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidRequest { ref field } if field == "skillsData"));

        let err = payload(json!({"projectsData": null, "skillsData": "x", "researchData": "x"}))
            .into_request()
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidRequest { ref field } if field == "projectsData"));

        let err = payload(json!({"projectsData": {}, "skillsData": "x", "researchData": "  "}))
            .into_request()
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidRequest { ref field } if field == "researchData"));
    }

    #[test]
    fn test_validate_payload_defaults_to_module() {
        let body: ValidatePayload = serde_json::from_value(json!({"xml": "<Module/>"})).unwrap();
        assert_eq!(body.document_type, DocumentKind::Module);

        let body: ValidatePayload =
            serde_json::from_value(json!({"xml": "<Course/>", "documentType": "course"})).unwrap();
        assert_eq!(body.document_type, DocumentKind::Course);
    }
}
