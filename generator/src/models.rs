use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One generation run's inputs. Immutable for the whole retry loop.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub projects_data: Value,
    pub skills_data: Value,
    pub research_data: Value,
    pub structured_input: Option<StructuredInput>,
    pub course_context: Option<CourseContext>,
    pub enable_research: bool,
    pub use_extended_thinking: bool,
}

/// Cohort metadata entered alongside the uploaded files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StructuredInput {
    pub duration_weeks: Option<u32>,
    pub cohort_size: Option<u32>,
    pub experience_level: Option<String>,
    pub technologies: Vec<String>,
    pub additional_notes: Option<String>,
    pub features: BTreeMap<String, bool>,
}

/// Where the module sits inside a larger course.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseContext {
    pub title: Option<String>,
    pub course_narrative: Option<String>,
    pub progression_narrative: Option<String>,
    pub arc_narrative: Option<String>,
    pub arc_progression: Option<String>,
    pub preceding_modules: Vec<String>,
}

/// Root element expected in a generated or uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Module,
    Course,
}

impl DocumentKind {
    pub fn root_tag(&self) -> &'static str {
        match self {
            DocumentKind::Module => "Module",
            DocumentKind::Course => "Course",
        }
    }
}

/// Per-iteration state of the retry loop.
#[derive(Debug, Clone, Default)]
pub struct GenerationAttempt {
    pub attempt_number: u32,
    pub prior_errors: Vec<String>,
    pub raw_output: String,
    pub extracted_xml: Option<String>,
}

impl GenerationAttempt {
    pub fn new(attempt_number: u32, prior_errors: Vec<String>) -> Self {
        Self {
            attempt_number,
            prior_errors,
            ..Default::default()
        }
    }
}

/// Outcome of schema validation. `valid` is derived from `errors` and cannot be set directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::new(vec![error.into()], Vec::new())
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<String>) {
        (self.errors, self.warnings)
    }
}

/// What a finished run hands back, whether it succeeded or ran out of attempts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalResult {
    pub success: bool,
    pub content: String,
    pub xml_content: Option<String>,
    pub validation_errors: Vec<String>,
    pub validation_warnings: Vec<String>,
    pub attempts: u32,
    /// Set when the last attempt failed before validation could run.
    #[serde(skip)]
    pub extraction_failed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_follows_errors() {
        let ok = ValidationResult::new(Vec::new(), vec!["Missing recommended <Metadata> section".to_string()]);
        assert!(ok.is_valid());
        assert_eq!(ok.warnings().len(), 1);

        let bad = ValidationResult::failed("Missing required <Projects> section");
        assert!(!bad.is_valid());
        assert_eq!(bad.errors(), ["Missing required <Projects> section".to_string()]);
    }

    #[test]
    fn test_structured_input_accepts_partial_json() {
        let input: StructuredInput = serde_json::from_value(serde_json::json!({
            "cohortSize": 24,
            "technologies": ["Rust", "PostgreSQL"]
        }))
        .unwrap();

        assert_eq!(input.cohort_size, Some(24));
        assert_eq!(input.technologies.len(), 2);
        assert!(input.experience_level.is_none());
        assert!(input.features.is_empty());
    }

    #[test]
    fn test_terminal_result_wire_names() {
        let result = TerminalResult {
            success: false,
            content: "raw".to_string(),
            xml_content: None,
            validation_errors: vec!["e".to_string()],
            validation_warnings: Vec::new(),
            attempts: 3,
            extraction_failed: true,
        };
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["xmlContent"], Value::Null);
        assert_eq!(value["validationErrors"][0], "e");
        assert_eq!(value["attempts"], 3);
        assert!(value.get("extractionFailed").is_none());
    }
}
