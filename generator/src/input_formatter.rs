use crate::models::{CourseContext, StructuredInput};
use serde_json::Value;

pub const NONE_PROVIDED: &str = "None provided";

/// Render an input payload for embedding in a prompt.
///
/// Strings (typically uploaded file contents) are embedded verbatim, everything
/// else as pretty-printed JSON in insertion order. Absent and `null` payloads
/// render as [`NONE_PROVIDED`] so the model can tell "no data" from "empty data".
pub fn format_input(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => NONE_PROVIDED.to_string(),
        Some(Value::String(text)) => text.trim().to_string(),
        Some(other) => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

pub fn format_cohort_context(input: Option<&StructuredInput>) -> String {
    let Some(input) = input else {
        return NONE_PROVIDED.to_string();
    };

    let mut lines = Vec::new();
    if let Some(weeks) = input.duration_weeks {
        lines.push(format!("- Duration: {} weeks", weeks));
    }
    if let Some(size) = input.cohort_size {
        lines.push(format!("- Cohort size: {} learners", size));
    }
    if let Some(level) = non_empty(&input.experience_level) {
        lines.push(format!("- Experience level: {}", level));
    }
    if !input.technologies.is_empty() {
        lines.push(format!("- Requested technologies: {}", input.technologies.join(", ")));
    }
    for (feature, enabled) in &input.features {
        lines.push(format!(
            "- {}: {}",
            feature,
            if *enabled { "enabled" } else { "disabled" }
        ));
    }
    if let Some(notes) = non_empty(&input.additional_notes) {
        lines.push(format!("- Additional notes: {}", notes));
    }

    if lines.is_empty() {
        NONE_PROVIDED.to_string()
    } else {
        lines.join("\n")
    }
}

/// Labelled narrative lines for the course integration section. Empty fields are skipped.
pub fn format_course_context(context: &CourseContext) -> Vec<String> {
    let mut lines = Vec::new();
    let labelled = [
        ("Course title", &context.title),
        ("Course narrative", &context.course_narrative),
        ("Progression narrative", &context.progression_narrative),
        ("Arc narrative", &context.arc_narrative),
        ("Arc progression", &context.arc_progression),
    ];
    for (label, value) in labelled {
        if let Some(text) = non_empty(value) {
            lines.push(format!("{}: {}", label, text));
        }
    }
    lines
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
