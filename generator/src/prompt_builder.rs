use crate::input_formatter::{format_cohort_context, format_course_context, format_input};
use crate::models::{CourseContext, DocumentKind, GenerationRequest};
use crate::schema::{render_requirements, DocumentSchema};

/// Builds the instruction document sent to the model on every attempt.
pub struct PromptBuilder {
    schema: &'static DocumentSchema,
}

impl PromptBuilder {
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            schema: DocumentSchema::for_kind(kind),
        }
    }

    /// The full prompt for one attempt. `prior_errors` is `None` or empty on the first attempt.
    pub fn build(&self, request: &GenerationRequest, prior_errors: Option<&[String]>) -> String {
        let root = self.schema.root();
        let mut prompt = format!(
            r#"You are an expert curriculum designer for an intensive, project-based software development programme. Your task is to produce one complete <{root}> specification as a single XML document, built from the input data below.

## INPUT DATA

### Project Briefs
{projects}

### Skills
{skills}

### Research Topics
{research}

### Cohort Context
{cohort}
"#,
            root = root,
            projects = format_input(Some(&request.projects_data)),
            skills = format_input(Some(&request.skills_data)),
            research = format_input(Some(&request.research_data)),
            cohort = format_cohort_context(request.structured_input.as_ref()),
        );

        prompt.push_str(&self.research_instructions(request.enable_research));
        prompt.push_str(&self.thinking_instructions(request.use_extended_thinking));
        prompt.push_str(&self.task_steps(request.enable_research));

        prompt.push_str(&format!(
            r#"
## SCHEMA REQUIREMENTS

The document must follow this structure exactly. "at least N" is a hard minimum; documents with fewer elements are rejected.

{requirements}
## OUTPUT RULES

- Respond with the XML document only, starting with <{root}> and ending with </{root}>.
- Use the exact tag names shown above, including capitalisation.
- Every required field must contain meaningful, non-empty text.
- Do not include XML comments, markdown fences or explanations.
- Escape &, < and > inside text content.
"#,
            requirements = render_requirements(self.schema),
            root = root,
        ));

        if let Some(errors) = prior_errors.filter(|errors| !errors.is_empty()) {
            prompt.push_str(&self.retry_instructions(errors));
        }

        // only modules sit inside a course
        if let (DocumentKind::Module, Some(context)) = (self.schema.kind, &request.course_context) {
            prompt.push_str(&course_integration(context));
        }

        prompt
    }

    fn research_instructions(&self, enabled: bool) -> String {
        if !enabled {
            return String::new();
        }
        r#"
## RESEARCH

You have access to a web search tool. Use it to confirm that technologies, practices and examples are current before including them.
- Only rely on reputable sources: official documentation, standards bodies, established educational publishers and well-known engineering blogs.
- Prefer sources published or updated within the last two years.
- Do not cite or copy content from sources you cannot verify.
"#
        .to_string()
    }

    fn thinking_instructions(&self, enabled: bool) -> String {
        if !enabled {
            return String::new();
        }
        r#"
## PLANNING

Before writing any XML, reason through how the objectives, topics, project briefs and twists connect, and check each minimum in the schema requirements against your plan.
"#
        .to_string()
    }

    fn task_steps(&self, research: bool) -> String {
        let root = self.schema.root();
        let mut steps = vec![
            "Analyse the project briefs, skills and research topics, noting the cohort context.".to_string(),
        ];
        if research {
            steps.push(
                "Research current industry practice for the key topics using the web search tool."
                    .to_string(),
            );
        }
        steps.push(format!(
            "Write the complete <{}> document following the schema requirements.",
            root
        ));
        steps.push(
            "Check every section, field and minimum count against the schema requirements before responding."
                .to_string(),
        );

        let mut out = String::from("\n## YOUR TASK\n\n");
        for (index, step) in steps.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", index + 1, step));
        }
        out
    }

    fn retry_instructions(&self, errors: &[String]) -> String {
        let mut out = String::from(
            "\n## PREVIOUS ATTEMPT FAILED VALIDATION\n\nYour previous response was rejected. The validator reported these errors:\n\n",
        );
        for error in errors {
            out.push_str(&format!("- {}\n", error));
        }
        out.push_str(
            r#"
Fix every error above in this attempt. Pay particular attention to:
1. Cardinality: include at least the minimum number of every repeated element.
2. Completeness: include every required section and fill every required field.
3. Tag names: use the exact tag names from the schema requirements.
4. Tag balance: close every tag you open and keep elements properly nested.
"#,
        );
        out
    }
}

/// Instructions that tie the module into an existing course. Appended after the base prompt.
pub fn course_integration(context: &CourseContext) -> String {
    let narrative = format_course_context(context);
    let preceding: Vec<&str> = context
        .preceding_modules
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .collect();

    if narrative.is_empty() && preceding.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n## COURSE INTEGRATION\n\nThis module is part of a larger course.\n\n");
    for line in &narrative {
        out.push_str(line);
        out.push('\n');
    }

    if preceding.is_empty() {
        out.push_str("\nThis is the first module of the course; do not assume prior modules.\n");
    } else {
        out.push_str("\nModules that come before this one:\n");
        for title in &preceding {
            out.push_str(&format!("- {}\n", title));
        }
        out.push_str(
            "\nDo not repeat content already covered by the preceding modules listed above; build on it instead.\n",
        );
    }

    if !narrative.is_empty() {
        out.push_str("Keep objectives, topics and projects consistent with the narratives above.\n");
    }
    out
}

/// Convenience wrapper for module generation.
pub fn build_prompt(request: &GenerationRequest, prior_errors: Option<&[String]>) -> String {
    PromptBuilder::new(DocumentKind::Module).build(request, prior_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input_formatter::NONE_PROVIDED;
    use crate::models::StructuredInput;
    use serde_json::json;

    fn request(research: bool, thinking: bool) -> GenerationRequest {
        GenerationRequest {
            projects_data: json!({"briefs": ["Weather dashboard", "Chat service"]}),
            skills_data: json!(["HTTP", "Testing"]),
            research_data: json!("<ResearchTopics><Topic>Caching</Topic></ResearchTopics>"),
            structured_input: None,
            course_context: None,
            enable_research: research,
            use_extended_thinking: thinking,
        }
    }

    #[test]
    fn test_inputs_are_embedded() {
        let prompt = build_prompt(&request(false, false), None);

        assert!(prompt.contains("Weather dashboard"));
        assert!(prompt.contains("\"Testing\""));
        assert!(prompt.contains("<ResearchTopics><Topic>Caching</Topic></ResearchTopics>"));
        assert!(prompt.contains(&format!("### Cohort Context\n{}", NONE_PROVIDED)));
    }

    #[test]
    fn test_research_block_only_when_enabled() {
        let without = build_prompt(&request(false, false), None);
        let with = build_prompt(&request(true, false), None);

        assert!(!without.contains("## RESEARCH"));
        assert!(!without.contains("web search"));
        assert!(with.contains("## RESEARCH"));
        assert!(with.contains("2. Research current industry practice"));
    }

    #[test]
    fn test_steps_renumber_without_research() {
        let prompt = build_prompt(&request(false, false), None);
        assert!(prompt.contains("1. Analyse the project briefs"));
        assert!(prompt.contains("2. Write the complete <Module> document"));
        assert!(prompt.contains("3. Check every section"));
        assert!(!prompt.contains("4. "));

        let prompt = build_prompt(&request(true, false), None);
        assert!(prompt.contains("3. Write the complete <Module> document"));
        assert!(prompt.contains("4. Check every section"));
    }

    #[test]
    fn test_retry_block_lists_errors_verbatim() {
        let errors = vec![
            "<ModuleObjectives> must contain at least 3 <ModuleObjective> elements, found 1".to_string(),
            "Missing required <Projects> section".to_string(),
        ];
        let prompt = build_prompt(&request(false, false), Some(errors.as_slice()));

        for error in &errors {
            assert!(prompt.contains(error.as_str()));
        }
        assert!(prompt.contains("Cardinality"));
        assert!(prompt.contains("Completeness"));
        assert!(prompt.contains("Tag names"));
        assert!(prompt.contains("Tag balance"));

        let first = build_prompt(&request(false, false), Some(&[][..]));
        assert!(!first.contains("PREVIOUS ATTEMPT"));
    }

    #[test]
    fn test_schema_block_is_rendered_from_rules() {
        let prompt = build_prompt(&request(false, false), None);
        assert!(prompt.contains(&render_requirements(&crate::schema::MODULE_SCHEMA)));
    }

    #[test]
    fn test_thinking_block() {
        assert!(build_prompt(&request(false, true), None).contains("## PLANNING"));
        assert!(!build_prompt(&request(false, false), None).contains("## PLANNING"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let mut req = request(true, true);
        req.structured_input = Some(StructuredInput {
            cohort_size: Some(20),
            ..Default::default()
        });
        assert_eq!(build_prompt(&req, None), build_prompt(&req, None));
    }

    #[test]
    fn test_course_integration_is_appended() {
        let base = build_prompt(&request(false, false), None);
        let mut req = request(false, false);
        req.course_context = Some(CourseContext {
            title: Some("Full Stack Bootcamp".to_string()),
            course_narrative: Some("From scripts to services.".to_string()),
            preceding_modules: vec!["Programming Basics".to_string(), "Web Fundamentals".to_string()],
            ..Default::default()
        });
        let prompt = build_prompt(&req, None);

        assert!(prompt.starts_with(&base));
        assert!(prompt.contains("Course title: Full Stack Bootcamp"));
        assert!(prompt.contains("- Programming Basics\n- Web Fundamentals"));
        assert!(prompt.contains("Do not repeat content already covered"));
    }

    #[test]
    fn test_course_prompt_ignores_course_context() {
        let mut req = request(false, false);
        req.course_context = Some(CourseContext {
            title: Some("Full Stack Bootcamp".to_string()),
            preceding_modules: vec!["Programming Basics".to_string()],
            ..Default::default()
        });
        let builder = PromptBuilder::new(DocumentKind::Course);
        let prompt = builder.build(&req, None);

        assert!(prompt.contains("one complete <Course> specification"));
        assert!(!prompt.contains("## COURSE INTEGRATION"));
        assert!(!prompt.contains("This module is part of a larger course"));
        assert_eq!(prompt, builder.build(&request(false, false), None));
    }

    #[test]
    fn test_empty_course_context_adds_nothing() {
        let mut req = request(false, false);
        req.course_context = Some(CourseContext::default());
        assert_eq!(build_prompt(&req, None), build_prompt(&request(false, false), None));
    }
}
