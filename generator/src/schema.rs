//! Declarative description of the generated XML documents.
//!
//! The prompt's schema-requirements block is rendered from these tables and the
//! validator walks the same tables, so a minimum stated to the model is always
//! the minimum enforced on its output.

use crate::models::DocumentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Absence or incompleteness is an error.
    Required,
    /// Absence is a warning; contents are checked as warnings when present.
    Recommended,
    /// Silently skipped when absent; contents are checked as warnings when present.
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurs {
    Once,
    AtLeast(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct ElementRule {
    pub name: &'static str,
    pub presence: Presence,
    pub occurs: Occurs,
    /// Direct children that must carry non-blank text.
    pub fields: &'static [&'static str],
    /// The element's own text must be non-blank.
    pub requires_text: bool,
    pub children: &'static [ElementRule],
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentSchema {
    pub kind: DocumentKind,
    pub sections: &'static [ElementRule],
}

impl DocumentSchema {
    pub fn for_kind(kind: DocumentKind) -> &'static DocumentSchema {
        match kind {
            DocumentKind::Module => &MODULE_SCHEMA,
            DocumentKind::Course => &COURSE_SCHEMA,
        }
    }

    pub fn root(&self) -> &'static str {
        self.kind.root_tag()
    }
}

macro_rules! section {
    ($name:expr, $presence:expr, $fields:expr, $children:expr $(,)?) => {
        ElementRule {
            name: $name,
            presence: $presence,
            occurs: Occurs::Once,
            fields: $fields,
            requires_text: false,
            children: $children,
        }
    };
}

macro_rules! repeated {
    ($name:expr, $min:expr, $fields:expr, $children:expr $(,)?) => {
        ElementRule {
            name: $name,
            presence: Presence::Required,
            occurs: Occurs::AtLeast($min),
            fields: $fields,
            requires_text: false,
            children: $children,
        }
    };
}

macro_rules! text_section {
    ($name:expr, $presence:expr $(,)?) => {
        ElementRule {
            name: $name,
            presence: $presence,
            occurs: Occurs::Once,
            fields: &[],
            requires_text: true,
            children: &[],
        }
    };
}

const METADATA: ElementRule = section!(
    "Metadata",
    Presence::Recommended,
    &[],
    &[
        section!(
            "GenerationInfo",
            Presence::Recommended,
            &["Timestamp", "Source", "Model"],
            &[],
        ),
        section!(
            "Changes",
            Presence::Optional,
            &[],
            &[repeated!(
                "Change",
                0,
                &["Type", "Target", "Description", "Rationale"],
                &[],
            )],
        ),
    ],
);

pub const MIN_OBJECTIVES: usize = 3;
pub const MIN_PRIMARY_TOPICS: usize = 5;
pub const MIN_PROJECT_BRIEFS: usize = 2;
pub const MIN_BRIEF_SKILLS: usize = 3;
pub const MIN_BRIEF_EXAMPLES: usize = 3;
pub const MIN_TWISTS: usize = 2;
pub const MIN_TWIST_EXAMPLES: usize = 2;
pub const MIN_SKILL_CATEGORIES: usize = 1;
pub const MIN_CATEGORY_SKILLS: usize = 1;

pub const MODULE_SCHEMA: DocumentSchema = DocumentSchema {
    kind: DocumentKind::Module,
    sections: &[
        METADATA,
        section!(
            "ModuleOverview",
            Presence::Required,
            &["ModuleDescription"],
            &[section!(
                "ModuleObjectives",
                Presence::Required,
                &[],
                &[repeated!("ModuleObjective", MIN_OBJECTIVES, &["Name", "Details"], &[])],
            )],
        ),
        section!(
            "ResearchTopics",
            Presence::Required,
            &[],
            &[
                section!(
                    "PrimaryTopics",
                    Presence::Required,
                    &[],
                    &[repeated!(
                        "PrimaryTopic",
                        MIN_PRIMARY_TOPICS,
                        &["TopicName", "TopicDescription"],
                        &[],
                    )],
                ),
                section!(
                    "StretchTopics",
                    Presence::Optional,
                    &[],
                    &[repeated!("StretchTopic", 0, &[], &[])],
                ),
            ],
        ),
        section!(
            "Projects",
            Presence::Required,
            &[],
            &[
                section!(
                    "ProjectBriefs",
                    Presence::Required,
                    &[],
                    &[repeated!(
                        "ProjectBrief",
                        MIN_PROJECT_BRIEFS,
                        &[],
                        &[
                            section!("Overview", Presence::Required, &["Name", "Task", "Focus"], &[]),
                            text_section!("Criteria", Presence::Recommended),
                            section!(
                                "Skills",
                                Presence::Required,
                                &[],
                                &[repeated!("Skill", MIN_BRIEF_SKILLS, &["Name", "Details"], &[])],
                            ),
                            section!(
                                "Examples",
                                Presence::Required,
                                &[],
                                &[repeated!(
                                    "Example",
                                    MIN_BRIEF_EXAMPLES,
                                    &["Name", "Description"],
                                    &[],
                                )],
                            ),
                        ],
                    )],
                ),
                section!(
                    "Twists",
                    Presence::Required,
                    &[],
                    &[repeated!(
                        "Twist",
                        MIN_TWISTS,
                        &["Name", "Task"],
                        &[section!(
                            "ExampleUses",
                            Presence::Required,
                            &[],
                            &[repeated!(
                                "Example",
                                MIN_TWIST_EXAMPLES,
                                &["Name", "Description"],
                                &[],
                            )],
                        )],
                    )],
                ),
            ],
        ),
        section!(
            "AdditionalSkills",
            Presence::Required,
            &[],
            &[repeated!(
                "SkillsCategory",
                MIN_SKILL_CATEGORIES,
                &["Name"],
                &[repeated!("Skill", MIN_CATEGORY_SKILLS, &["Name", "Details"], &[])],
            )],
        ),
    ],
};

pub const COURSE_SCHEMA: DocumentSchema = DocumentSchema {
    kind: DocumentKind::Course,
    sections: &[
        METADATA,
        section!(
            "CourseProperties",
            Presence::Required,
            &["CourseName", "CourseAims"],
            &[],
        ),
        section!(
            "CohortProperties",
            Presence::Required,
            &["CohortSize", "ExperienceLevel"],
            &[],
        ),
        text_section!("CourseDescription", Presence::Required),
        section!(
            "CourseNarratives",
            Presence::Recommended,
            &["CourseNarrative", "ProgressionNarrative"],
            &[],
        ),
        section!(
            "CourseContent",
            Presence::Required,
            &[],
            &[section!(
                "Arcs",
                Presence::Required,
                &[],
                &[repeated!(
                    "Arc",
                    1,
                    &["ArcName", "ArcDescription"],
                    &[section!(
                        "Modules",
                        Presence::Required,
                        &[],
                        &[repeated!("Module", 1, &["ModuleName"], &[])],
                    )],
                )],
            )],
        ),
    ],
};

/// Render the schema as an indented outline for the prompt.
pub fn render_requirements(schema: &DocumentSchema) -> String {
    let mut out = format!("<{}>  (root element, exactly one)\n", schema.root());
    render_rules(schema.sections, 1, &mut out);
    out
}

fn render_rules(rules: &[ElementRule], depth: usize, out: &mut String) {
    for rule in rules {
        let indent = "  ".repeat(depth);
        let occurrence = match (rule.occurs, rule.presence) {
            (Occurs::AtLeast(0), _) => "zero or more".to_string(),
            (Occurs::AtLeast(min), _) => format!("at least {}", min),
            (Occurs::Once, Presence::Required) => "required".to_string(),
            (Occurs::Once, Presence::Recommended) => "recommended".to_string(),
            (Occurs::Once, Presence::Optional) => "optional".to_string(),
        };
        out.push_str(&format!("{}<{}>  ({})", indent, rule.name, occurrence));
        if rule.requires_text {
            out.push_str(" with non-empty text");
        }
        if !rule.fields.is_empty() {
            let fields: Vec<String> = rule.fields.iter().map(|f| format!("<{}>", f)).collect();
            let each = if matches!(rule.occurs, Occurs::AtLeast(_)) { "each " } else { "" };
            out.push_str(&format!(" {}containing non-empty {}", each, fields.join(", ")));
        }
        out.push('\n');
        render_rules(rule.children, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_minimums(rules: &[ElementRule], acc: &mut Vec<(&'static str, usize)>) {
        for rule in rules {
            if let Occurs::AtLeast(min) = rule.occurs {
                acc.push((rule.name, min));
            }
            collect_minimums(rule.children, acc);
        }
    }

    #[test]
    fn test_rendered_block_states_every_minimum() {
        let rendered = render_requirements(&MODULE_SCHEMA);
        let mut minimums = Vec::new();
        collect_minimums(MODULE_SCHEMA.sections, &mut minimums);

        assert!(minimums.len() >= 9);
        for (name, min) in minimums.into_iter().filter(|(_, m)| *m > 0) {
            let line = format!("<{}>  (at least {})", name, min);
            assert!(rendered.contains(&line), "missing `{}` in:\n{}", line, rendered);
        }
    }

    #[test]
    fn test_module_minimums() {
        let rendered = render_requirements(&MODULE_SCHEMA);
        assert!(rendered.starts_with("<Module>"));
        assert!(rendered.contains(
            "<ModuleObjective>  (at least 3) each containing non-empty <Name>, <Details>"
        ));
        assert!(rendered.contains("<PrimaryTopic>  (at least 5)"));
        assert!(rendered.contains("<Overview>  (required) containing non-empty <Name>, <Task>, <Focus>"));
        assert!(rendered.contains("<Metadata>  (recommended)"));
    }

    #[test]
    fn test_course_schema_root() {
        let schema = DocumentSchema::for_kind(DocumentKind::Course);
        assert_eq!(schema.root(), "Course");
        let rendered = render_requirements(schema);
        assert!(rendered.contains("<CourseDescription>  (required) with non-empty text"));
        assert!(rendered.contains("<Arc>  (at least 1)"));
    }
}
