use crate::models::{DocumentKind, ValidationResult};
use crate::schema::{DocumentSchema, ElementRule, Occurs, Presence};
use crate::xml_tree::XmlElement;

/// Validates generated documents against a [`DocumentSchema`].
///
/// Malformed XML and a wrong root element stop validation immediately; every
/// other check runs to completion so one pass reports all problems. A missing
/// container is reported once and its descendants are not examined.
pub struct SchemaValidator {
    schema: &'static DocumentSchema,
}

#[derive(Default)]
struct Report {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Report {
    fn push(&mut self, strict: bool, message: String) {
        if strict {
            self.errors.push(message);
        } else {
            self.warnings.push(message);
        }
    }
}

impl SchemaValidator {
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            schema: DocumentSchema::for_kind(kind),
        }
    }

    pub fn validate(&self, xml: &str) -> ValidationResult {
        let root = match XmlElement::parse(xml) {
            Ok(root) => root,
            Err(err) => return ValidationResult::failed(err.to_string()),
        };

        let expected = self.schema.root();
        if root.name != expected {
            return ValidationResult::failed(format!(
                "Root element must be <{}>, found <{}>",
                expected, root.name
            ));
        }

        let mut report = Report::default();
        let root_label = format!("<{}>", expected);
        check_rules(&root, &root_label, self.schema.sections, None, true, true, &mut report);

        if self.schema.kind == DocumentKind::Course {
            check_schedule(&root, &mut report);
        }

        ValidationResult::new(report.errors, report.warnings)
    }
}

pub fn validate_module(xml: &str) -> ValidationResult {
    SchemaValidator::new(DocumentKind::Module).validate(xml)
}

pub fn validate_course(xml: &str) -> ValidationResult {
    SchemaValidator::new(DocumentKind::Course).validate(xml)
}

/// `scope` is the label of the nearest numbered ancestor, e.g. `<ProjectBrief> 2`.
fn check_rules(
    parent: &XmlElement,
    parent_label: &str,
    rules: &[ElementRule],
    scope: Option<&str>,
    strict: bool,
    top_level: bool,
    report: &mut Report,
) {
    for rule in rules {
        let rule_strict = strict && rule.presence == Presence::Required;

        match rule.occurs {
            Occurs::Once => match parent.child(rule.name) {
                Some(element) => {
                    let element_label = label(rule.name, None, scope);
                    check_element(element, rule, &element_label, scope, rule_strict, report);
                }
                None => report_missing(parent_label, rule, top_level, strict, report),
            },
            Occurs::AtLeast(min) => {
                let items = parent.children_named(rule.name);

                if items.len() < min {
                    report.push(
                        rule_strict,
                        format!(
                            "{} must contain at least {} <{}> element{}, found {}",
                            parent_label,
                            min,
                            rule.name,
                            if min == 1 { "" } else { "s" },
                            items.len()
                        ),
                    );
                }

                if let Some(declared) = parent.attr("count") {
                    if declared.trim().parse::<usize>().ok() != Some(items.len()) {
                        report.warnings.push(format!(
                            "{} declares count=\"{}\" but contains {} <{}> element{}",
                            parent_label,
                            declared,
                            items.len(),
                            rule.name,
                            if items.len() == 1 { "" } else { "s" }
                        ));
                    }
                }

                for (index, item) in items.iter().enumerate() {
                    let item_label = label(rule.name, Some(index + 1), scope);
                    check_element(item, rule, &item_label, Some(&item_label), rule_strict, report);
                }
            }
        }
    }
}

fn check_element(
    element: &XmlElement,
    rule: &ElementRule,
    element_label: &str,
    child_scope: Option<&str>,
    strict: bool,
    report: &mut Report,
) {
    if rule.requires_text && element.text().is_empty() {
        report.push(strict, format!("{} must not be empty", element_label));
    }

    for field in rule.fields {
        match element.child_text(field) {
            None => report.push(
                strict,
                format!("{} is missing required <{}>", element_label, field),
            ),
            Some("") => report.push(strict, format!("{} has empty <{}>", element_label, field)),
            Some(_) => {}
        }
    }

    check_rules(element, element_label, rule.children, child_scope, strict, false, report);
}

fn report_missing(
    parent_label: &str,
    rule: &ElementRule,
    top_level: bool,
    strict: bool,
    report: &mut Report,
) {
    let (level, is_error) = match rule.presence {
        Presence::Required => ("required", strict),
        Presence::Recommended => ("recommended", false),
        Presence::Optional => return,
    };

    let message = if top_level {
        format!("Missing {} <{}> section", level, rule.name)
    } else {
        format!("{} is missing {} <{}>", parent_label, level, rule.name)
    };
    report.push(is_error, message);
}

fn label(name: &str, index: Option<usize>, scope: Option<&str>) -> String {
    let base = match index {
        Some(i) => format!("<{}> {}", name, i),
        None => format!("<{}>", name),
    };
    match scope {
        Some(scope) => format!("{} in {}", base, scope),
        None => base,
    }
}

/// Order and week-allocation checks for `CourseContent > Arcs > Arc > Modules > Module`.
fn check_schedule(root: &XmlElement, report: &mut Report) {
    let Some(content) = root.child("CourseContent") else {
        return;
    };
    let Some(arcs) = content.child("Arcs") else {
        return;
    };

    let course_weeks = read_number(content, "weeks", "<CourseContent>", report);
    let mut arc_weeks_total = Some(0u64);

    for (arc_index, arc) in arcs.children_named("Arc").iter().enumerate() {
        let position = arc_index + 1;
        let arc_label = format!("<Arc> {}", position);

        check_order(arc, position, &arc_label, report);
        let arc_weeks = read_number(arc, "weeks", &arc_label, report);
        arc_weeks_total = match (arc_weeks_total, arc_weeks) {
            (Some(total), Some(weeks)) => Some(total + u64::from(weeks)),
            _ => None,
        };

        let Some(modules) = arc.child("Modules") else {
            continue;
        };
        let modules = modules.children_named("Module");
        if modules.is_empty() {
            continue;
        }

        let mut module_weeks_total = Some(0u64);
        for (module_index, module) in modules.iter().enumerate() {
            let module_label = format!("<Module> {} in {}", module_index + 1, arc_label);
            check_order(module, module_index + 1, &module_label, report);
            let weeks = read_number(module, "weeks", &module_label, report);
            module_weeks_total = match (module_weeks_total, weeks) {
                (Some(total), Some(weeks)) => Some(total + u64::from(weeks)),
                _ => None,
            };
        }

        if let (Some(sum), Some(limit)) = (module_weeks_total, arc_weeks) {
            compare_allocation(
                sum,
                u64::from(limit),
                &format!("Modules in {}", arc_label),
                "the arc's declared",
                report,
            );
        }
    }

    if let (Some(sum), Some(limit)) = (arc_weeks_total, course_weeks) {
        compare_allocation(sum, u64::from(limit), "Arcs", "the course total of", report);
    }
}

// sums are u64 so attribute values near u32::MAX cannot wrap
fn compare_allocation(sum: u64, limit: u64, subject: &str, bound: &str, report: &mut Report) {
    if sum > limit {
        report.errors.push(format!(
            "{} total {} weeks, exceeding {} {} weeks",
            subject, sum, bound, limit
        ));
    } else if sum < limit {
        report.warnings.push(format!(
            "{} total {} weeks, fewer than {} {} weeks",
            subject, sum, bound, limit
        ));
    }
}

fn check_order(element: &XmlElement, position: usize, element_label: &str, report: &mut Report) {
    match element.attr("order") {
        None => report.errors.push(format!(
            "{} is missing required 'order' attribute (expected order=\"{}\")",
            element_label, position
        )),
        Some(found) if found.trim().parse::<usize>().ok() != Some(position) => {
            report.errors.push(format!(
                "{} has order=\"{}\", expected order=\"{}\"",
                element_label, found, position
            ))
        }
        Some(_) => {}
    }
}

fn read_number(element: &XmlElement, attr: &str, element_label: &str, report: &mut Report) -> Option<u32> {
    match element.attr(attr) {
        None => {
            report.errors.push(format!(
                "{} is missing required '{}' attribute",
                element_label, attr
            ));
            None
        }
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(value) => Some(value),
            Err(_) => {
                report.errors.push(format!(
                    "{} has non-numeric {}=\"{}\"",
                    element_label, attr, raw
                ));
                None
            }
        },
    }
}
