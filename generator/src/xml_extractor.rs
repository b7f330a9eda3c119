use regex::Regex;
use std::sync::OnceLock;

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Leftmost complete `<Root>...</Root>` pair found inside surrounding prose.
    TagPair,
    /// The whole trimmed response is the root element.
    WholeResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub xml: String,
    pub strategy: ExtractionStrategy,
}

fn comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"))
}

fn blank_lines_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // a newline followed by three or more blank lines
    RE.get_or_init(|| Regex::new(r"\n(?:[ \t]*\n){3,}").expect("static regex"))
}

/// Isolate the `root_tag` element from raw model output.
///
/// Returns the cleaned element prefixed with an XML declaration, or `None`
/// when the output holds no complete root element.
pub fn extract_root_element(raw: &str, root_tag: &str) -> Option<String> {
    extract(raw, root_tag).map(|e| e.xml)
}

pub fn extract(raw: &str, root_tag: &str) -> Option<Extraction> {
    let tag = regex::escape(root_tag);
    let pair = Regex::new(&format!(r"(?is)<{tag}(?:\s[^>]*)?>.*?</{tag}\s*>")).ok()?;
    let found = pair.find(raw)?;

    let strategy = if found.as_str() == raw.trim() {
        ExtractionStrategy::WholeResponse
    } else {
        ExtractionStrategy::TagPair
    };

    Some(Extraction {
        xml: clean(found.as_str()),
        strategy,
    })
}

fn clean(element: &str) -> String {
    let without_comments = comment_regex().replace_all(element, "");
    let collapsed = blank_lines_regex().replace_all(&without_comments, "\n\n");
    format!("{}\n{}", XML_DECLARATION, collapsed.trim())
}
