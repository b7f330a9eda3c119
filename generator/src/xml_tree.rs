use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("XML parsing error: {0}")]
pub struct XmlParseError(pub String);

/// An owned element node with explicit child edges. Queries only look at
/// direct children, so a lookup never matches a same-named element elsewhere
/// in the document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    text: String,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a complete document into its root element.
    pub fn parse(xml: &str) -> Result<XmlElement, XmlParseError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                XmlParseError(format!("{} (at byte {})", e, reader.buffer_position()))
            })?;

            match event {
                Event::Start(start) => {
                    let element = Self::from_start(&start)?;
                    if stack.is_empty() && root.is_some() {
                        return Err(XmlParseError(format!(
                            "unexpected second root element <{}>",
                            element.name
                        )));
                    }
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = Self::from_start(&start)?;
                    Self::attach(element, &mut stack, &mut root)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlParseError("closing tag without an opening tag".to_string()))?;
                    Self::attach(element, &mut stack, &mut root)?;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| XmlParseError(e.to_string()))?;
                    match stack.last_mut() {
                        Some(current) => current.text.push_str(&text),
                        None if text.trim().is_empty() => {}
                        None => {
                            return Err(XmlParseError(
                                "text content outside the root element".to_string(),
                            ))
                        }
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlParseError(format!(
                "unexpected end of document, <{}> is not closed",
                open.name
            )));
        }

        root.ok_or_else(|| XmlParseError("document has no root element".to_string()))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<XmlElement, XmlParseError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut element = XmlElement::new(name);
        for attr in start.attributes() {
            let attr = attr.map_err(|e| XmlParseError(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| XmlParseError(e.to_string()))?
                .into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    fn attach(
        element: XmlElement,
        stack: &mut [XmlElement],
        root: &mut Option<XmlElement>,
    ) -> Result<(), XmlParseError> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None if root.is_none() => *root = Some(element),
            None => {
                return Err(XmlParseError(format!(
                    "unexpected second root element <{}>",
                    element.name
                )))
            }
        }
        Ok(())
    }

    /// First direct child with the given tag name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        self.children.iter().filter(|c| c.name == name).collect()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The element's own text, trimmed.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Trimmed text of a direct child, `None` if the child is absent.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(XmlElement::text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_document() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<Course>
  <CourseContent weeks="4">
    <Arcs count="1"><Arc order="1" weeks="4"><ArcName> Foundations </ArcName></Arc></Arcs>
  </CourseContent>
</Course>"#;
        let root = XmlElement::parse(xml).unwrap();

        assert_eq!(root.name, "Course");
        let content = root.child("CourseContent").unwrap();
        assert_eq!(content.attr("weeks"), Some("4"));
        let arcs = content.child("Arcs").unwrap();
        assert_eq!(arcs.attr("count"), Some("1"));
        let arc = arcs.children_named("Arc")[0];
        assert_eq!(arc.child_text("ArcName"), Some("Foundations"));
        assert_eq!(arc.child_text("ArcDescription"), None);
    }

    #[test]
    fn test_child_lookup_is_scoped() {
        let root = XmlElement::parse(
            "<Module><Projects><Skills><Skill/></Skills></Projects><AdditionalSkills/></Module>",
        )
        .unwrap();

        assert!(root.child("Skills").is_none());
        assert!(root.child("AdditionalSkills").unwrap().children.is_empty());
    }

    #[test]
    fn test_entities_and_cdata() {
        let root = XmlElement::parse("<A><B>R&amp;D</B><C><![CDATA[<raw>]]></C></A>").unwrap();
        assert_eq!(root.child_text("B"), Some("R&D"));
        assert_eq!(root.child_text("C"), Some("<raw>"));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(XmlElement::parse("<Module><Name></Module>").is_err());
        assert!(XmlElement::parse("<Module><Name>x</Name>").is_err());
        assert!(XmlElement::parse("<A/><B/>").is_err());
        assert!(XmlElement::parse("").is_err());
        assert!(XmlElement::parse("just prose").is_err());
    }
}
