//! AWS query and S3 responses as a small element tree.
//!
//! Lookups by tag name treat elements of other names as transparent, so
//! `child(body, "TagDescriptions")` finds the list wherever the response
//! envelope puts it, while `member` inside `member` stays with its parent.

use crate::error::{Result, RtError};
use quick_xml::events::Event;
use quick_xml::Reader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Unescaped, trimmed character data directly inside this element.
    pub content: String,
    pub children: Vec<Element>,
}

fn malformed(e: impl std::fmt::Display) -> RtError {
    RtError::Http(format!("malformed XML response: {e}"))
}

/// Parse a response body. The returned element is an unnamed document root.
pub fn parse(body: &str) -> Result<Element> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);
    let mut stack = vec![Element::default()];
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) => stack.push(Element {
                name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                ..Default::default()
            }),
            Event::Empty(e) => {
                let el = Element {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                    ..Default::default()
                };
                if let Some(top) = stack.last_mut() {
                    top.children.push(el);
                }
            }
            Event::End(_) => close(&mut stack),
            Event::Text(t) => {
                let text = t.unescape().map_err(malformed)?;
                if let Some(top) = stack.last_mut() {
                    top.content.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.content.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    while stack.len() > 1 {
        close(&mut stack);
    }
    Ok(stack.pop().unwrap_or_default())
}

fn close(stack: &mut Vec<Element>) {
    if stack.len() < 2 {
        return;
    }
    if let Some(el) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(el);
        }
    }
}

impl Element {
    /// Every `<tag>` below this element that is not nested in another `<tag>`.
    pub fn children(&self, tag: &str) -> Vec<&Element> {
        let mut out = Vec::new();
        collect(self, tag, &mut out);
        out
    }

    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children(tag).into_iter().next()
    }

    /// Text of the first `<tag>`, or `None` when absent.
    pub fn text(&self, tag: &str) -> Option<String> {
        self.child(tag).map(|e| e.content.clone())
    }

    /// `<item>` elements of the first `<list>`, e.g. `items("LoadBalancers", "member")`.
    pub fn items(&self, list: &str, item: &str) -> Vec<&Element> {
        self.child(list)
            .map(|l| l.children(item))
            .unwrap_or_default()
    }

    /// Follow a path of nested tags and return the texts found at its end,
    /// e.g. `texts(&["Tags", "member", "ResourceId"])`.
    pub fn texts(&self, path: &[&str]) -> Vec<String> {
        let Some((last, parents)) = path.split_last() else {
            return Vec::new();
        };
        let mut scopes = vec![self];
        for tag in parents {
            scopes = scopes.into_iter().flat_map(|s| s.children(tag)).collect();
        }
        scopes
            .into_iter()
            .flat_map(|s| s.children(last))
            .map(|e| e.content.clone())
            .collect()
    }
}

fn collect<'a>(el: &'a Element, tag: &str, out: &mut Vec<&'a Element>) {
    for c in &el.children {
        if c.name == tag {
            out.push(c);
        } else {
            collect(c, tag, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"<?xml version="1.0"?>
<DescribeTagsResponse xmlns="http://elasticloadbalancing.amazonaws.com/doc/2012-06-01/">
  <TagDescriptions>
    <member>
      <LoadBalancerName>lb-one</LoadBalancerName>
      <Tags>
        <member><Key>App</Key><Value>hello</Value></member>
        <member><Key>Team</Key><Value>a &amp; b</Value></member>
      </Tags>
    </member>
    <member>
      <LoadBalancerName>lb-two</LoadBalancerName>
      <Tags/>
    </member>
  </TagDescriptions>
</DescribeTagsResponse>"#;

    #[test]
    fn nested_members_stay_with_their_parent() {
        let doc = parse(BODY).unwrap();
        let descs = doc.items("TagDescriptions", "member");
        assert_eq!(descs.len(), 2);
        assert_eq!(descs[0].text("LoadBalancerName").as_deref(), Some("lb-one"));
        assert_eq!(descs[0].texts(&["Tags", "member", "Key"]), vec!["App", "Team"]);
        assert_eq!(descs[0].texts(&["Tags", "member", "Value"]), vec!["hello", "a & b"]);
        assert!(descs[1].texts(&["Tags", "member", "Key"]).is_empty());
        assert!(descs[1].child("Tags").is_some());
    }

    #[test]
    fn tag_prefixes_do_not_match() {
        let doc = parse("<r><KeyCount>1</KeyCount><Key>a</Key></r>").unwrap();
        assert_eq!(doc.text("Key").as_deref(), Some("a"));
    }

    #[test]
    fn namespaces_and_attributes_are_skipped() {
        let doc = parse(r#"<s3:Error xmlns:s3="x" a="1"><Code>NoSuchKey</Code></s3:Error>"#).unwrap();
        assert_eq!(doc.texts(&["Error", "Code"]), vec!["NoSuchKey"]);
    }

    #[test]
    fn missing_elements() {
        let doc = parse("<a>1</a>").unwrap();
        assert_eq!(doc.text("b"), None);
        assert!(doc.items("b", "member").is_empty());
        assert!(parse("plain text").unwrap().children.is_empty());
    }

    #[test]
    fn mismatched_close_is_an_error() {
        let err = parse("<a><b>1</a>").unwrap_err();
        assert!(err.to_string().contains("malformed XML response"));
    }
}
