use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar attribute stored on a [`Document`].
///
/// Reads are lenient across variants: `"yes"` reads as `true`, `"12"` reads as
/// `12`, and so on, so payloads produced by older peers that stringify every
/// value still decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl AttrValue {
    pub fn to_bool(&self, default: bool) -> bool {
        match self {
            AttrValue::Bool(value) => *value,
            AttrValue::Int(value) => *value != 0,
            AttrValue::Str(text) => match text.trim() {
                "yes" | "true" | "on" | "1" => true,
                "no" | "false" | "off" | "0" => false,
                _ => default,
            },
        }
    }

    pub fn to_int(&self, default: i64) -> i64 {
        match self {
            AttrValue::Bool(value) => i64::from(*value),
            AttrValue::Int(value) => *value,
            AttrValue::Str(text) => text.trim().parse().unwrap_or(default),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(true) => f.write_str("yes"),
            AttrValue::Bool(false) => f.write_str("no"),
            AttrValue::Int(value) => write!(f, "{}", value),
            AttrValue::Str(text) => f.write_str(text),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(i64::from(value))
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        AttrValue::Int(i64::from(value))
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

/// Hierarchical key/value container with ordered, named children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    attributes: BTreeMap<String, AttrValue>,
    #[serde(default)]
    children: Vec<(String, Document)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Document::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder form of [`Document::add_child`].
    pub fn with_child(mut self, name: impl Into<String>, child: Document) -> Self {
        self.add_child(name, child);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.children.is_empty()
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.attributes.remove(key)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.attr(key)
            .map(|value| value.to_bool(default))
            .unwrap_or(default)
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.attr(key)
            .map(|value| value.to_int(default))
            .unwrap_or(default)
    }

    /// Attribute rendered as text; missing attributes read as an empty string.
    pub fn get_str(&self, key: &str) -> String {
        self.attr(key).map(ToString::to_string).unwrap_or_default()
    }

    pub fn child(&self, name: &str) -> Option<&Document> {
        self.children
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, child)| child)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Document> {
        self.children
            .iter_mut()
            .find(|(key, _)| key == name)
            .map(|(_, child)| child)
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Document> + 'a {
        self.children
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, child)| child)
    }

    pub fn all_children(&self) -> impl Iterator<Item = (&str, &Document)> {
        self.children
            .iter()
            .map(|(key, child)| (key.as_str(), child))
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn add_child(&mut self, name: impl Into<String>, child: Document) -> &mut Document {
        self.children.push((name.into(), child));
        let last = self.children.len() - 1;
        &mut self.children[last].1
    }

    /// Insert a child at `index` among all children; indices past the end append.
    pub fn add_child_at(
        &mut self,
        name: impl Into<String>,
        child: Document,
        index: usize,
    ) -> &mut Document {
        let index = index.min(self.children.len());
        self.children.insert(index, (name.into(), child));
        &mut self.children[index].1
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_level(doc: &Document, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let indent = "\t".repeat(depth);
            for (key, value) in &doc.attributes {
                writeln!(f, "{}{}=\"{}\"", indent, key, value)?;
            }
            for (name, child) in &doc.children {
                writeln!(f, "{}[{}]", indent, name)?;
                write_level(child, depth + 1, f)?;
                writeln!(f, "{}[/{}]", indent, name)?;
            }
            Ok(())
        }
        write_level(self, 0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_reads_cross_variants() {
        let doc = Document::new()
            .with("flag", "yes")
            .with("count", "12")
            .with("bool_as_int", true);

        assert!(doc.get_bool("flag", false));
        assert_eq!(doc.get_int("count", 0), 12);
        assert_eq!(doc.get_int("bool_as_int", 0), 1);
        assert_eq!(doc.get_int("missing", 7), 7);
        assert_eq!(doc.get_str("missing"), "");
        assert_eq!(doc.get_str("flag"), "yes");
    }

    #[test]
    fn children_keep_insertion_order() {
        let mut doc = Document::new();
        doc.add_child("command", Document::new().with("n", 1));
        doc.add_child("command", Document::new().with("n", 3));
        doc.add_child_at("command", Document::new().with("n", 2), 1);
        doc.add_child("other", Document::new());

        let order: Vec<i64> = doc
            .children("command")
            .map(|child| child.get_int("n", 0))
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(doc.child_count(), 4);
        assert!(doc.has_child("other"));
        assert!(!doc.has_child("absent"));
    }

    #[test]
    fn display_uses_bracketed_tags() {
        let doc = Document::new()
            .with("undo", false)
            .with_child("speak", Document::new().with("message", "hi"));
        assert_eq!(
            doc.to_string(),
            "undo=\"no\"\n[speak]\n\tmessage=\"hi\"\n[/speak]\n"
        );
    }
}
