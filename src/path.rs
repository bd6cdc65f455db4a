//! Key paths for context and previous-output lookups
//!
//! Supports:
//! - a.b.c (dot notation)
//! - a[0].b (array index, same as a.0.b)
//! - "" (empty path: the parameter's own name or the positional slot)
//!
//! A numeric segment indexes arrays; on objects it is an ordinary key.

use std::fmt;

use serde_json::Value;

/// Ordered list of string segments naming a value
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    /// The empty path
    pub fn empty() -> Self {
        Self::default()
    }

    /// Path with a single segment, taken verbatim (dots are not split)
    pub fn single(segment: impl Into<String>) -> Self {
        Self(vec![segment.into()])
    }

    /// Build a path from explicit segments
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse dotted text into segments
    ///
    /// Examples:
    /// - "a.t1" → ["a", "t1"]
    /// - "items[0].name" → ["items", "0", "name"]
    /// - "" → []
    pub fn parse(text: &str) -> Self {
        let mut segments = Vec::new();

        for part in text.split('.').filter(|p| !p.is_empty()) {
            match part.find('[') {
                Some(bracket_pos) if part.ends_with(']') => {
                    let field = &part[..bracket_pos];
                    if !field.is_empty() {
                        segments.push(field.to_string());
                    }
                    // a[0][1] → a, 0, 1
                    for index in part[bracket_pos + 1..part.len() - 1].split("][") {
                        segments.push(index.to_string());
                    }
                }
                _ => segments.push(part.to_string()),
            }
        }

        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// First segment (the member id for history lookups)
    pub fn head(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Segments after the first
    pub fn tail(&self) -> &[String] {
        self.0.get(1..).unwrap_or(&[])
    }

    /// Plain key used for global lookups
    pub fn joined(&self) -> String {
        self.0.join(".")
    }

    /// Descend into `value` following every segment of this path
    pub fn resolve<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        descend(value, &self.0)
    }
}

/// Descend through nested objects/arrays; a missing step makes the whole path absent
pub fn descend<'v>(value: &'v Value, segments: &[String]) -> Option<&'v Value> {
    let mut current = value;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl From<&str> for KeyPath {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<String> for KeyPath {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}
