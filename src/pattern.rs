//! Pattern templates are opaque strings with `{code}` placeholders. Parsing
//! decomposes one into an ordered list of segments: literal text runs and
//! typed entity blanks. The renderer relies on stable segment indexing, so
//! empty text runs (leading, trailing, or between adjacent placeholders) are
//! kept rather than dropped; they simply contribute zero columns.

use crate::types::{EntityType, TypeRegistry};
use regex::Regex;
use std::sync::OnceLock;

/// One atomic piece of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Entity { ty: EntityType, value: String },
}

impl Segment {
    pub fn is_entity(&self) -> bool {
        matches!(self, Segment::Entity { .. })
    }

    /// The text this segment contributes to the composed question.
    pub fn composed_text(&self) -> &str {
        match self {
            Segment::Text(text) => text,
            Segment::Entity { value, .. } => value,
        }
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^}]*\}").expect("placeholder regex is valid"))
}

/// Split a pattern template into segments. Pure and deterministic: the same
/// template and registry always produce the same segment list, in template
/// order. `parse_pattern("")` yields a single empty text segment.
pub fn parse_pattern(pattern: &str, types: &TypeRegistry) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;
    for found in placeholder_regex().find_iter(pattern) {
        segments.push(Segment::Text(pattern[last..found.start()].to_string()));
        let code = &pattern[found.start() + 1..found.end() - 1];
        segments.push(Segment::Entity {
            ty: types.resolve(code),
            value: String::new(),
        });
        last = found.end();
    }
    segments.push(Segment::Text(pattern[last..].to_string()));
    segments
}
