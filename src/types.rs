//! Entity type metadata. The registry is loaded once at mount from the type
//! endpoint and treated as immutable for the rest of the session; codes the
//! service never mentioned resolve to a permissive synthesized type so a
//! pattern referencing an unknown code still renders and accepts input.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

/// Validation rule of synthesized fallback types; matches any value.
pub const PERMISSIVE_VALIDATION: &str = "(.)*";

/// Display metadata for one entity type code.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EntityType {
    /// The lookup code; filled from the registry key when the body omits it.
    #[serde(default)]
    pub code: String,
    pub display_name: String,
    #[serde(default = "permissive_validation")]
    pub validation: String,
    #[serde(default)]
    pub description: String,
}

fn permissive_validation() -> String {
    PERMISSIVE_VALIDATION.to_string()
}

impl EntityType {
    /// Synthesize the fallback type for a code the registry does not know.
    pub fn permissive(code: &str) -> Self {
        Self {
            code: code.to_string(),
            display_name: code.to_string(),
            validation: permissive_validation(),
            description: String::new(),
        }
    }

    /// Whether `text` satisfies this type's validation rule. A rule that does
    /// not compile as a regex accepts everything rather than rejecting input
    /// the user can see.
    pub fn validates(&self, text: &str) -> bool {
        match Regex::new(&self.validation) {
            Ok(re) => re.is_match(text),
            Err(_) => true,
        }
    }
}

/// Immutable-per-session map of entity type codes to display metadata.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, EntityType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from a decoded type map, filling each entry's code
    /// from its key when the response body left it blank.
    pub fn from_map(map: HashMap<String, EntityType>) -> Self {
        let types = map
            .into_iter()
            .map(|(code, mut ty)| {
                if ty.code.is_empty() {
                    ty.code = code.clone();
                }
                (code, ty)
            })
            .collect();
        Self { types }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Look up a code, synthesizing a permissive type for unknown codes.
    pub fn resolve(&self, code: &str) -> EntityType {
        self.types
            .get(code)
            .cloned()
            .unwrap_or_else(|| EntityType::permissive(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(code: &str, display_name: &str) -> TypeRegistry {
        let mut map = HashMap::new();
        map.insert(
            code.to_string(),
            EntityType {
                code: String::new(),
                display_name: display_name.to_string(),
                validation: permissive_validation(),
                description: String::new(),
            },
        );
        TypeRegistry::from_map(map)
    }

    #[test]
    fn from_map_fills_code_from_key() {
        let registry = registry_with("date", "Date");
        let ty = registry.resolve("date");
        assert_eq!(ty.code, "date");
        assert_eq!(ty.display_name, "Date");
    }

    #[test]
    fn resolve_synthesizes_permissive_fallback() {
        let registry = TypeRegistry::new();
        let ty = registry.resolve("z");
        assert_eq!(ty.display_name, "z");
        assert_eq!(ty.code, "z");
        assert!(ty.validates(""));
        assert!(ty.validates("anything at all"));
    }

    #[test]
    fn validates_applies_the_rule() {
        let ty = EntityType {
            code: "year".into(),
            display_name: "Year".into(),
            validation: r"^\d{4}$".into(),
            description: String::new(),
        };
        assert!(ty.validates("2014"));
        assert!(!ty.validates("soon"));
    }

    #[test]
    fn unparseable_rule_accepts_everything() {
        let ty = EntityType {
            code: "odd".into(),
            display_name: "Odd".into(),
            validation: "(".into(),
            description: String::new(),
        };
        assert!(ty.validates("whatever"));
    }
}
