//! Cache key computation.
//!
//! Provides [`CacheKey`] for computing content-based hashes used as cache keys,
//! and [`canonical_json`] for the order-independent option serialization the
//! hash relies on.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Render parameters for cache key computation.
///
/// Contains every input that affects the rendered output. Two keys built from
/// equal inputs hash identically no matter in which order the option map was
/// populated; a change to any field changes the hash.
#[derive(Debug, Clone, Copy)]
pub struct CacheKey<'a> {
    /// Diagram source text, hashed byte for byte.
    pub source: &'a str,
    /// Output format ("svg", "png", ...).
    pub format: &'a str,
    /// Theme name. `None` and `Some("")` are equivalent.
    pub theme: Option<&'a str>,
    /// Render options. `None` and an empty map are equivalent.
    pub options: Option<&'a Map<String, Value>>,
}

impl CacheKey<'_> {
    /// Compute a content hash for this key.
    ///
    /// # Hash Format
    ///
    /// Hex-encoded SHA-256 over the length-prefixed fields
    /// `format`, `source`, `theme`, `canonical(options)`, each written as
    /// `"{byte_len}:{bytes}\n"`. Length prefixes keep field boundaries
    /// unambiguous (`("ab", "c")` never collides with `("a", "bc")`).
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let options = self
            .options
            .map_or_else(|| "{}".to_owned(), canonical_options);
        let format = self.format.to_ascii_lowercase();

        let mut hasher = Sha256::new();
        for field in [
            format.as_str(),
            self.source,
            self.theme.unwrap_or(""),
            options.as_str(),
        ] {
            hasher.update(field.len().to_string().as_bytes());
            hasher.update(b":");
            hasher.update(field.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

/// Canonical serialization of an option map.
#[must_use]
pub fn canonical_options(options: &Map<String, Value>) -> String {
    let mut out = String::new();
    write_object(options, &mut out);
    out
}

/// Canonical JSON serialization of `value`.
///
/// Object keys are sorted at every depth, arrays keep their order, no
/// whitespace is emitted, strings use JSON escaping, and numbers use
/// `serde_json`'s representation (so `1` and `1.0` are distinct).
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        // Scalars already have a single canonical rendering
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object(map: &Map<String, Value>, out: &mut String) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_value(value, out);
    }
    out.push('}');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn key<'a>(
        source: &'a str,
        theme: Option<&'a str>,
        options: Option<&'a Map<String, Value>>,
    ) -> CacheKey<'a> {
        CacheKey {
            source,
            format: "svg",
            theme,
            options,
        }
    }

    #[test]
    fn test_same_inputs_same_hash() {
        let opts = map(json!({"width": 800}));
        let a = key("graph TD; A-->B", Some("dark"), Some(&opts));
        let b = key("graph TD; A-->B", Some("dark"), Some(&opts));

        assert_eq!(a.compute_hash(), b.compute_hash());
        assert_eq!(a.compute_hash().len(), 64);
        assert!(a.compute_hash().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_option_insertion_order_does_not_matter() {
        let mut first = Map::new();
        first.insert("width".to_owned(), json!(800));
        first.insert("height".to_owned(), json!(600));
        first.insert("nested".to_owned(), json!({"b": 1, "a": [1, {"y": 2, "x": 3}]}));

        let mut second = Map::new();
        second.insert("nested".to_owned(), json!({"a": [1, {"x": 3, "y": 2}], "b": 1}));
        second.insert("height".to_owned(), json!(600));
        second.insert("width".to_owned(), json!(800));

        assert_eq!(
            key("src", None, Some(&first)).compute_hash(),
            key("src", None, Some(&second)).compute_hash()
        );
    }

    #[test]
    fn test_any_input_change_changes_hash() {
        let opts = map(json!({"width": 800}));
        let other_opts = map(json!({"width": 801}));
        let base = key("src", Some("dark"), Some(&opts));

        let changed_source = key("src2", Some("dark"), Some(&opts));
        let changed_theme = key("src", Some("forest"), Some(&opts));
        let changed_options = key("src", Some("dark"), Some(&other_opts));
        let changed_format = CacheKey {
            format: "png",
            ..base
        };

        let hash = base.compute_hash();
        assert_ne!(hash, changed_source.compute_hash());
        assert_ne!(hash, changed_theme.compute_hash());
        assert_ne!(hash, changed_options.compute_hash());
        assert_ne!(hash, changed_format.compute_hash());
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let a = key("ab", Some("c"), None);
        let b = key("a", Some("bc"), None);
        assert_ne!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn test_absent_and_empty_are_equivalent() {
        let empty = Map::new();
        assert_eq!(
            key("src", None, None).compute_hash(),
            key("src", Some(""), Some(&empty)).compute_hash()
        );
    }

    #[test]
    fn test_format_is_case_insensitive() {
        let lower = key("src", None, None);
        let upper = CacheKey {
            format: "SVG",
            ..lower
        };
        assert_eq!(lower.compute_hash(), upper.compute_hash());
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": {"d": 1, "c": [true, null]}, "a": "x\"y"});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":"x\"y","b":{"c":[true,null],"d":1}}"#
        );
    }

    #[test]
    fn test_canonical_json_distinguishes_value_types() {
        assert_ne!(canonical_json(&json!(1)), canonical_json(&json!("1")));
        assert_ne!(canonical_json(&json!(1)), canonical_json(&json!(1.0)));
    }
}
