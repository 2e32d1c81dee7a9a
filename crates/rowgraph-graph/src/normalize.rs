//! Property normalization: coerce any source value into the scalar set the
//! graph sink accepts.
//!
//! | Source kind | Result |
//! |---|---|
//! | bytes | UTF-8 text (lossy) |
//! | text longer than `max_text_len` chars | truncated, warning |
//! | integer | base-10 text |
//! | bool, float, null | unchanged |
//! | timestamp | RFC 3339 text |
//! | map | JSON text |
//! | list | JSON text, or a list of scalars under `ListPolicy::Preserve` |
//!
//! Normalization is pure and idempotent: `normalize(normalize(v)) == normalize(v)`.

use rowgraph_core::{EngineConfig, ListPolicy, Properties, Value, MAX_TEXT_LEN};
use tracing::warn;

/// Non-fatal notice raised while coercing a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizationWarning {
    /// Text was cut down to the configured maximum length.
    Truncated { original_len: usize, max_len: usize },
    /// A value was coerced to its debug rendering because JSON rendering failed.
    Stringified { kind: &'static str },
}

impl std::fmt::Display for NormalizationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated {
                original_len,
                max_len,
            } => write!(
                f,
                "text of {} chars truncated to {} chars",
                original_len, max_len
            ),
            Self::Stringified { kind } => {
                write!(f, "{} value coerced to its textual representation", kind)
            }
        }
    }
}

/// Stateless value coercer; safe to share between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    max_text_len: usize,
    list_policy: ListPolicy,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(MAX_TEXT_LEN, ListPolicy::default())
    }
}

impl Normalizer {
    pub fn new(max_text_len: usize, list_policy: ListPolicy) -> Self {
        Self {
            max_text_len,
            list_policy,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_text_len, config.list_policy)
    }

    pub fn max_text_len(&self) -> usize {
        self.max_text_len
    }

    pub fn list_policy(&self) -> ListPolicy {
        self.list_policy
    }

    /// Normalize one value, logging any warnings.
    pub fn normalize(&self, value: Value) -> Value {
        let mut warnings = Vec::new();
        let value = self.coerce(value, &mut warnings);
        for warning in &warnings {
            warn!("Normalization warning: {}", warning);
        }
        value
    }

    /// Normalize one value, collecting warnings instead of logging them.
    pub fn coerce(&self, value: Value, warnings: &mut Vec<NormalizationWarning>) -> Value {
        match value {
            Value::Null | Value::Bool(_) | Value::Float(_) => value,
            Value::Int(i) => Value::Text(i.to_string()),
            Value::Text(s) => Value::Text(self.truncate(s, warnings)),
            Value::Bytes(b) => {
                let text = match String::from_utf8(b) {
                    Ok(text) => text,
                    Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
                };
                Value::Text(self.truncate(text, warnings))
            }
            Value::Timestamp(ts) => Value::Text(ts.to_rfc3339()),
            Value::Map(_) => self.stringify(&value, "map", warnings),
            Value::List(items) => match self.list_policy {
                ListPolicy::Stringify => self.stringify(&Value::List(items), "list", warnings),
                ListPolicy::Preserve => Value::List(
                    items
                        .into_iter()
                        .map(|item| match item {
                            Value::List(_) => self.stringify(&item, "list", warnings),
                            other => self.coerce(other, warnings),
                        })
                        .collect(),
                ),
            },
        }
    }

    /// Normalize every value of a property bag, collecting warnings.
    pub fn coerce_properties(
        &self,
        properties: Properties,
        warnings: &mut Vec<NormalizationWarning>,
    ) -> Properties {
        properties
            .into_iter()
            .map(|(key, value)| (key, self.coerce(value, warnings)))
            .collect()
    }

    /// Normalize every value of a property bag, logging any warnings.
    pub fn normalize_properties(&self, properties: Properties) -> Properties {
        properties
            .into_iter()
            .map(|(key, value)| (key, self.normalize(value)))
            .collect()
    }

    /// Render a container as JSON text, falling back to its debug form.
    fn stringify(
        &self,
        value: &Value,
        kind: &'static str,
        warnings: &mut Vec<NormalizationWarning>,
    ) -> Value {
        let text = match serde_json::to_string(&value.to_json()) {
            Ok(json) => json,
            Err(_) => {
                warnings.push(NormalizationWarning::Stringified { kind });
                format!("{:?}", value)
            }
        };
        Value::Text(self.truncate(text, warnings))
    }

    fn truncate(&self, mut text: String, warnings: &mut Vec<NormalizationWarning>) -> String {
        if let Some((cut, _)) = text.char_indices().nth(self.max_text_len) {
            warnings.push(NormalizationWarning::Truncated {
                original_len: text.chars().count(),
                max_len: self.max_text_len,
            });
            text.truncate(cut);
        }
        text
    }
}

/// Normalize with the default limits.
pub fn normalize(value: Value) -> Value {
    Normalizer::default().normalize(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn sample_values() -> Vec<Value> {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::Int(1));
        vec![
            Value::Null,
            Value::Bool(true),
            Value::Int(-42),
            Value::Float(2.5),
            Value::from("plain"),
            Value::from("é".repeat(12_000)),
            Value::Bytes("bytes".as_bytes().to_vec()),
            Value::Bytes(vec![0xff, 0xfe, b'a']),
            Value::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            Value::Map(map.clone()),
            Value::List(vec![Value::Int(1), Value::Map(map), Value::List(vec![])]),
        ]
    }

    #[test]
    fn test_integers_become_text() {
        assert_eq!(normalize(Value::Int(1)), Value::from("1"));
        assert_eq!(normalize(Value::Int(i64::MIN)), Value::from("-9223372036854775808"));
    }

    #[test]
    fn test_scalars_preserved() {
        assert_eq!(normalize(Value::Null), Value::Null);
        assert_eq!(normalize(Value::Bool(false)), Value::Bool(false));
        assert_eq!(normalize(Value::Float(0.25)), Value::Float(0.25));
    }

    #[test]
    fn test_nested_map_becomes_json() {
        let v = Value::from_json(serde_json::json!({"a": 1}));
        assert_eq!(normalize(v), Value::from(r#"{"a":1}"#));
    }

    #[test]
    fn test_bytes_decoded() {
        assert_eq!(normalize(Value::Bytes(b"hello".to_vec())), Value::from("hello"));
        let Value::Text(lossy) = normalize(Value::Bytes(vec![0xff, b'x'])) else {
            panic!("expected text");
        };
        assert!(lossy.ends_with('x'));
    }

    #[test]
    fn test_long_text_truncated_with_warning() {
        let normalizer = Normalizer::default();
        let mut warnings = Vec::new();
        let v = normalizer.coerce(Value::from("x".repeat(20_000)), &mut warnings);
        let Value::Text(s) = v else {
            panic!("expected text");
        };
        assert_eq!(s.chars().count(), 10_000);
        assert_eq!(
            warnings,
            vec![NormalizationWarning::Truncated {
                original_len: 20_000,
                max_len: 10_000
            }]
        );
    }

    #[test]
    fn test_text_at_limit_unchanged() {
        let s = "y".repeat(10_000);
        let mut warnings = Vec::new();
        let v = Normalizer::default().coerce(Value::from(s.clone()), &mut warnings);
        assert_eq!(v, Value::Text(s));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let normalizer = Normalizer::new(3, ListPolicy::Stringify);
        assert_eq!(normalizer.normalize(Value::from("日本語です")), Value::from("日本語"));
    }

    #[test]
    fn test_list_stringified_by_default() {
        let v = Value::List(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(normalize(v), Value::from(r#"[1,"a"]"#));
    }

    #[test]
    fn test_list_preserved_as_scalars() {
        let normalizer = Normalizer::new(MAX_TEXT_LEN, ListPolicy::Preserve);
        let v = Value::List(vec![
            Value::Int(1),
            Value::Bool(true),
            Value::List(vec![Value::Int(2)]),
            Value::from_json(serde_json::json!({"k": "v"})),
        ]);
        assert_eq!(
            normalizer.normalize(v),
            Value::List(vec![
                Value::from("1"),
                Value::Bool(true),
                Value::from("[2]"),
                Value::from(r#"{"k":"v"}"#),
            ])
        );
    }

    #[test]
    fn test_timestamp_rfc3339() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(normalize(Value::Timestamp(ts)), Value::from("2024-05-01T12:00:00+00:00"));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for policy in [ListPolicy::Stringify, ListPolicy::Preserve] {
            let normalizer = Normalizer::new(MAX_TEXT_LEN, policy);
            for v in sample_values() {
                let once = normalizer.normalize(v.clone());
                let twice = normalizer.normalize(once.clone());
                assert_eq!(once, twice, "not idempotent for {:?} under {:?}", v, policy);
            }
        }
    }

    #[test]
    fn test_short_strings_are_fixed_points() {
        for s in ["", "a", "Ada Lovelace", "{\"a\":1}", "  spaced  "] {
            assert_eq!(normalize(Value::from(s)), Value::from(s));
        }
    }
}
