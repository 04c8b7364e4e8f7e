//! Dot-path accessors over `serde_json::Value`.
//!
//! A path such as `"deep.value"` or `"rows.0.name"` names a location inside a
//! JSON-shaped value. Derived and sub stores use it to build a getter (and for
//! sub stores a setter) without hand-written closures.
//!
//! # Grammar
//!
//! One or more non-empty segments separated by `.`. A segment made only of
//! ASCII digits is an array index; anything else is an object key. There is no
//! escaping, so keys containing `.` cannot be addressed.
//!
//! # Semantics
//!
//! - Reading a location that does not exist yields `Value::Null`.
//! - Writing creates whatever is missing on the way down. A scalar in the way
//!   is replaced by an object (or an array, for an index segment). Writing at
//!   index `len` appends; writing past it pads the array with `Null`.

use std::fmt;

use serde_json::{Map, Value};
use smallvec::SmallVec;

use crate::error::{Result, StoreError};

/// Largest array index a path may name.
pub const MAX_INDEX: usize = (1 << 20) - 1;

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed dot path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    raw: String,
    segments: SmallVec<[Segment; 4]>,
}

impl Path {
    /// Parse a dot path.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason| StoreError::InvalidPath {
            path: raw.to_string(),
            reason,
        };

        if raw.is_empty() {
            return Err(invalid("path is empty"));
        }

        let segments = raw
            .split('.')
            .map(|part| {
                if part.is_empty() {
                    Err(invalid("empty segment"))
                } else if part.bytes().all(|b| b.is_ascii_digit()) {
                    part.parse::<usize>()
                        .ok()
                        .filter(|index| *index <= MAX_INDEX)
                        .map(Segment::Index)
                        .ok_or_else(|| invalid("index out of range"))
                } else {
                    Ok(Segment::Key(part.to_string()))
                }
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Borrow the value at this path, if it exists.
    pub fn lookup<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| match (segment, node) {
                (Segment::Key(key), Value::Object(map)) => map.get(key),
                (Segment::Index(index), Value::Array(items)) => items.get(*index),
                _ => None,
            })
    }

    /// Read the value at this path, or `Null` if it does not exist.
    pub fn get(&self, root: &Value) -> Value {
        self.lookup(root).cloned().unwrap_or(Value::Null)
    }

    /// Write `value` at this path, creating intermediate containers.
    pub fn set(&self, root: &mut Value, value: Value) {
        let mut node = root;
        for segment in &self.segments {
            node = match segment {
                Segment::Key(key) => {
                    if !node.is_object() {
                        *node = Value::Object(Map::new());
                    }
                    match node {
                        Value::Object(map) => map.entry(key.as_str()).or_insert(Value::Null),
                        _ => unreachable!("node was just made an object"),
                    }
                }
                Segment::Index(index) => {
                    if !node.is_array() {
                        *node = Value::Array(Vec::new());
                    }
                    match node {
                        Value::Array(items) => {
                            if items.len() <= *index {
                                items.resize(index + 1, Value::Null);
                            }
                            &mut items[*index]
                        }
                        _ => unreachable!("node was just made an array"),
                    }
                }
            };
        }
        *node = value;
    }

    /// Return a copy of `root` with `value` written at this path.
    pub fn with(&self, mut root: Value, value: Value) -> Value {
        self.set(&mut root, value);
        root
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_keys_and_indices() {
        let path = Path::parse("rows.2.name").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("rows".into()),
                Segment::Index(2),
                Segment::Key("name".into()),
            ]
        );
        assert_eq!(path.to_string(), "rows.2.name");
    }

    #[test]
    fn rejects_empty_paths_and_segments() {
        assert!(matches!(
            Path::parse(""),
            Err(StoreError::InvalidPath { reason: "path is empty", .. })
        ));
        assert!(matches!(
            Path::parse("a..b"),
            Err(StoreError::InvalidPath { reason: "empty segment", .. })
        ));
        assert!(Path::parse("a.").is_err());
        assert!(Path::parse("99999999999999999999999").is_err());
    }

    #[test]
    fn rejects_indices_past_the_limit() {
        for raw in ["rows.18446744073709551615", "rows.99999999999"] {
            assert!(matches!(
                Path::parse(raw),
                Err(StoreError::InvalidPath { reason: "index out of range", .. })
            ));
        }

        let limit = format!("rows.{MAX_INDEX}");
        assert!(Path::parse(&limit).is_ok());
        let over = format!("rows.{}", MAX_INDEX + 1);
        assert!(Path::parse(&over).is_err());
    }

    #[test]
    fn get_reads_nested_values() {
        let value = json!({ "deep": { "value": "here" }, "rows": [1, 2] });
        assert_eq!(Path::parse("deep.value").unwrap().get(&value), json!("here"));
        assert_eq!(Path::parse("rows.1").unwrap().get(&value), json!(2));
    }

    #[test]
    fn get_missing_is_null() {
        let value = json!({ "deep": { "value": "here" } });
        assert_eq!(Path::parse("deep.other").unwrap().get(&value), Value::Null);
        assert_eq!(Path::parse("deep.value.x").unwrap().get(&value), Value::Null);
        assert_eq!(Path::parse("deep.0").unwrap().get(&value), Value::Null);
    }

    #[test]
    fn set_replaces_leaf_and_keeps_siblings() {
        let value = json!({ "deep": { "value": "here" }, "hello": "world" });
        let updated = Path::parse("deep.value").unwrap().with(value, json!("there"));
        assert_eq!(updated, json!({ "deep": { "value": "there" }, "hello": "world" }));
    }

    #[test]
    fn set_creates_missing_containers() {
        let mut value = json!({ "a": 1 });
        Path::parse("a.b.2").unwrap().set(&mut value, json!(true));
        assert_eq!(value, json!({ "a": { "b": [null, null, true] } }));
    }

    #[test]
    fn set_at_len_appends() {
        let mut value = json!({ "rows": [1] });
        Path::parse("rows.1").unwrap().set(&mut value, json!(2));
        assert_eq!(value, json!({ "rows": [1, 2] }));
    }
}
