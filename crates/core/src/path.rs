//! Dot-separated field paths over JSON documents.
//!
//! Grammar: segments separated by `.`; each segment is a key optionally
//! followed by `[N]` indices, or a bare `[N]`. So `spec.ports[0].name` and
//! `spec.ports.[0].name` address the same value.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use smallvec::SmallVec;

use crate::error::{type_name, PathError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: SmallVec<[Segment; 4]>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let s = raw.strip_prefix('.').unwrap_or(raw);
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        let invalid = |reason| PathError::Invalid { path: raw.to_string(), reason };
        let mut segments: SmallVec<[Segment; 4]> = SmallVec::new();
        for seg in s.split('.') {
            if seg.is_empty() {
                return Err(invalid("empty segment"));
            }
            let (key, mut rest) = match seg.find('[') {
                Some(brk) => (&seg[..brk], &seg[brk..]),
                None => (seg, ""),
            };
            if key.contains(']') {
                return Err(invalid("unbalanced ']'"));
            }
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            }
            while !rest.is_empty() {
                let body = rest.strip_prefix('[').ok_or_else(|| invalid("expected '['"))?;
                let end = body.find(']').ok_or_else(|| invalid("missing ']'"))?;
                let digits = &body[..end];
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid("array index must be digits"));
                }
                let idx: usize = digits.parse().map_err(|_| invalid("array index too large"))?;
                segments.push(Segment::Index(idx));
                rest = &body[end + 1..];
            }
        }
        Ok(Self { raw: raw.to_string(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Resolve the path inside `root`. Missing keys, out-of-range indices and
    /// descending into scalars all yield `None`.
    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        Self::walk(root, &self.segments)
    }

    pub(crate) fn walk<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
        let mut cur = root;
        for seg in segments {
            cur = match (seg, cur) {
                (Segment::Key(k), Value::Object(map)) => map.get(k)?,
                (Segment::Index(i), Value::Array(arr)) => arr.get(*i)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    /// Write `value` at the path, creating intermediate objects for keys.
    /// Indices must address existing array elements.
    pub fn set(&self, root: &mut Value, value: Value) -> Result<(), PathError> {
        let mut cur = root;
        for (pos, seg) in self.segments.iter().enumerate() {
            if cur.is_null() {
                if let Segment::Key(_) = seg {
                    *cur = Value::Object(serde_json::Map::new());
                }
            }
            let found = type_name(cur);
            cur = match (seg, cur) {
                (Segment::Key(k), Value::Object(map)) => map.entry(k.clone()).or_insert(Value::Null),
                (Segment::Index(i), Value::Array(arr)) => {
                    let len = arr.len();
                    arr.get_mut(*i).ok_or_else(|| PathError::OutOfBounds { path: self.raw.clone(), index: *i, len })?
                }
                (Segment::Key(_), _) => {
                    return Err(PathError::TypeMismatch { path: self.raw.clone(), segment: pos, expected: "object", found })
                }
                (Segment::Index(_), _) => {
                    return Err(PathError::TypeMismatch { path: self.raw.clone(), segment: pos, expected: "array", found })
                }
            };
        }
        *cur = value;
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// String form of a scalar used for selector comparisons.
///
/// Both sides of a field match are compared as strings: numbers render via
/// `serde_json` (`3` -> "3", `3.0` -> "3.0"), booleans as "true"/"false".
/// Null, arrays and objects have no string form and never match.
pub fn render_scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_accepts_both_index_forms() {
        let a = FieldPath::parse("spec.ports.[1].name").unwrap();
        let b = FieldPath::parse("spec.ports[1].name").unwrap();
        assert_eq!(a.segments(), b.segments());
        assert_eq!(a.segments().len(), 4);
        assert_eq!(a.segments()[2], Segment::Index(1));
        assert_eq!(FieldPath::parse(".spec.x").unwrap().segments().len(), 2);
    }

    #[test]
    fn parse_rejects_malformed_paths() {
        assert_eq!(FieldPath::parse(""), Err(PathError::Empty));
        assert!(FieldPath::parse("spec..x").is_err());
        assert!(FieldPath::parse("spec.[x]").is_err());
        assert!(FieldPath::parse("spec.a[1").is_err());
        assert!(FieldPath::parse("spec.a]").is_err());
        assert!(FieldPath::parse("spec.[]").is_err());
    }

    #[test]
    fn get_walks_objects_and_arrays() {
        let doc = json!({"spec": {"ports": [{"port": 80}, {"port": 443, "name": "tls"}]}});
        let p = FieldPath::parse("spec.ports.[1].name").unwrap();
        assert_eq!(p.get(&doc), Some(&json!("tls")));
        assert_eq!(FieldPath::parse("spec.ports[0].name").unwrap().get(&doc), None);
        assert_eq!(FieldPath::parse("spec.ports[5]").unwrap().get(&doc), None);
        assert_eq!(FieldPath::parse("spec.ports.port").unwrap().get(&doc), None);
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut doc = json!({});
        FieldPath::parse("spec.template.replicas").unwrap().set(&mut doc, json!(3)).unwrap();
        assert_eq!(doc, json!({"spec": {"template": {"replicas": 3}}}));

        let mut arr = json!({"items": [1, 2]});
        FieldPath::parse("items[1]").unwrap().set(&mut arr, json!("two")).unwrap();
        assert_eq!(arr, json!({"items": [1, "two"]}));

        let err = FieldPath::parse("items[4]").unwrap().set(&mut arr, json!(0)).unwrap_err();
        assert!(matches!(err, PathError::OutOfBounds { index: 4, len: 2, .. }));
        let err = FieldPath::parse("items.x").unwrap().set(&mut arr, json!(0)).unwrap_err();
        assert!(matches!(err, PathError::TypeMismatch { expected: "object", found: "array", .. }));
    }

    #[test]
    fn render_scalar_stringifies_both_number_and_string() {
        assert_eq!(render_scalar(&json!(3)).as_deref(), Some("3"));
        assert_eq!(render_scalar(&json!("3")).as_deref(), Some("3"));
        assert_eq!(render_scalar(&json!(3.0)).as_deref(), Some("3.0"));
        assert_eq!(render_scalar(&json!(false)).as_deref(), Some("false"));
        assert_eq!(render_scalar(&json!(null)), None);
        assert_eq!(render_scalar(&json!([1])), None);
    }
}
