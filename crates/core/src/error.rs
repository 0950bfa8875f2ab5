use thiserror::Error;

/// Failures while parsing or walking a dot-separated field path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty field path")]
    Empty,
    #[error("invalid field path {path:?}: {reason}")]
    Invalid { path: String, reason: &'static str },
    #[error("field path {path:?}: expected {expected} at segment {segment}, found {found}")]
    TypeMismatch {
        path: String,
        segment: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("field path {path:?}: index {index} out of bounds (len {len})")]
    OutOfBounds { path: String, index: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource document must be a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("decoding resource: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Path(#[from] PathError),
}

/// Human name of a JSON value's type, used in error messages.
pub(crate) fn type_name(v: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
