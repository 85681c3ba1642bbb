//! Checked lookups into structured attribute values.
//!
//! Attribute trees (`config`, `users`, environment defaults) are open-ended
//! `serde_json::Value`s. Lookups report a missing key or a wrong type with the
//! dotted path that failed, instead of panicking on index or coercing.

use serde_json::Value;
use thiserror::Error;

/// Why a lookup did not produce a value of the requested shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("missing key `{path}`")]
    Missing { path: String },

    #[error("`{path}` must be {expected}")]
    WrongType { path: String, expected: &'static str },
}

impl LookupError {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }
}

/// Walk `path` from `root`.
///
/// A segment that lands on a non-object (or on `null`) counts as missing, so
/// `config.zookeeper.incl` on `{"zookeeper": "x"}` reports the missing key
/// rather than a type confusion.
pub fn lookup<'a>(root: &'a Value, path: &[&str]) -> Result<&'a Value, LookupError> {
    let mut current = root;
    for (depth, segment) in path.iter().enumerate() {
        current = match current.as_object().and_then(|map| map.get(*segment)) {
            Some(Value::Null) | None => {
                return Err(LookupError::Missing {
                    path: path[..=depth].join("."),
                })
            }
            Some(next) => next,
        };
    }
    Ok(current)
}

/// Look up a string value.
pub fn lookup_str<'a>(root: &'a Value, path: &[&str]) -> Result<&'a str, LookupError> {
    lookup(root, path)?.as_str().ok_or_else(|| LookupError::WrongType {
        path: path.join("."),
        expected: "a string",
    })
}
