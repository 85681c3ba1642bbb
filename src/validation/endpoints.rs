//! Coordination-service endpoint validation.
//!
//! Checks the raw `zookeeper_nodes` records before they are rendered into the
//! include file. The first violation wins; errors quote the offending record.

use serde::Serialize;
use serde_json::Value;

use crate::error::{ConvergeError, ValidationErrorKind};

/// One validated coordination-service node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub index: Option<i64>,
    pub host: String,
    pub port: u16,
}

/// Validate raw endpoint records and return them typed and ordered.
///
/// # Rules
///
/// - The list must not be empty
/// - Each element must be a record (mapping), not a scalar or list
/// - Each record needs a non-empty string `host`
/// - Each record needs an integer `port` (numeric strings and floats are
///   rejected) within 1..=65535
/// - `index`, when present, must be an integer
///
/// # Ordering
///
/// Records carrying an `index` are sorted by it (stable for equal indexes)
/// into the positions occupied by indexed records. Records without an index
/// keep their position.
///
/// # Example
///
/// ```
/// use clickhouse_converge::validation::validate_endpoints;
/// use serde_json::json;
///
/// assert!(validate_endpoints(&[json!({"host": "localhost", "port": 2181})]).is_ok());
/// assert!(validate_endpoints(&[json!({"host": "localhost", "port": "2181"})]).is_err());
/// assert!(validate_endpoints(&[]).is_err());
/// ```
pub fn validate_endpoints(nodes: &[Value]) -> Result<Vec<Endpoint>, ConvergeError> {
    if nodes.is_empty() {
        return Err(invalid(ValidationErrorKind::EmptyEndpoints));
    }

    let endpoints = nodes
        .iter()
        .map(validate_endpoint)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(order_by_index(endpoints))
}

fn validate_endpoint(node: &Value) -> Result<Endpoint, ConvergeError> {
    let entry = || node.to_string();

    let record = node.as_object().ok_or_else(|| {
        invalid(ValidationErrorKind::EndpointNotRecord { entry: entry() })
    })?;

    let host = match record.get("host") {
        Some(Value::String(host)) if !host.trim().is_empty() => host.clone(),
        _ => return Err(invalid(ValidationErrorKind::MissingHost { entry: entry() })),
    };

    let port = match record.get("port") {
        None | Some(Value::Null) => {
            return Err(invalid(ValidationErrorKind::MissingPort { entry: entry() }))
        }
        Some(value) if !is_integer(value) => {
            return Err(invalid(ValidationErrorKind::PortNotInteger { entry: entry() }))
        }
        Some(value) => value.as_i64(),
    };
    let port = port
        .and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p != 0)
        .ok_or_else(|| invalid(ValidationErrorKind::PortOutOfRange { entry: entry() }))?;

    let index = match record.get("index") {
        None | Some(Value::Null) => None,
        Some(value) if is_integer(value) => value.as_i64(),
        Some(_) => {
            return Err(invalid(ValidationErrorKind::IndexNotInteger { entry: entry() }))
        }
    };

    Ok(Endpoint { index, host, port })
}

/// JSON integers only: `2181` passes, `"2181"` and `2181.0` do not.
fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        _ => false,
    }
}

fn order_by_index(endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    let slots: Vec<usize> = endpoints
        .iter()
        .enumerate()
        .filter(|(_, e)| e.index.is_some())
        .map(|(i, _)| i)
        .collect();

    let mut indexed: Vec<Endpoint> = slots.iter().map(|&i| endpoints[i].clone()).collect();
    // sort_by_key is stable
    indexed.sort_by_key(|e| e.index);

    let mut ordered = endpoints;
    for (slot, endpoint) in slots.into_iter().zip(indexed) {
        ordered[slot] = endpoint;
    }
    ordered
}

fn invalid(kind: ValidationErrorKind) -> ConvergeError {
    ConvergeError::Validation { kind }
}
