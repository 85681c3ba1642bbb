//! Attribute sanitization for the audit journal.
//!
//! User profiles and server configs carry passwords and storage
//! credentials; those are redacted before an entry is written.

use serde_json::{Map, Value};

use crate::attributes::ServiceSpecInput;
use crate::resources::CompressionInput;

/// Keys that should be redacted from audit logs.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "secret",
    "key",
    "token",
    "credential",
    "private_key",
    "auth",
];

/// Maximum length for string values before truncation.
const MAX_STRING_LENGTH: usize = 1024;

/// Keys whose string values are truncated when too long.
const TRUNCATABLE_KEYS: &[&str] = &["content", "config", "body"];

/// Sanitized copy of run attributes.
///
/// Values under keys containing a sensitive word are replaced with
/// `[REDACTED]`; long strings under content-like keys are truncated.
/// Objects and arrays are processed recursively.
pub fn sanitize_params(params: &Value) -> Value {
    sanitize_value(params, false)
}

/// Sanitized attributes of one run: the service input and, when present,
/// the compression snippet input.
pub fn run_params(service: &ServiceSpecInput, compression: Option<&CompressionInput>) -> Value {
    let mut params = Map::new();
    params.insert(
        "service".to_string(),
        serde_json::to_value(service).unwrap_or(Value::Null),
    );
    if let Some(compression) = compression {
        params.insert(
            "compression".to_string(),
            serde_json::to_value(compression).unwrap_or(Value::Null),
        );
    }
    sanitize_params(&Value::Object(params))
}

/// Recursively sanitize a JSON value.
fn sanitize_value(value: &Value, is_truncatable: bool) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = Map::new();
            for (key, val) in map {
                let key_lower = key.to_lowercase();

                let is_sensitive = SENSITIVE_KEYS.iter().any(|&s| key_lower.contains(s));
                let should_truncate = TRUNCATABLE_KEYS.iter().any(|&s| key_lower.contains(s));

                if is_sensitive {
                    sanitized.insert(key.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    sanitized.insert(key.clone(), sanitize_value(val, should_truncate));
                }
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(
            arr.iter()
                .map(|v| sanitize_value(v, is_truncatable))
                .collect(),
        ),
        Value::String(s) if is_truncatable && s.len() > MAX_STRING_LENGTH => {
            Value::String(format!("[TRUNCATED - {} bytes]", s.len()))
        }
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_passwords_redacted() {
        let params = json!({
            "users": {
                "default": {
                    "password": "",
                    "networks": {"ip": "::/0"},
                    "profile": "default"
                },
                "reader": {"password_sha256_hex": "65e84be3"}
            }
        });
        let sanitized = sanitize_params(&params);
        assert_eq!(sanitized["users"]["default"]["password"], "[REDACTED]");
        assert_eq!(sanitized["users"]["default"]["profile"], "default");
        assert_eq!(sanitized["users"]["reader"]["password_sha256_hex"], "[REDACTED]");
    }

    #[test]
    fn test_storage_credentials_redacted() {
        let params = json!({
            "config": {
                "storage_configuration": {
                    "disks": {
                        "s3": {
                            "endpoint": "https://bucket.s3.amazonaws.com/data/",
                            "access_key_id": "AKIA",
                            "secret_access_key": "abc"
                        }
                    }
                }
            }
        });
        let sanitized = sanitize_params(&params);
        let disk = &sanitized["config"]["storage_configuration"]["disks"]["s3"];
        assert_eq!(disk["access_key_id"], "[REDACTED]");
        assert_eq!(disk["secret_access_key"], "[REDACTED]");
        assert_eq!(disk["endpoint"], "https://bucket.s3.amazonaws.com/data/");
    }

    #[test]
    fn test_zookeeper_nodes_preserved() {
        let params = json!({
            "zookeeper_nodes": [{"index": 1, "host": "zk1", "port": 2181}]
        });
        let sanitized = sanitize_params(&params);
        assert_eq!(sanitized, params);
    }

    #[test]
    fn test_truncate_large_config_snippet() {
        let compression = CompressionInput {
            config: "<compression/>".repeat(200),
            service_name: Some("ch".to_string()),
            config_dir: None,
            user: None,
            group: None,
        };
        let service = ServiceSpecInput {
            service_name: Some("ch".to_string()),
            ..Default::default()
        };
        let params = run_params(&service, Some(&compression));
        assert_eq!(params["compression"]["config"], "[TRUNCATED - 2800 bytes]");
        assert_eq!(params["compression"]["service_name"], "ch");
        assert_eq!(params["service"]["service_name"], "ch");
    }

    #[test]
    fn test_run_params_without_compression() {
        let service = ServiceSpecInput {
            users: Some(json!({"default": {"password": "hunter2"}})),
            ..Default::default()
        };
        let params = run_params(&service, None);
        assert!(params.get("compression").is_none());
        assert_eq!(params["service"]["users"]["default"]["password"], "[REDACTED]");
    }

    #[test]
    fn test_small_snippet_not_truncated() {
        let params = json!({"compression": {"config": "<compression/>"}});
        assert_eq!(sanitize_params(&params), params);
    }

    #[test]
    fn test_case_insensitive_sensitive_keys() {
        let params = json!({"PASSWORD": "a", "Secret_Token": "b"});
        let sanitized = sanitize_params(&params);
        assert_eq!(sanitized["PASSWORD"], "[REDACTED]");
        assert_eq!(sanitized["Secret_Token"], "[REDACTED]");
    }
}
