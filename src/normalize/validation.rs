//! Structural validation and typed mapping of outbound/inbound data.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::IntegrationError;

/// One schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    /// JSON pointer into the instance; empty for the root.
    pub path: String,
    pub message: String,
}

/// Validate `data` against a JSON Schema, returning every violation.
///
/// No I/O happens here; an invalid schema is reported as a single violation
/// at the root.
pub fn validate_data(data: Value, schema: &Value) -> Result<Value, Vec<SchemaViolation>> {
    let validator = jsonschema::validator_for(schema).map_err(|e| {
        vec![SchemaViolation {
            path: String::new(),
            message: format!("invalid schema: {}", e),
        }]
    })?;

    let violations: Vec<SchemaViolation> = validator
        .iter_errors(&data)
        .map(|e| SchemaViolation {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if violations.is_empty() {
        Ok(data)
    } else {
        tracing::debug!(violations = violations.len(), "Data failed schema validation");
        Err(violations)
    }
}

/// Deserialize `data` into `T`, reporting a `DataMappingError` naming `target`.
pub fn map_data<T: DeserializeOwned>(data: Value, target: &str) -> Result<T, IntegrationError> {
    T::deserialize(&data).map_err(|e| {
        IntegrationError::data_mapping(format!("cannot map to {}: {}", target, e), data.clone(), target)
    })
}

/// Validate against `schema` then map into `T`.
pub fn validate_and_map<T: DeserializeOwned>(
    data: Value,
    schema: &Value,
    target: &str,
) -> Result<T, IntegrationError> {
    let data = validate_data(data.clone(), schema).map_err(|violations| {
        let summary: Vec<String> = violations
            .iter()
            .map(|v| format!("{}: {}", if v.path.is_empty() { "/" } else { v.path.as_str() }, v.message))
            .collect();
        IntegrationError::data_mapping(summary.join("; "), data, target)
            .with_metadata("violations", violations.len())
    })?;
    map_data(data, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde::Deserialize;
    use serde_json::json;

    fn lead_schema() -> Value {
        json!({
            "type": "object",
            "required": ["email", "name"],
            "properties": {
                "email": {"type": "string"},
                "name": {"type": "string"},
                "score": {"type": "integer", "minimum": 0}
            }
        })
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Lead {
        email: String,
        name: String,
        #[serde(default)]
        score: u32,
    }

    #[test]
    fn test_valid_data_passes_through() {
        let data = json!({"email": "a@b.c", "name": "Ada", "score": 3});
        assert_eq!(validate_data(data.clone(), &lead_schema()), Ok(data));
    }

    #[test]
    fn test_all_violations_reported() {
        let data = json!({"name": 5, "score": -1});
        let violations = validate_data(data, &lead_schema()).unwrap_err();
        assert_eq!(violations.len(), 3);
        assert!(violations.iter().any(|v| v.path == "/score"));
        assert!(violations.iter().any(|v| v.path == "/name"));
    }

    #[test]
    fn test_invalid_schema_is_a_violation() {
        let violations = validate_data(json!({}), &json!({"type": 12})).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.starts_with("invalid schema"));
    }

    #[test]
    fn test_map_data_into_struct() {
        let lead: Lead = map_data(json!({"email": "a@b.c", "name": "Ada"}), "Lead").unwrap();
        assert_eq!(lead.score, 0);

        let err = map_data::<Lead>(json!({"email": 1}), "Lead").unwrap_err();
        match err.kind {
            ErrorKind::DataMapping { source_data, target_schema } => {
                assert_eq!(target_schema, "Lead");
                assert_eq!(source_data, json!({"email": 1}));
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert!(!err.is_retryable);
    }

    #[test]
    fn test_validate_and_map() {
        let lead: Lead = validate_and_map(json!({"email": "a@b.c", "name": "Ada", "score": 9}), &lead_schema(), "Lead")
            .unwrap();
        assert_eq!(lead.score, 9);

        let err = validate_and_map::<Lead>(json!({"email": "a@b.c"}), &lead_schema(), "Lead").unwrap_err();
        assert_eq!(err.metadata.get("violations"), Some(&json!(1)));
    }
}
