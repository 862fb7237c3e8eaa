//! Parameter schemas: the JSON Schema each tool declares for its arguments.
//!
//! Schemas are compiled once, at discovery, with the `jsonschema` crate.
//! Tools must describe an object:
//!
//! ```json
//! {
//!   "type": "object",
//!   "properties": { "city": { "type": "string", "enum": ["Paris", "Tokyo"] } },
//!   "required": ["city"],
//!   "additionalProperties": false
//! }
//! ```
//!
//! Both parsing and validation collect every problem instead of stopping at
//! the first one.

use std::fmt;
use std::sync::Arc;

use jsonschema::error::ValidationErrorKind;
use jsonschema::{JSONSchema, ValidationError};
use serde::Serialize;
use serde_json::Value;

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A compiled parameter schema.
#[derive(Clone)]
pub struct ParameterSchema {
    raw: Value,
    compiled: Arc<JSONSchema>,
    properties: Vec<String>,
    required: Vec<String>,
}

/// Problems found while parsing a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid parameter schema: {}", .problems.join("; "))]
pub struct SchemaError {
    pub problems: Vec<String>,
}

/// One way a set of arguments fails its schema.
///
/// `field` is the JSON pointer of the offending value without its leading
/// slash, so a top-level property reads as its plain name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum SchemaViolation {
    #[error("arguments must be a JSON object, got {found}")]
    NotAnObject { found: String },

    #[error("missing required field '{field}'")]
    MissingRequired { field: String },

    #[error("field '{field}': {message}")]
    TypeMismatch { field: String, message: String },

    #[error("field '{field}' is not one of the allowed values")]
    NotInEnum { field: String },

    #[error("unexpected field '{field}'")]
    UnexpectedField { field: String },

    #[error("field '{field}': {message}")]
    Other { field: String, message: String },
}

impl SchemaViolation {
    fn from_error(error: ValidationError<'_>) -> Vec<Self> {
        let field = error.instance_path.to_string().trim_start_matches('/').to_string();
        match &error.kind {
            ValidationErrorKind::Type { .. } if field.is_empty() => vec![Self::NotAnObject {
                found: json_type_name(&error.instance).into(),
            }],
            ValidationErrorKind::Type { .. } => vec![Self::TypeMismatch {
                field,
                message: error.to_string(),
            }],
            ValidationErrorKind::Required { property } => vec![Self::MissingRequired {
                field: property.as_str().map_or_else(|| property.to_string(), String::from),
            }],
            ValidationErrorKind::Enum { .. } => vec![Self::NotInEnum { field }],
            ValidationErrorKind::AdditionalProperties { unexpected } => unexpected
                .iter()
                .map(|name| Self::UnexpectedField { field: name.clone() })
                .collect(),
            _ => vec![Self::Other {
                field,
                message: error.to_string(),
            }],
        }
    }
}

impl ParameterSchema {
    /// Compile and check a schema value.
    ///
    /// Besides anything `jsonschema` rejects, the root must describe an
    /// object and every required name must be a declared property.
    pub fn parse(raw: &Value) -> Result<Self, SchemaError> {
        let Some(root) = raw.as_object() else {
            return Err(SchemaError {
                problems: vec![format!("schema must be an object, got {}", json_type_name(raw))],
            });
        };
        let mut problems = Vec::new();

        match root.get("type").and_then(Value::as_str) {
            Some("object") => {}
            Some(other) => problems.push(format!("root type must be \"object\", got \"{other}\"")),
            None => problems.push("root must declare \"type\": \"object\"".into()),
        }

        let properties: Vec<String> = match root.get("properties") {
            Some(Value::Object(props)) => {
                for (name, prop) in props {
                    if !prop.is_object() {
                        problems.push(format!("properties.{name}: must be an object"));
                    }
                }
                props.keys().cloned().collect()
            }
            _ => Vec::new(),
        };

        let mut required = Vec::new();
        if let Some(Value::Array(names)) = root.get("required") {
            for name in names.iter().filter_map(Value::as_str) {
                if properties.iter().any(|p| p == name) {
                    required.push(name.to_string());
                } else {
                    problems.push(format!("required field '{name}' is not declared in properties"));
                }
            }
        }

        let compiled = match JSONSchema::compile(raw) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                let at = e.schema_path.to_string();
                problems.push(if at.is_empty() { e.to_string() } else { format!("{at}: {e}") });
                None
            }
        };

        match compiled {
            Some(compiled) if problems.is_empty() => Ok(Self {
                raw: raw.clone(),
                compiled: Arc::new(compiled),
                properties,
                required,
            }),
            _ => Err(SchemaError { problems }),
        }
    }

    /// Check arguments against this schema, reporting every violation.
    pub fn validate(&self, args: &Value) -> Result<(), Vec<SchemaViolation>> {
        match self.compiled.validate(args) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors.flat_map(SchemaViolation::from_error).collect()),
        }
    }

    /// The schema exactly as the tool declared it (sent to the model).
    pub fn as_json(&self) -> &Value {
        &self.raw
    }

    /// Declared property names.
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }
}

impl fmt::Debug for ParameterSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSchema")
            .field("properties", &self.properties)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather_schema() -> ParameterSchema {
        ParameterSchema::parse(&json!({
            "type": "object",
            "properties": {
                "city": { "type": "string" },
                "units": { "type": "string", "enum": ["metric", "imperial"] },
                "days": { "type": "integer" },
                "tags": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["city"],
            "additionalProperties": false
        }))
        .unwrap()
    }

    #[test]
    fn parse_accepts_empty_object_schema() {
        let schema = ParameterSchema::parse(&json!({"type": "object"})).unwrap();
        assert!(schema.properties().is_empty());
        assert!(schema.validate(&json!({})).is_ok());
    }

    #[test]
    fn parse_reports_every_problem() {
        let err = ParameterSchema::parse(&json!({
            "type": "array",
            "properties": {
                "a": { "type": "strnig" },
                "b": "not an object"
            },
            "required": ["a", "missing"]
        }))
        .unwrap_err();
        // root type, property b, undeclared required name, and the compiler's complaint
        assert!(err.problems.len() >= 4, "{:?}", err.problems);
        assert!(err.to_string().contains("missing"));
        assert!(err.to_string().contains("properties.b"));
    }

    #[test]
    fn unknown_type_name_fails_compilation() {
        let err = ParameterSchema::parse(&json!({
            "type": "object",
            "properties": { "a": { "type": "strnig" } }
        }))
        .unwrap_err();
        assert_eq!(err.problems.len(), 1, "{:?}", err.problems);
    }

    #[test]
    fn parse_rejects_non_object_root() {
        assert!(ParameterSchema::parse(&json!("string")).is_err());
    }

    #[test]
    fn valid_arguments_pass() {
        let schema = weather_schema();
        assert!(
            schema
                .validate(&json!({"city": "Paris", "units": "metric", "days": 3, "tags": ["a"]}))
                .is_ok()
        );
        assert_eq!(schema.required(), ["city"]);
    }

    #[test]
    fn fractional_integer_rejected() {
        let schema = weather_schema();
        assert!(schema.validate(&json!({"city": "Paris", "days": 3.5})).is_err());
    }

    #[test]
    fn validation_collects_all_violations() {
        let schema = weather_schema();
        let violations = schema
            .validate(&json!({"units": "kelvin", "days": "three", "extra": true, "tags": ["a", 1]}))
            .unwrap_err();
        assert!(violations.contains(&SchemaViolation::MissingRequired {
            field: "city".into()
        }));
        assert!(violations.contains(&SchemaViolation::NotInEnum {
            field: "units".into()
        }));
        assert!(violations.contains(&SchemaViolation::UnexpectedField {
            field: "extra".into()
        }));
        assert!(violations.iter().any(|v| matches!(
            v,
            SchemaViolation::TypeMismatch { field, .. } if field == "days"
        )));
        assert!(violations.iter().any(|v| matches!(
            v,
            SchemaViolation::TypeMismatch { field, .. } if field == "tags/1"
        )));
    }

    #[test]
    fn non_object_arguments_rejected() {
        let schema = weather_schema();
        let violations = schema.validate(&json!(["Paris"])).unwrap_err();
        assert_eq!(
            violations,
            vec![SchemaViolation::NotAnObject {
                found: "array".into()
            }]
        );
    }
}
