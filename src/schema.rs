//! Compiled JSON schemas for request bodies.
//!
//! The cache is built once when a [`Client`](crate::Client) is constructed and is
//! read-only afterwards, so validators share it by reference without locking.

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub const WORKFLOW_SCHEMA: &str = "workflow";
pub const EVENT_SCHEMA: &str = "event";

const BUILTIN_SCHEMAS: &[(&str, &str)] = &[
    (WORKFLOW_SCHEMA, include_str!("../schemas/workflow.json")),
    (EVENT_SCHEMA, include_str!("../schemas/event.json")),
];

#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("invalid schema '{name}': {reason}")]
    InvalidSchema { name: String, reason: String },
    #[error("schema '{name}' is not registered")]
    UnknownSchema { name: String },
    /// One entry per violation, rendered one per line.
    #[error("{}", violations.join("\n"))]
    Violations { violations: Vec<String> },
}

pub struct SchemaCache {
    schemas: HashMap<String, JSONSchema>,
}

impl fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.schemas.keys().collect();
        names.sort();
        f.debug_struct("SchemaCache").field("schemas", &names).finish()
    }
}

impl SchemaCache {
    /// Compile the built-in workflow and event schemas.
    pub fn builtin() -> Result<Self, SchemaError> {
        let mut schemas = HashMap::with_capacity(BUILTIN_SCHEMAS.len());
        for (name, source) in BUILTIN_SCHEMAS {
            let document: Value =
                serde_json::from_str(source).map_err(|err| SchemaError::InvalidSchema {
                    name: (*name).to_string(),
                    reason: err.to_string(),
                })?;
            schemas.insert((*name).to_string(), compile(name, &document)?);
        }
        Ok(Self { schemas })
    }

    /// Build a cache from caller supplied schema documents.
    pub fn from_documents<'a>(
        documents: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<Self, SchemaError> {
        let mut schemas = HashMap::new();
        for (name, document) in documents {
            schemas.insert(name.to_string(), compile(name, &document)?);
        }
        Ok(Self { schemas })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn validate(&self, name: &str, instance: &Value) -> Result<(), SchemaError> {
        let schema = self
            .schemas
            .get(name)
            .ok_or_else(|| SchemaError::UnknownSchema {
                name: name.to_string(),
            })?;

        if let Err(errors) = schema.validate(instance) {
            let violations = errors
                .map(|err| {
                    let path = err.instance_path.to_string();
                    if path.is_empty() {
                        err.to_string()
                    } else {
                        format!("{path}: {err}")
                    }
                })
                .collect();
            return Err(SchemaError::Violations { violations });
        }
        Ok(())
    }
}

fn compile(name: &str, document: &Value) -> Result<JSONSchema, SchemaError> {
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(document)
        .map_err(|err| SchemaError::InvalidSchema {
            name: name.to_string(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_schemas_compile() {
        let cache = SchemaCache::builtin().expect("builtin schemas");
        assert!(cache.contains(WORKFLOW_SCHEMA));
        assert!(cache.contains(EVENT_SCHEMA));
    }

    #[test]
    fn violations_are_reported_one_per_line() {
        let cache = SchemaCache::builtin().expect("builtin schemas");
        let err = cache
            .validate(EVENT_SCHEMA, &json!({ "event": 1, "distinct_id": 2 }))
            .unwrap_err();
        match &err {
            SchemaError::Violations { violations } => {
                assert!(violations.len() >= 2);
                assert_eq!(err.to_string().lines().count(), violations.len());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_schema_is_an_error() {
        let cache = SchemaCache::from_documents(Vec::<(&str, Value)>::new()).unwrap();
        assert!(matches!(
            cache.validate("missing", &json!({})),
            Err(SchemaError::UnknownSchema { .. })
        ));
    }

    #[test]
    fn custom_documents_are_compiled() {
        let cache = SchemaCache::from_documents([(
            "tiny",
            json!({ "type": "object", "required": ["a"] }),
        )])
        .unwrap();
        assert!(cache.validate("tiny", &json!({ "a": 1 })).is_ok());
        assert!(cache.validate("tiny", &json!({})).is_err());
    }
}
