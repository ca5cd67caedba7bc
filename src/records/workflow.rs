use serde_json::{Map, Value};

use super::{ValidationContext, non_blank};
use crate::attachment::{Attachment, push_attachment};
use crate::bulk::{BulkRecord, PendingRecord, RecordKind, estimate_size};
use crate::config::human_size;
use crate::error::RecordError;
use crate::schema::WORKFLOW_SCHEMA;

/// A request to run a workflow for one or more recipients.
///
/// `body` carries the provider fields (`name`, `template`,
/// `notification_category`, `users`, `data`, ...) verbatim; keys the client
/// manages are kept as separate fields and injected during validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowTrigger {
    pub body: Map<String, Value>,
    pub idempotency_key: Option<String>,
    pub tenant_id: Option<String>,
    pub cancellation_key: Option<String>,
}

impl WorkflowTrigger {
    pub fn new(body: Map<String, Value>) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    /// Build from an arbitrary JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Object(body) => Ok(Self::new(body)),
            other => Err(RecordError::new(format!(
                "workflow body must be a dictionary, got {other}"
            ))),
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_cancellation_key(mut self, key: impl Into<String>) -> Self {
        self.cancellation_key = Some(key.into());
        self
    }

    pub fn add_attachment(&mut self, attachment: &Attachment) -> Result<(), RecordError> {
        push_attachment(&mut self.body, "data", attachment)
    }

    fn canonical_body(&self) -> Result<Map<String, Value>, RecordError> {
        let mut body = self.body.clone();
        let has_data = match body.get("data") {
            None | Some(Value::Null) => false,
            Some(Value::Object(_)) => true,
            Some(_) => return Err(RecordError::new("data must be a dictionary")),
        };
        if !has_data {
            body.insert("data".into(), Value::Object(Map::new()));
        }

        if let Some(key) = non_blank(&self.idempotency_key) {
            body.insert("$idempotency_key".into(), Value::from(key));
        }
        if let Some(tenant_id) = non_blank(&self.tenant_id) {
            body.insert("tenant_id".into(), Value::from(tenant_id));
        }
        if let Some(key) = non_blank(&self.cancellation_key) {
            body.insert("cancellation_key".into(), Value::from(key));
        }
        Ok(body)
    }
}

impl BulkRecord for WorkflowTrigger {
    const KIND: RecordKind = RecordKind::Workflow;

    fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        is_part_of_bulk: bool,
        _warnings: &mut Vec<String>,
    ) -> Result<PendingRecord, RecordError> {
        let body = self.canonical_body()?;
        ctx.schemas
            .validate(WORKFLOW_SCHEMA, &Value::Object(body.clone()))?;

        let apparent_size = estimate_size(&body, Self::KIND, is_part_of_bulk, ctx.limits)?;
        if apparent_size > ctx.limits.max_chunk_size_bytes {
            return Err(RecordError::new(format!(
                "workflow body too big - {apparent_size} Bytes, must not cross {}",
                human_size(ctx.limits.max_chunk_size_bytes)
            )));
        }
        Ok(PendingRecord {
            body,
            apparent_size,
        })
    }

    fn raw_json(&self) -> Value {
        self.canonical_body()
            .map(Value::Object)
            .unwrap_or_else(|_| Value::Object(self.body.clone()))
    }
}
