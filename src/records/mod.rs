//! Domain objects accepted by single and bulk calls, and their validators.

pub mod event;
pub mod user_edit;
pub mod workflow;

pub use event::Event;
pub use user_edit::{IdentityOp, UserEdit};
pub use workflow::WorkflowTrigger;

use crate::config::BulkLimits;
use crate::schema::SchemaCache;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

/// Everything a validator needs from the client.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub workspace_key: &'a str,
    pub schemas: &'a SchemaCache,
    pub limits: &'a BulkLimits,
}

pub(crate) fn insert_id() -> Value {
    Value::String(Uuid::new_v4().to_string())
}

pub(crate) fn now_millis() -> Value {
    Value::from(Utc::now().timestamp_millis())
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
