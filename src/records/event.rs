use serde_json::{Map, Value};

use super::{ValidationContext, insert_id, non_blank, now_millis};
use crate::SDK_VERSION;
use crate::attachment::{Attachment, append_attachment};
use crate::bulk::{BulkRecord, PendingRecord, RecordKind, estimate_size};
use crate::config::human_size;
use crate::error::RecordError;
use crate::schema::EVENT_SCHEMA;

/// System events that may use the otherwise reserved prefixes.
pub const RESERVED_EVENT_NAMES: &[&str] = &[
    "$identify",
    "$notification_delivered",
    "$notification_dismiss",
    "$notification_clicked",
    "$app_launched",
    "$user_login",
    "$user_logout",
];

fn has_reserved_prefix(name: &str) -> bool {
    name.starts_with('$') || name.to_ascii_lowercase().starts_with("ss_")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    pub distinct_id: String,
    pub event_name: String,
    pub properties: Map<String, Value>,
    pub idempotency_key: Option<String>,
    pub tenant_id: Option<String>,
}

impl Event {
    pub fn new(distinct_id: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            distinct_id: distinct_id.into(),
            event_name: event_name.into(),
            ..Self::default()
        }
    }

    /// Parse `{"distinct_id", "event", "properties", "$idempotency_key", "tenant_id"}`.
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        let Value::Object(mut map) = value else {
            return Err(RecordError::new("event must be a dictionary"));
        };
        let text = |value: Option<Value>| value.and_then(|v| v.as_str().map(str::to_string));

        let properties = match map.remove("properties") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(properties)) => properties,
            Some(other) => {
                return Err(RecordError::new(format!(
                    "properties must be a dictionary, got {other}"
                )));
            }
        };
        Ok(Self {
            distinct_id: text(map.remove("distinct_id")).unwrap_or_default(),
            event_name: text(map.remove("event")).unwrap_or_default(),
            properties,
            idempotency_key: text(map.remove("$idempotency_key")),
            tenant_id: text(map.remove("tenant_id")),
        })
    }

    pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn add_attachment(&mut self, attachment: &Attachment) -> Result<(), RecordError> {
        append_attachment(&mut self.properties, "properties", attachment)
    }

    fn check_identity(&self) -> Result<(&str, &str), RecordError> {
        let distinct_id = self.distinct_id.trim();
        if distinct_id.is_empty() {
            return Err(RecordError::new("distinct_id missing"));
        }
        let event_name = self.event_name.trim();
        if event_name.is_empty() {
            return Err(RecordError::new("event_name missing"));
        }
        if has_reserved_prefix(event_name)
            && !RESERVED_EVENT_NAMES.iter().any(|name| *name == event_name)
        {
            return Err(RecordError::new(format!(
                "event name '{event_name}' is reserved: names starting with [$, ss_] are reserved"
            )));
        }
        Ok((distinct_id, event_name))
    }

    fn canonical_body(&self, workspace_key: &str) -> Result<Map<String, Value>, RecordError> {
        let (distinct_id, event_name) = self.check_identity()?;

        let mut properties = self.properties.clone();
        properties.insert("$ss_sdk_version".into(), Value::from(SDK_VERSION));

        let mut body = Map::new();
        body.insert("$insert_id".into(), insert_id());
        body.insert("$time".into(), now_millis());
        body.insert("event".into(), Value::from(event_name));
        body.insert("env".into(), Value::from(workspace_key));
        body.insert("distinct_id".into(), Value::from(distinct_id));
        body.insert("properties".into(), Value::Object(properties));
        if let Some(key) = non_blank(&self.idempotency_key) {
            body.insert("$idempotency_key".into(), Value::from(key));
        }
        if let Some(tenant_id) = non_blank(&self.tenant_id) {
            body.insert("tenant_id".into(), Value::from(tenant_id));
        }
        Ok(body)
    }
}

impl BulkRecord for Event {
    const KIND: RecordKind = RecordKind::Event;

    fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        is_part_of_bulk: bool,
        _warnings: &mut Vec<String>,
    ) -> Result<PendingRecord, RecordError> {
        let body = self.canonical_body(ctx.workspace_key)?;
        ctx.schemas
            .validate(EVENT_SCHEMA, &Value::Object(body.clone()))?;

        let apparent_size = estimate_size(&body, Self::KIND, is_part_of_bulk, ctx.limits)?;
        if apparent_size > ctx.limits.max_chunk_size_bytes {
            return Err(RecordError::new(format!(
                "event too big - {apparent_size} Bytes, must not cross {}",
                human_size(ctx.limits.max_chunk_size_bytes)
            )));
        }
        Ok(PendingRecord {
            body,
            apparent_size,
        })
    }

    fn raw_json(&self) -> Value {
        let mut raw = Map::new();
        raw.insert("distinct_id".into(), Value::from(self.distinct_id.as_str()));
        raw.insert("event".into(), Value::from(self.event_name.as_str()));
        raw.insert("properties".into(), Value::Object(self.properties.clone()));
        if let Some(key) = &self.idempotency_key {
            raw.insert("$idempotency_key".into(), Value::from(key.as_str()));
        }
        if let Some(tenant_id) = &self.tenant_id {
            raw.insert("tenant_id".into(), Value::from(tenant_id.as_str()));
        }
        Value::Object(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BulkLimits;
    use crate::schema::SchemaCache;

    fn validate(event: &Event) -> Result<PendingRecord, RecordError> {
        let schemas = SchemaCache::builtin().unwrap();
        let limits = BulkLimits::default();
        let ctx = ValidationContext {
            workspace_key: "ws_key",
            schemas: &schemas,
            limits: &limits,
        };
        event.validate(&ctx, true, &mut Vec::new())
    }

    #[test]
    fn canonical_body_carries_generated_fields() {
        let event = Event::new(" user-1 ", "order_placed")
            .with_property("amount", 42)
            .with_tenant_id("acme");
        let record = validate(&event).unwrap();

        assert_eq!(record.body["distinct_id"], "user-1");
        assert_eq!(record.body["event"], "order_placed");
        assert_eq!(record.body["env"], "ws_key");
        assert_eq!(record.body["tenant_id"], "acme");
        assert_eq!(record.body["properties"]["amount"], 42);
        assert_eq!(record.body["properties"]["$ss_sdk_version"], SDK_VERSION);
        assert!(record.body["$insert_id"].as_str().is_some());
        assert!(record.body["$time"].as_i64().is_some());
        assert_eq!(record.apparent_size, serde_json::to_vec(&record.body).unwrap().len());
    }

    #[test]
    fn requires_distinct_id_and_name() {
        let err = validate(&Event::new("  ", "signup")).unwrap_err();
        assert!(err.message().contains("distinct_id"));

        let err = validate(&Event::new("user-1", "")).unwrap_err();
        assert!(err.message().contains("event_name"));
    }

    #[test]
    fn reserved_prefixes_are_rejected_unless_allowed() {
        for name in ["$custom", "ss_custom", "SS_custom"] {
            let err = validate(&Event::new("user-1", name)).unwrap_err();
            assert!(err.message().contains("reserved"), "{name}");
        }
        assert!(validate(&Event::new("user-1", "$app_launched")).is_ok());
    }

    #[test]
    fn parses_event_lines() {
        let event = Event::from_value(serde_json::json!({
            "distinct_id": "u1",
            "event": "signup",
            "properties": { "plan": "pro" },
            "tenant_id": "acme"
        }))
        .unwrap();
        assert_eq!(event.distinct_id, "u1");
        assert_eq!(event.event_name, "signup");
        assert_eq!(event.properties["plan"], "pro");
        assert_eq!(event.tenant_id.as_deref(), Some("acme"));

        assert!(Event::from_value(serde_json::json!({ "properties": 3 })).is_err());
        assert!(Event::from_value(serde_json::json!([])).is_err());
    }

    #[test]
    fn attachments_land_in_properties() {
        let mut event = Event::new("user-1", "invoice").with_property("n", 1);
        event
            .add_attachment(&Attachment::from_url("https://x/inv.pdf", None, false))
            .unwrap();
        assert_eq!(event.properties["n"], 1);
        assert_eq!(
            event.properties["$attachments"][0]["url"],
            "https://x/inv.pdf"
        );
    }
}
