//! Identity edits: profile and channel mutations for a single user.
//!
//! Operations are recorded in call order and grouped under their operator key
//! (`$set`, `$append`, ...) when the canonical body is built. Helpers that
//! reject an input record a warning and skip the operation instead of failing
//! the whole edit.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use super::{ValidationContext, insert_id, non_blank, now_millis};
use crate::bulk::{BulkRecord, PendingRecord, RecordKind, json_size};
use crate::config::human_size;
use crate::error::RecordError;

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
static MOBILE_REGEX: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid email regex")
    })
}

fn mobile_regex() -> &'static Regex {
    MOBILE_REGEX.get_or_init(|| Regex::new(r"^\+[0-9]{6,15}$").expect("Invalid mobile regex"))
}

const EMAIL: &str = "$email";
const SMS: &str = "$sms";
const WHATSAPP: &str = "$whatsapp";
const ANDROIDPUSH: &str = "$androidpush";
const IOSPUSH: &str = "$iospush";
const WEBPUSH: &str = "$webpush";
const SLACK: &str = "$slack";
const PUSH_VENDOR: &str = "$pushvendor";

#[derive(Debug, Clone, PartialEq)]
pub enum IdentityOp {
    Set { key: String, value: Value },
    SetOnce { key: String, value: Value },
    /// Numeric increment (`$add`).
    Increment { key: String, value: Value },
    Append { key: String, value: Value },
    Remove { key: String, value: Value },
    Unset { key: String },
    /// Top-level provider field the client does not model.
    Custom { key: String, value: Value },
}

impl IdentityOp {
    pub fn operator(&self) -> Option<&'static str> {
        match self {
            IdentityOp::Set { .. } => Some("$set"),
            IdentityOp::SetOnce { .. } => Some("$set_once"),
            IdentityOp::Increment { .. } => Some("$add"),
            IdentityOp::Append { .. } => Some("$append"),
            IdentityOp::Remove { .. } => Some("$remove"),
            IdentityOp::Unset { .. } => Some("$unset"),
            IdentityOp::Custom { .. } => None,
        }
    }
}

/// Keys the client writes into every canonical body itself.
const MANAGED_KEYS: &[&str] = &["distinct_id", "env", "$insert_id", "$time", "$idempotency_key"];

const GROUP_OPERATORS: &[&str] = &["$set", "$set_once", "$add", "$append", "$remove"];

/// Typed op for one `field` of a grouped operator such as `$set`.
fn grouped_op(operator: &str, key: String, value: Value) -> Option<IdentityOp> {
    match operator {
        "$set" => Some(IdentityOp::Set { key, value }),
        "$set_once" => Some(IdentityOp::SetOnce { key, value }),
        "$add" => Some(IdentityOp::Increment { key, value }),
        "$append" => Some(IdentityOp::Append { key, value }),
        "$remove" => Some(IdentityOp::Remove { key, value }),
        _ => None,
    }
}

fn is_reserved_key(key: &str) -> bool {
    key.starts_with('$') || key.to_ascii_lowercase().starts_with("ss_")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserEdit {
    pub distinct_id: String,
    pub idempotency_key: Option<String>,
    operations: Vec<IdentityOp>,
    warnings: Vec<String>,
}

impl UserEdit {
    pub fn new(distinct_id: impl Into<String>) -> Self {
        Self {
            distinct_id: distinct_id.into(),
            ..Self::default()
        }
    }

    /// Parse a provider-shaped edit such as
    /// `{"distinct_id": "u1", "$set": {"plan": "pro"}, "$unset": ["legacy"]}`.
    ///
    /// Operator payloads are taken verbatim; keys the client generates itself
    /// (`$insert_id`, `$time`, `env`) are ignored.
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        let Value::Object(map) = value else {
            return Err(RecordError::new("user edit must be a dictionary"));
        };

        let mut edit = UserEdit::default();
        for (key, value) in map {
            match key.as_str() {
                "distinct_id" => {
                    edit.distinct_id = value.as_str().unwrap_or_default().to_string();
                }
                "$idempotency_key" => {
                    edit.idempotency_key = value.as_str().map(str::to_string);
                }
                "$insert_id" | "$time" | "env" => {}
                "$unset" => match value {
                    Value::Array(keys) => {
                        for key in keys {
                            if let Value::String(key) = key {
                                edit.operations.push(IdentityOp::Unset { key });
                            }
                        }
                    }
                    Value::String(key) => edit.operations.push(IdentityOp::Unset { key }),
                    other => {
                        return Err(RecordError::new(format!(
                            "$unset must be a list of keys, got {other}"
                        )));
                    }
                },
                "$set" | "$set_once" | "$add" | "$append" | "$remove" => {
                    let Value::Object(group) = value else {
                        return Err(RecordError::new(format!("{key} must be a dictionary")));
                    };
                    edit.operations.extend(
                        group
                            .into_iter()
                            .filter_map(|(field, value)| grouped_op(&key, field, value)),
                    );
                }
                _ => edit.operations.push(IdentityOp::Custom { key, value }),
            }
        }
        Ok(edit)
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn operations(&self) -> &[IdentityOp] {
        &self.operations
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn warn(&mut self, caller: &str, message: impl AsRef<str>) {
        self.warnings
            .push(format!("[{caller}] {}", message.as_ref()));
    }

    /// `None` when `key` may not be set by callers.
    fn user_key(&mut self, caller: &str, key: impl Into<String>) -> Option<String> {
        let key: String = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            self.warn(caller, "key cannot be empty");
            return None;
        }
        if is_reserved_key(trimmed) {
            self.warn(caller, format!("key '{trimmed}' starts with reserved prefix [$, ss_]"));
            return None;
        }
        Some(trimmed.to_string())
    }

    /// Record an operation without the reserved-prefix checks of the helpers.
    ///
    /// A `Custom` op named after an operator (`$set`, `$unset`, ...) is split
    /// into typed ops so it merges with the existing group. One naming a key the
    /// client manages (`distinct_id`, `env`, ...) is skipped with a warning.
    pub fn push_op(&mut self, op: IdentityOp) -> &mut Self {
        match op {
            IdentityOp::Custom { key, value } => self.push_custom(key, value),
            op => self.operations.push(op),
        }
        self
    }

    fn push_custom(&mut self, key: String, value: Value) {
        if MANAGED_KEYS.iter().any(|managed| *managed == key) {
            self.warn("push_op", format!("key '{key}' is managed by the client"));
            return;
        }

        if key == "$unset" {
            let fields = match value {
                Value::String(field) => vec![Value::String(field)],
                Value::Array(fields) => fields,
                other => {
                    self.warn("push_op", format!("$unset must be a list of keys, got {other}"));
                    return;
                }
            };
            for field in fields {
                match field {
                    Value::String(field) => self.operations.push(IdentityOp::Unset { key: field }),
                    other => {
                        self.warn("push_op", format!("$unset key must be a string, got {other}"));
                    }
                }
            }
        } else if GROUP_OPERATORS.iter().any(|operator| *operator == key) {
            match value {
                Value::Object(group) => self.operations.extend(
                    group
                        .into_iter()
                        .filter_map(|(field, value)| grouped_op(&key, field, value)),
                ),
                other => {
                    self.warn("push_op", format!("{key} must be a dictionary, got {other}"));
                }
            }
        } else {
            self.operations.push(IdentityOp::Custom { key, value });
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        if let Some(key) = self.user_key("set", key) {
            self.operations.push(IdentityOp::Set {
                key,
                value: value.into(),
            });
        }
        self
    }

    pub fn set_once(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        if let Some(key) = self.user_key("set_once", key) {
            self.operations.push(IdentityOp::SetOnce {
                key,
                value: value.into(),
            });
        }
        self
    }

    pub fn increment(&mut self, key: impl Into<String>, by: impl Into<Value>) -> &mut Self {
        let by = by.into();
        if !by.is_number() {
            self.warn("increment", format!("value must be a number, got {by}"));
            return self;
        }
        if let Some(key) = self.user_key("increment", key) {
            self.operations
                .push(IdentityOp::Increment { key, value: by });
        }
        self
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        if let Some(key) = self.user_key("append", key) {
            self.operations.push(IdentityOp::Append {
                key,
                value: value.into(),
            });
        }
        self
    }

    pub fn remove(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        if let Some(key) = self.user_key("remove", key) {
            self.operations.push(IdentityOp::Remove {
                key,
                value: value.into(),
            });
        }
        self
    }

    /// Channel keys such as `$email` are allowed here.
    pub fn unset(&mut self, key: impl Into<String>) -> &mut Self {
        let key: String = key.into();
        let key = key.trim();
        if key.is_empty() {
            self.warn("unset", "key cannot be empty");
        } else {
            self.operations.push(IdentityOp::Unset {
                key: key.to_string(),
            });
        }
        self
    }

    fn channel(&mut self, remove: bool, key: &str, value: Value) {
        let key = key.to_string();
        self.operations.push(if remove {
            IdentityOp::Remove { key, value }
        } else {
            IdentityOp::Append { key, value }
        });
    }

    fn checked_email(&mut self, caller: &str, email: &str) -> Option<String> {
        let email = email.trim().to_lowercase();
        if email_regex().is_match(&email) {
            Some(email)
        } else {
            self.warn(caller, format!("invalid email '{email}'"));
            None
        }
    }

    fn checked_mobile(&mut self, caller: &str, mobile: &str) -> Option<String> {
        let mobile: String = mobile
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();
        if mobile_regex().is_match(&mobile) {
            Some(mobile)
        } else {
            self.warn(
                caller,
                format!("invalid mobile number '{mobile}', must be in E.164 format"),
            );
            None
        }
    }

    fn checked_token(&mut self, caller: &str, token: &str) -> Option<String> {
        let token = token.trim();
        if token.is_empty() {
            self.warn(caller, "push token cannot be empty");
            None
        } else {
            Some(token.to_string())
        }
    }

    fn checked_object(&mut self, caller: &str, value: Value) -> Option<Value> {
        if matches!(&value, Value::Object(map) if !map.is_empty()) {
            Some(value)
        } else {
            self.warn(
                caller,
                format!("value must be a non-empty dictionary, got {value}"),
            );
            None
        }
    }

    pub fn add_email(&mut self, email: &str) -> &mut Self {
        if let Some(email) = self.checked_email("add_email", email) {
            self.channel(false, EMAIL, Value::from(email));
        }
        self
    }

    pub fn remove_email(&mut self, email: &str) -> &mut Self {
        if let Some(email) = self.checked_email("remove_email", email) {
            self.channel(true, EMAIL, Value::from(email));
        }
        self
    }

    pub fn add_sms(&mut self, mobile: &str) -> &mut Self {
        if let Some(mobile) = self.checked_mobile("add_sms", mobile) {
            self.channel(false, SMS, Value::from(mobile));
        }
        self
    }

    pub fn remove_sms(&mut self, mobile: &str) -> &mut Self {
        if let Some(mobile) = self.checked_mobile("remove_sms", mobile) {
            self.channel(true, SMS, Value::from(mobile));
        }
        self
    }

    pub fn add_whatsapp(&mut self, mobile: &str) -> &mut Self {
        if let Some(mobile) = self.checked_mobile("add_whatsapp", mobile) {
            self.channel(false, WHATSAPP, Value::from(mobile));
        }
        self
    }

    pub fn remove_whatsapp(&mut self, mobile: &str) -> &mut Self {
        if let Some(mobile) = self.checked_mobile("remove_whatsapp", mobile) {
            self.channel(true, WHATSAPP, Value::from(mobile));
        }
        self
    }

    fn push_token(&mut self, caller: &str, remove: bool, key: &str, token: &str, vendor: &str) {
        let Some(token) = self.checked_token(caller, token) else {
            return;
        };
        let mut value = Map::new();
        value.insert(key.to_string(), Value::from(token));
        value.insert(PUSH_VENDOR.to_string(), Value::from(vendor));
        self.channel(remove, key, Value::Object(value));
    }

    pub fn add_androidpush(&mut self, token: &str) -> &mut Self {
        self.push_token("add_androidpush", false, ANDROIDPUSH, token, "fcm");
        self
    }

    pub fn remove_androidpush(&mut self, token: &str) -> &mut Self {
        self.push_token("remove_androidpush", true, ANDROIDPUSH, token, "fcm");
        self
    }

    pub fn add_iospush(&mut self, token: &str) -> &mut Self {
        self.push_token("add_iospush", false, IOSPUSH, token, "apns");
        self
    }

    pub fn remove_iospush(&mut self, token: &str) -> &mut Self {
        self.push_token("remove_iospush", true, IOSPUSH, token, "apns");
        self
    }

    pub fn add_webpush(&mut self, subscription: Value) -> &mut Self {
        if let Some(value) = self.checked_object("add_webpush", subscription) {
            self.channel(false, WEBPUSH, value);
        }
        self
    }

    pub fn remove_webpush(&mut self, subscription: Value) -> &mut Self {
        if let Some(value) = self.checked_object("remove_webpush", subscription) {
            self.channel(true, WEBPUSH, value);
        }
        self
    }

    pub fn add_slack(&mut self, value: Value) -> &mut Self {
        if let Some(value) = self.checked_object("add_slack", value) {
            self.channel(false, SLACK, value);
        }
        self
    }

    pub fn remove_slack(&mut self, value: Value) -> &mut Self {
        if let Some(value) = self.checked_object("remove_slack", value) {
            self.channel(true, SLACK, value);
        }
        self
    }

    /// ISO 639-1 code, e.g. `en`.
    pub fn set_preferred_language(&mut self, language: &str) -> &mut Self {
        let language = language.trim().to_ascii_lowercase();
        if language.len() == 2 && language.chars().all(|c| c.is_ascii_alphabetic()) {
            self.operations.push(IdentityOp::Set {
                key: "$preferred_language".into(),
                value: Value::from(language),
            });
        } else {
            self.warn(
                "set_preferred_language",
                format!("invalid language code '{language}'"),
            );
        }
        self
    }

    /// IANA timezone name, e.g. `Europe/Berlin`.
    pub fn set_timezone(&mut self, timezone: &str) -> &mut Self {
        let timezone = timezone.trim();
        if timezone.is_empty() || timezone.contains(char::is_whitespace) {
            self.warn("set_timezone", format!("invalid timezone '{timezone}'"));
        } else {
            self.operations.push(IdentityOp::Set {
                key: "$timezone".into(),
                value: Value::from(timezone),
            });
        }
        self
    }

    fn operations_body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        for op in &self.operations {
            match op {
                IdentityOp::Unset { key } => {
                    let list = body
                        .entry("$unset")
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(items) = list {
                        items.push(Value::from(key.as_str()));
                    }
                }
                IdentityOp::Custom { key, value } => {
                    body.insert(key.clone(), value.clone());
                }
                IdentityOp::Set { key, value }
                | IdentityOp::SetOnce { key, value }
                | IdentityOp::Increment { key, value }
                | IdentityOp::Append { key, value }
                | IdentityOp::Remove { key, value } => {
                    let Some(operator) = op.operator() else {
                        continue;
                    };
                    let group = body
                        .entry(operator)
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(group) = group {
                        group.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        body
    }

    fn canonical_body(&self, workspace_key: &str) -> Result<Map<String, Value>, RecordError> {
        let distinct_id = self.distinct_id.trim();
        if distinct_id.is_empty() {
            return Err(RecordError::new("distinct_id missing"));
        }
        let operations = self.operations_body();
        if operations.is_empty() {
            return Err(RecordError::new(format!(
                "user edit for '{distinct_id}' has no operations"
            )));
        }

        let mut body = Map::new();
        body.insert("distinct_id".into(), Value::from(distinct_id));
        body.insert("$insert_id".into(), insert_id());
        body.insert("$time".into(), now_millis());
        body.insert("env".into(), Value::from(workspace_key));
        body.extend(operations);
        if let Some(key) = non_blank(&self.idempotency_key) {
            body.insert("$idempotency_key".into(), Value::from(key));
        }
        Ok(body)
    }
}

impl BulkRecord for UserEdit {
    const KIND: RecordKind = RecordKind::IdentityEdit;

    fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        _is_part_of_bulk: bool,
        warnings: &mut Vec<String>,
    ) -> Result<PendingRecord, RecordError> {
        let label = self.distinct_id.trim();
        warnings.extend(
            self.warnings
                .iter()
                .map(|warning| format!("distinct_id '{label}': {warning}")),
        );

        let body = self.canonical_body(ctx.workspace_key)?;
        let apparent_size = json_size(&body)?;
        if apparent_size > ctx.limits.max_identity_record_size_bytes {
            return Err(RecordError::new(format!(
                "user edit too big - {apparent_size} Bytes, must not cross {}",
                human_size(ctx.limits.max_identity_record_size_bytes)
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
        raw.extend(self.operations_body());
        Value::Object(raw)
    }
}
