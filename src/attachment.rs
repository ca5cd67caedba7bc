//! Attachments carried under `$attachments` in a workflow's `data` or an
//! event's `properties`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RecordError;

pub const ATTACHMENTS_KEY: &str = "$attachments";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(rename = "contentType", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub ignore_if_error: bool,
}

impl Attachment {
    /// Inline attachment, base64 encoded.
    pub fn from_bytes(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: &[u8],
    ) -> Self {
        Self {
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            data: Some(STANDARD.encode(bytes)),
            url: None,
            ignore_if_error: false,
        }
    }

    /// Attachment the provider downloads itself.
    pub fn from_url(url: impl Into<String>, filename: Option<String>, ignore_if_error: bool) -> Self {
        Self {
            filename,
            content_type: None,
            data: None,
            url: Some(url.into()),
            ignore_if_error,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Append `attachment` to `body[section]["$attachments"]`, creating both as needed.
pub(crate) fn push_attachment(
    body: &mut Map<String, Value>,
    section: &str,
    attachment: &Attachment,
) -> Result<(), RecordError> {
    let section_value = body
        .entry(section.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(section_map) = section_value else {
        return Err(RecordError::new(format!("{section} must be a dictionary")));
    };
    append_attachment(section_map, section, attachment)
}

/// Append `attachment` to `section_map["$attachments"]`.
pub(crate) fn append_attachment(
    section_map: &mut Map<String, Value>,
    section: &str,
    attachment: &Attachment,
) -> Result<(), RecordError> {
    let list = section_map
        .entry(ATTACHMENTS_KEY.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    match list {
        Value::Array(items) => {
            items.push(attachment.to_value());
            Ok(())
        }
        _ => Err(RecordError::new(format!(
            "{section}.{ATTACHMENTS_KEY} must be a list"
        ))),
    }
}

/// Number of attachments under `body[section]["$attachments"]`.
pub(crate) fn attachment_count(body: &Map<String, Value>, section: &str) -> usize {
    body.get(section)
        .and_then(Value::as_object)
        .and_then(|section_map| section_map.get(ATTACHMENTS_KEY))
        .map(|list| match list {
            Value::Array(items) => items.len(),
            Value::Null => 0,
            _ => 1,
        })
        .unwrap_or(0)
}

/// Remove `$attachments` from `body[section]`. Returns whether anything was removed.
pub(crate) fn strip_attachments(body: &mut Map<String, Value>, section: &str) -> bool {
    body.get_mut(section)
        .and_then(Value::as_object_mut)
        .map(|section_map| section_map.remove(ATTACHMENTS_KEY).is_some())
        .unwrap_or(false)
}
