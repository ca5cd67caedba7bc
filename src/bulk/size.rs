//! Apparent size of a record as the provider will see it.

use serde_json::{Map, Value};

use super::RecordKind;
use crate::attachment::{attachment_count, strip_attachments};
use crate::config::BulkLimits;
use crate::error::RecordError;

/// Serialized JSON length of `body` in bytes.
pub fn json_size(body: &Map<String, Value>) -> Result<usize, RecordError> {
    Ok(serde_json::to_vec(body)?.len())
}

/// Estimate the transmitted size of `body`.
///
/// Attachment payloads are counted as-is, replaced by a per-attachment URL
/// estimate when auto-upload is enabled, or left out entirely for bulk calls
/// that do not carry attachments. Workflow bodies also pay for the keys the
/// provider injects server-side. `body` is never modified; stripping happens on
/// a copy.
pub fn estimate_size(
    body: &Map<String, Value>,
    kind: RecordKind,
    is_part_of_bulk: bool,
    limits: &BulkLimits,
) -> Result<usize, RecordError> {
    let mut extra_bytes = match kind {
        RecordKind::Workflow => limits.workflow_runtime_keys_size_bytes,
        RecordKind::Event | RecordKind::IdentityEdit => 0,
    };

    let Some(section) = kind.attachment_section() else {
        return Ok(json_size(body)? + extra_bytes);
    };
    let num_attachments = attachment_count(body, section);
    if num_attachments == 0 {
        return Ok(json_size(body)? + extra_bytes);
    }

    let strip = if is_part_of_bulk && !limits.allow_attachments_in_bulk {
        true
    } else if limits.attachment_upload_enabled {
        extra_bytes += num_attachments * limits.attachment_url_size_bytes;
        true
    } else {
        false
    };

    if strip {
        let mut apparent = body.clone();
        strip_attachments(&mut apparent, section);
        Ok(json_size(&apparent)? + extra_bytes)
    } else {
        Ok(json_size(body)? + extra_bytes)
    }
}
