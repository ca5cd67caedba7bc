use crate::error::{Result, SuprsendError};
use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://hub.suprsend.com/";

/// Maximum records in one workflow or event batch.
pub const MAX_RECORDS_IN_BULK: usize = 100;
/// Maximum identity/user-edit records in one batch.
pub const MAX_IDENTITY_EVENTS_IN_BULK: usize = 400;
/// Maximum apparent size of one batch body (800 KiB).
pub const BODY_MAX_APPARENT_SIZE_BYTES: usize = 800 * 1024;
/// Maximum apparent size of a single identity/user-edit record (10 KiB).
pub const IDENTITY_SINGLE_EVENT_MAX_APPARENT_SIZE_BYTES: usize = 10 * 1024;
/// Size a single attachment takes once the provider has replaced it with a URL.
pub const ATTACHMENT_URL_POTENTIAL_SIZE_BYTES: usize = 2100;
/// Keys the provider injects into a workflow body server-side.
pub const WORKFLOW_RUNTIME_KEYS_POTENTIAL_SIZE_BYTES: usize = 1024;
pub const ALLOW_ATTACHMENTS_IN_BULK: bool = true;
pub const ATTACHMENT_UPLOAD_ENABLED: bool = false;

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_millis))
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_required(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| SuprsendError::Config(format!("{key} is required")))
}

/// Connection settings for a workspace.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub workspace_key: String,
    pub workspace_secret: String,
    pub base_url: String,
    pub request_timeout: Duration,
    pub debug: bool,
}

impl ClientConfig {
    pub fn new(workspace_key: impl Into<String>, workspace_secret: impl Into<String>) -> Self {
        Self {
            workspace_key: workspace_key.into(),
            workspace_secret: workspace_secret.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            debug: false,
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self {
            workspace_key: env_required("SUPRSEND_WORKSPACE_KEY")?,
            workspace_secret: env_required("SUPRSEND_WORKSPACE_SECRET")?,
            base_url: env_string("SUPRSEND_BASE_URL", DEFAULT_BASE_URL),
            request_timeout: env_duration_millis("SUPRSEND_TIMEOUT_MS", 30_000),
            debug: env_bool("SUPRSEND_DEBUG", false),
        })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.workspace_key.trim().is_empty() {
            return Err(SuprsendError::Config("missing workspace_key".into()));
        }
        if self.workspace_secret.trim().is_empty() {
            return Err(SuprsendError::Config("missing workspace_secret".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(SuprsendError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        Ok(())
    }
}

/// Provider limits and attachment policies applied by bulk flows.
///
/// `Default` reproduces the provider contract. Nothing reads these from the
/// environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkLimits {
    pub max_records_per_chunk: usize,
    pub max_identity_records_per_chunk: usize,
    pub max_chunk_size_bytes: usize,
    pub max_identity_record_size_bytes: usize,
    pub allow_attachments_in_bulk: bool,
    pub attachment_upload_enabled: bool,
    pub attachment_url_size_bytes: usize,
    pub workflow_runtime_keys_size_bytes: usize,
}

impl Default for BulkLimits {
    fn default() -> Self {
        Self {
            max_records_per_chunk: MAX_RECORDS_IN_BULK,
            max_identity_records_per_chunk: MAX_IDENTITY_EVENTS_IN_BULK,
            max_chunk_size_bytes: BODY_MAX_APPARENT_SIZE_BYTES,
            max_identity_record_size_bytes: IDENTITY_SINGLE_EVENT_MAX_APPARENT_SIZE_BYTES,
            allow_attachments_in_bulk: ALLOW_ATTACHMENTS_IN_BULK,
            attachment_upload_enabled: ATTACHMENT_UPLOAD_ENABLED,
            attachment_url_size_bytes: ATTACHMENT_URL_POTENTIAL_SIZE_BYTES,
            workflow_runtime_keys_size_bytes: WORKFLOW_RUNTIME_KEYS_POTENTIAL_SIZE_BYTES,
        }
    }
}

/// Human readable size used in limit error messages, e.g. `800KB`.
pub(crate) fn human_size(bytes: usize) -> String {
    if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{bytes}B")
    }
}
