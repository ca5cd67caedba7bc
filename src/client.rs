use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::SDK_VERSION;
use crate::bulk::{BulkCoordinator, BulkRecord, RecordKind};
use crate::config::{BulkLimits, ClientConfig};
use crate::error::{Result, SuprsendError};
use crate::records::{Event, UserEdit, ValidationContext, WorkflowTrigger};
use crate::schema::SchemaCache;
use crate::signature::{JSON_CONTENT_TYPE, http_date, request_path, sign_request};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Transport};

/// Outcome of a single (non-bulk) call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub warnings: Vec<String>,
}

impl ApiResponse {
    fn from_http(response: HttpResponse, warnings: Vec<String>) -> Self {
        Self {
            success: response.is_success(),
            status_code: response.status,
            message: response.body,
            warnings,
        }
    }
}

/// Signed client for one workspace.
#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    schemas: Arc<SchemaCache>,
    limits: BulkLimits,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("workspace_key", &self.config.workspace_key)
            .field("base_url", &self.config.base_url)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(workspace_key: impl Into<String>, workspace_secret: impl Into<String>) -> Result<Self> {
        Self::from_config(ClientConfig::new(workspace_key, workspace_secret))
    }

    pub fn from_env() -> Result<Self> {
        Self::from_config(ClientConfig::from_env()?)
    }

    pub fn from_config(mut config: ClientConfig) -> Result<Self> {
        config.validate()?;
        if !config.base_url.ends_with('/') {
            config.base_url.push('/');
        }

        let transport = HttpTransport::new(config.request_timeout)?;
        let schemas = SchemaCache::builtin()?;
        log::info!("suprsend client ready for {}", config.base_url);

        Ok(Self {
            config,
            transport: Arc::new(transport),
            schemas: Arc::new(schemas),
            limits: BulkLimits::default(),
        })
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_limits(mut self, limits: BulkLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Result<Self> {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let mut config = self.config.clone();
        config.base_url = base_url;
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn limits(&self) -> &BulkLimits {
        &self.limits
    }

    pub fn schemas(&self) -> &SchemaCache {
        &self.schemas
    }

    pub fn validation_context(&self) -> ValidationContext<'_> {
        ValidationContext {
            workspace_key: &self.config.workspace_key,
            schemas: &self.schemas,
            limits: &self.limits,
        }
    }

    /// Endpoint accepting one record or a list of records of `kind`.
    pub fn endpoint(&self, kind: RecordKind) -> String {
        match kind {
            RecordKind::Workflow => {
                format!("{}{}/trigger/", self.config.base_url, self.config.workspace_key)
            }
            RecordKind::Event | RecordKind::IdentityEdit => {
                format!("{}event/", self.config.base_url)
            }
        }
    }

    /// Serialize `body`, sign it and send it. Any HTTP status is returned as `Ok`.
    pub async fn send_json<T>(&self, method: &str, url: &str, body: &T) -> Result<HttpResponse>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(body)
            .map_err(|err| SuprsendError::RequestBuild(format!("body serialization: {err}")))?;
        let date = http_date(Utc::now());
        let signature = sign_request(
            &self.config.workspace_secret,
            method,
            &payload,
            JSON_CONTENT_TYPE,
            &date,
            request_path(url),
        )?;

        if self.config.debug {
            log::debug!(
                "{} {} body: {}",
                method,
                url,
                String::from_utf8_lossy(&payload)
            );
        }

        let request = HttpRequest {
            method: method.to_string(),
            url: url.to_string(),
            headers: vec![
                ("Content-Type".into(), JSON_CONTENT_TYPE.into()),
                ("Date".into(), date),
                ("User-Agent".into(), SDK_VERSION.into()),
                (
                    "Authorization".into(),
                    format!("{}:{}", self.config.workspace_key, signature),
                ),
            ],
            body: payload,
        };

        let response = self.transport.send(request).await?;
        log::debug!("{} {} -> {}", method, url, response.status);
        Ok(response)
    }

    async fn send_single<R: BulkRecord>(&self, record: &R) -> Result<ApiResponse> {
        let mut warnings = Vec::new();
        let pending = record.validate(&self.validation_context(), false, &mut warnings)?;
        let response = self
            .send_json("POST", &self.endpoint(R::KIND), &pending.body)
            .await?;
        Ok(ApiResponse::from_http(response, warnings))
    }

    pub async fn trigger_workflow(&self, workflow: &WorkflowTrigger) -> Result<ApiResponse> {
        self.send_single(workflow).await
    }

    pub async fn track_event(&self, event: &Event) -> Result<ApiResponse> {
        self.send_single(event).await
    }

    pub async fn save_user_edit(&self, edit: &UserEdit) -> Result<ApiResponse> {
        self.send_single(edit).await
    }

    pub fn bulk<R: BulkRecord>(&self) -> BulkCoordinator<'_, R> {
        BulkCoordinator::new(self)
    }

    pub fn bulk_workflows(&self) -> BulkCoordinator<'_, WorkflowTrigger> {
        self.bulk()
    }

    pub fn bulk_events(&self) -> BulkCoordinator<'_, Event> {
        self.bulk()
    }

    pub fn bulk_user_edits(&self) -> BulkCoordinator<'_, UserEdit> {
        self.bulk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_follow_workspace_layout() {
        let client = Client::new("ws_key", "secret")
            .unwrap()
            .with_base_url("http://localhost:9000")
            .unwrap();
        assert_eq!(
            client.endpoint(RecordKind::Workflow),
            "http://localhost:9000/ws_key/trigger/"
        );
        assert_eq!(client.endpoint(RecordKind::Event), "http://localhost:9000/event/");
        assert_eq!(
            client.endpoint(RecordKind::IdentityEdit),
            "http://localhost:9000/event/"
        );
    }

    #[test]
    fn rejects_missing_credentials() {
        assert!(matches!(Client::new("", "secret"), Err(SuprsendError::Config(_))));
        let client = Client::new("k", "s").unwrap();
        assert!(client.with_base_url("ftp://nope").is_err());
    }
}
