use async_trait::async_trait;
use reqwest::Method;
use std::time::Duration;
use thiserror::Error;

/// Errors raised before an HTTP response was received.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unsupported HTTP method '{0}'")]
    Method(String),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

/// Sends one signed request and returns whatever the server answered.
///
/// Any status code is an `Ok` response; only failures to obtain a response are
/// errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(crate::SDK_VERSION)
            .build()
            .map_err(TransportError::Http)?;

        Ok(Self { http: client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::Method(request.method.clone()))?;

        let mut builder = self.http.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(TransportError::Http)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(TransportError::Http)?;
        Ok(HttpResponse { status, body })
    }
}
