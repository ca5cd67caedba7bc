use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use suprsend_client::{Client, HttpRequest, HttpResponse, Transport, TransportError};

/// Scripted reply for one request.
pub enum Reply {
    Status(u16, &'static str),
    Unreachable,
}

/// In-memory transport that records every request and answers from a script.
/// Once the script runs out every request gets `202`.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    replies: Arc<Mutex<VecDeque<Reply>>>,
}

impl RecordingTransport {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            requests: Arc::default(),
            replies: Arc::new(Mutex::new(replies.into())),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Decoded JSON bodies of every request, in send order.
    pub fn bodies(&self) -> Vec<Value> {
        self.requests()
            .iter()
            .map(|request| serde_json::from_slice(&request.body).unwrap())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            None => Ok(HttpResponse {
                status: 202,
                body: r#"{"success":true}"#.into(),
            }),
            Some(Reply::Status(status, body)) => Ok(HttpResponse {
                status,
                body: body.into(),
            }),
            Some(Reply::Unreachable) => Err(TransportError::Method("CONNECT-REFUSED".into())),
        }
    }
}

pub fn client_with(transport: &RecordingTransport) -> Client {
    Client::new("ws_key", "ws_secret")
        .expect("client")
        .with_base_url("https://hub.test")
        .expect("base url")
        .with_transport(Arc::new(transport.clone()))
}
