//! Requests buffered in a queue and the responses that complete them.

use serde::Serialize;
use tokio::sync::oneshot;
use url::Url;
use uuid::Uuid;

/// Unique identifier assigned when a request enters the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Response produced by whoever dequeued the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl QueueResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200).with_body(body)
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The response given to requests still buffered when their queue is reclaimed.
    pub fn service_unavailable(queue: &str) -> Self {
        Self::new(503).with_body(format!("queue '{}' is no longer available", queue))
    }

    pub fn not_found() -> Self {
        Self::new(404).with_body("no URL group matches this request")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An accepted, not yet processed request.
///
/// Exactly one consumer dequeues it and completes it with [`QueuedRequest::respond`].
/// Dropping it without a response reports the request as unavailable to the client.
#[derive(Debug)]
pub struct QueuedRequest {
    id: RequestId,
    method: String,
    url: Url,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    reply: oneshot::Sender<QueueResponse>,
}

impl QueuedRequest {
    /// Build a request and the receiver its response will arrive on.
    pub fn new(
        method: impl Into<String>,
        url: Url,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) -> (Self, oneshot::Receiver<QueueResponse>) {
        let (reply, rx) = oneshot::channel();
        let request = Self {
            id: RequestId::new(),
            method: method.into(),
            url,
            headers,
            body,
            reply,
        };
        (request, rx)
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Complete the request. Returns false if the client is gone.
    pub fn respond(self, response: QueueResponse) -> bool {
        self.reply.send(response).is_ok()
    }

    pub(crate) fn abandon(self, queue: &str) {
        let id = self.id;
        if !self.respond(QueueResponse::service_unavailable(queue)) {
            tracing::trace!(request_id = %id, queue, "Abandoned request had no waiting client");
        }
    }
}
