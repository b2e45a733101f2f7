//! Application callback invoked by workers for each dequeued request.

use crate::kernel::{QueueResponse, QueuedRequest};

pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, queue: &str, request: &QueuedRequest) -> QueueResponse;
}

impl<F> RequestHandler for F
where
    F: Fn(&str, &QueuedRequest) -> QueueResponse + Send + Sync + 'static,
{
    fn handle(&self, queue: &str, request: &QueuedRequest) -> QueueResponse {
        self(queue, request)
    }
}

/// Answers every request with its method, path and body, tagged with the
/// queue that served it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl RequestHandler for EchoHandler {
    fn handle(&self, queue: &str, request: &QueuedRequest) -> QueueResponse {
        let mut body = format!("{} {}\n", request.method(), request.url().path()).into_bytes();
        body.extend_from_slice(request.body());
        QueueResponse::ok(body)
            .with_header("content-type", "text/plain")
            .with_header("x-served-by", queue)
            .with_header("x-request-id", request.id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_echo() {
        let (req, _rx) = QueuedRequest::new(
            "POST",
            Url::parse("http://h:8080/a/b?x=1").unwrap(),
            vec![],
            b"hi".to_vec(),
        );
        let resp = EchoHandler.handle("svc-v1", &req);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"POST /a/b\nhi");
        assert_eq!(resp.header("x-served-by"), Some("svc-v1"));
    }

    #[test]
    fn test_closure_handler() {
        let handler = |queue: &str, _: &QueuedRequest| QueueResponse::new(202).with_header("q", queue);
        let (req, _rx) = QueuedRequest::new("GET", Url::parse("http://h/").unwrap(), vec![], vec![]);
        assert_eq!(handler.handle("x", &req).status, 202);
    }
}
