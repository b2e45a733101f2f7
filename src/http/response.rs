//! Mapping queue responses and queue errors onto HTTP.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::QueueError;
use crate::kernel::QueueResponse;

impl IntoResponse for QueueResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for (name, value) in self.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::debug!(header = %name, "Dropping invalid response header"),
            }
        }
        response
    }
}

/// HTTP status an administrative caller sees for a queue error.
pub fn status_for(error: &QueueError) -> StatusCode {
    match error {
        QueueError::NotFound(_) | QueueError::TargetNotFound(_) | QueueError::NoRoute(_) => StatusCode::NOT_FOUND,
        QueueError::AlreadyExists(_) | QueueError::PrefixConflict(_) | QueueError::IncompatibleMode { .. } => {
            StatusCode::CONFLICT
        }
        QueueError::InvalidName(_) | QueueError::InvalidPrefix { .. } | QueueError::SelfDelegation(_) => {
            StatusCode::BAD_REQUEST
        }
        QueueError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        QueueError::ServiceUnavailable(_) | QueueError::Closed => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_response_conversion() {
        let response = QueueResponse::new(201)
            .with_header("x-served-by", "svc-v1")
            .with_header("bad header", "x")
            .with_body("done")
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-served-by"], "svc-v1");
        assert_eq!(response.headers().len(), 1);
    }

    #[test]
    fn test_invalid_status_becomes_500() {
        assert_eq!(QueueResponse::new(42).into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(status_for(&QueueError::TargetNotFound("v2".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&QueueError::PrefixConflict("p".into())), StatusCode::CONFLICT);
        assert_eq!(status_for(&QueueError::SelfDelegation("v1".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&QueueError::PermissionDenied("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&QueueError::Closed), StatusCode::SERVICE_UNAVAILABLE);
    }
}
