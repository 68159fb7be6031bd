//! HTTP response building helpers
//!
//! Keeps error bodies uniform across handlers: `{error, kind, retryable}`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::{ApprovalError, SupplyError};

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a 404 Not Found response with message
pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    json_response(StatusCode::NOT_FOUND, &serde_json::json!({ "error": message }))
}

/// Build a 400 Bad Request response with message
pub fn bad_request(message: &str) -> Response<Full<Bytes>> {
    json_response(StatusCode::BAD_REQUEST, &serde_json::json!({ "error": message }))
}

/// Build a 405 Method Not Allowed response
pub fn method_not_allowed() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "error": "Method not allowed" }),
    )
}

/// Convert a SupplyError to an appropriate HTTP response
pub fn error_response(err: SupplyError) -> Response<Full<Bytes>> {
    let (status, message) = match &err {
        SupplyError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        SupplyError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        SupplyError::Json(e) => (StatusCode::BAD_REQUEST, format!("JSON error: {}", e)),
        _ => {
            error!(error = %err, "Request failed");
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
    };

    json_response(status, &serde_json::json!({ "error": message }))
}

/// Convert a rejected decision to an HTTP response
pub fn approval_error_response(err: &ApprovalError) -> Response<Full<Bytes>> {
    let status = match err {
        ApprovalError::CardNotFound(_) => StatusCode::NOT_FOUND,
        ApprovalError::AlreadyDecided { .. } => StatusCode::CONFLICT,
        ApprovalError::InvalidRecommendation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ApprovalError::NoSourceStock { .. } | ApprovalError::InsufficientStock { .. } => {
            StatusCode::CONFLICT
        }
        ApprovalError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    json_response(
        status,
        &serde_json::json!({
            "error": err.to_string(),
            "kind": err.kind(),
            "retryable": err.is_retryable(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_status_mapping() {
        let resp = approval_error_response(&ApprovalError::AlreadyDecided { status: "approved".into() });
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = approval_error_response(&ApprovalError::StorageUnavailable("locked".into()));
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = approval_error_response(&ApprovalError::CardNotFound("x".into()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/json");
    }
}
