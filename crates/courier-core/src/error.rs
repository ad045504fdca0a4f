use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Build the uniform `{ "kind", "message" }` error response every Courier
/// endpoint returns.
pub fn error_response(status: StatusCode, kind: &str, message: &str) -> Response {
    let body = serde_json::json!({
        "kind": kind,
        "message": message,
    });
    (status, Json(body)).into_response()
}
