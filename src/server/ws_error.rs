/// Helpers for HTTP error responses returned before a WebSocket upgrade.
///
/// Errors after the upgrade travel as `error` messages on the socket instead.
use actix_web::{HttpResponse, http::StatusCode};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: ErrorBody<'a>,
}

/// Returns an HTTP error response with a JSON body.
///
/// # Arguments
/// - `code`: Unique error code (e.g. "SHUTTING_DOWN").
/// - `message`: Human-readable error message.
/// - `status`: HTTP status code.
pub fn http_error_response(code: &str, message: &str, status: StatusCode) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: ErrorBody { code, message },
    })
}
