use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_ID_LEN: usize = 64;

/// Caller-supplied id when it is short and made of token characters,
/// otherwise a fresh UUID v4.
fn resolve_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= MAX_ID_LEN)
        .filter(|s| {
            s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        })
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Tags the `http` span with the request id and echoes it on the response,
/// so a poller's repeated calls can be matched against server logs.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let id = resolve_id(request.headers());
    tracing::Span::current().record("request_id", id.as_str());

    let mut response = next.run(request).await;
    if let Ok(val) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, val);
    }
    response
}
