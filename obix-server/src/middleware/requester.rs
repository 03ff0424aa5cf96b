//! Requester-id extraction (spec §2: "the requester identity is supplied by
//! the transport" — authentication proper is an explicit Non-goal). The
//! transport here reads it off a header and hands it to handlers via a
//! request extension, the same `Extension`-insertion shape the teacher's
//! `auth::middleware::auth_middleware` uses for its authenticated user.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

const REQUESTER_HEADER: &str = "x-obix-requester";
const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Clone)]
pub struct RequesterId(pub String);

pub async fn extract_requester(mut request: Request, next: Next) -> Response {
    let requester = request
        .headers()
        .get(REQUESTER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| ANONYMOUS.to_string());
    request.extensions_mut().insert(RequesterId(requester));
    next.run(request).await
}
