//! GET/PUT/POST handlers (spec §6.1): thin adaptors between axum's request
//! types and [`obix_core::Request`]. The core is synchronous by design
//! (spec §5's "parallel OS threads" model), so every call into it runs on
//! `tokio`'s blocking pool, the same bridge `ferrex-server` uses around its
//! synchronous `ffmpeg` calls.

use axum::body::{Body, Bytes};
use axum::extract::{Extension, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::Response;
use obix_core::{Request, Verb};
use obix_model::node::Node;
use obix_model::{xml, ErrorKind, ObixError};

use crate::errors::AppError;
use crate::infra::AppState;
use crate::middleware::RequesterId;

pub async fn get(
    State(state): State<AppState>,
    Extension(RequesterId(requester_id)): Extension<RequesterId>,
    uri: Uri,
) -> Result<Response, AppError> {
    let href = uri.path().to_string();
    let node = invoke(&state, Verb::Get, href.clone(), requester_id, None).await;
    render(&node, &href)
}

pub async fn put(
    State(state): State<AppState>,
    Extension(RequesterId(requester_id)): Extension<RequesterId>,
    uri: Uri,
    body: Bytes,
) -> Result<Response, AppError> {
    let href = uri.path().to_string();
    let input = parse_body(&body)?;
    let node = invoke(&state, Verb::Put, href.clone(), requester_id, input).await;
    render(&node, &href)
}

pub async fn post(
    State(state): State<AppState>,
    Extension(RequesterId(requester_id)): Extension<RequesterId>,
    uri: Uri,
    body: Bytes,
) -> Result<Response, AppError> {
    let href = uri.path().to_string();
    let input = parse_body(&body)?;
    let node = invoke(&state, Verb::Post, href.clone(), requester_id, input).await;
    render(&node, &href)
}

fn parse_body(body: &Bytes) -> Result<Option<Node>, AppError> {
    if body.is_empty() {
        return Ok(None);
    }
    let text = std::str::from_utf8(body)
        .map_err(|e| ObixError::invalid_input(format!("body is not utf-8: {e}")))?;
    Ok(Some(xml::parse_tree(text)?))
}

async fn invoke(state: &AppState, verb: Verb, href: String, requester_id: String, input: Option<Node>) -> Node {
    let core = state.core.clone();
    let href_for_panic = href.clone();
    tokio::task::spawn_blocking(move || {
        core.handle(Request {
            verb,
            href,
            requester_id,
            input,
        })
    })
    .await
    .unwrap_or_else(|_| {
        obix_model::contracts::err_node(
            &ObixError::new(ErrorKind::Fatal, "core task panicked").with_href(href_for_panic),
        )
    })
}

/// Assembles the fragment stream (spec §4.7) into one HTTP body and sets
/// the headers spec §6.1 requires.
fn render(node: &Node, href: &str) -> Result<Response, AppError> {
    let chunks = obix_core::response::render_chunks(node)?;
    let body = chunks.concat();
    let len = body.len();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/xml")
        .header(header::CONTENT_LOCATION, href)
        .header(header::CONTENT_LENGTH, len.to_string())
        .body(Body::from(body))
        .map_err(|e| AppError::from(ObixError::new(ErrorKind::Fatal, format!("response build failed: {e}"))))
}
