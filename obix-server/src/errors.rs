//! Transport-level error wrapping (spec §7, §6.1). Unlike the teacher's
//! `AppError`, which maps errors to HTTP 4xx/5xx, the oBIX HTTP surface
//! never emits an HTTP-level failure: every error becomes a normal
//! `200 OK` response whose body is an `<err/>` contract. This type only
//! covers failures the core engine never sees (a body that doesn't parse
//! as XML, a body missing where one is required) — everything reaching
//! [`obix_core::Dispatcher::handle`] is already turned into an `<err/>`
//! node internally and never surfaces here.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use obix_model::{contracts, ObixError};

pub struct AppError(pub ObixError);

impl From<ObixError> for AppError {
    fn from(err: ObixError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let node = contracts::err_node(&self.0);
        let body = obix_model::xml::write_node(&node)
            .unwrap_or_else(|_| format!(r#"<err is="obix:UnsupportedErr" val="{}"/>"#, self.0.message));
        (StatusCode::OK, [(header::CONTENT_TYPE, "text/xml")], body).into_response()
    }
}
