// Embedded dashboard and the catch-all 404

use crate::http::ErrorResponse;
use axum::{
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Json},
};
use tracing::debug;

pub const INDEX_HTML: &str = include_str!("../static/index.html");

pub async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn fallback_handler(uri: Uri) -> impl IntoResponse {
    debug!("No route for {}", uri.path());
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Not found".to_string(),
        }),
    )
}
