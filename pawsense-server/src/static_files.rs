use axum::{
    http::header,
    response::{Html, IntoResponse},
};

const DASHBOARD_HTML: &str = include_str!("../static/dashboard.html");

/// Single-page dashboard talking to `/ws` and `/api/*`
pub async fn dashboard_handler() -> impl IntoResponse {
    ([(header::CACHE_CONTROL, "no-cache")], Html(DASHBOARD_HTML))
}
