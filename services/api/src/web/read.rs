//! services/api/src/web/read.rs
//!
//! The public content-read endpoint. The same stored conversion is served in
//! two representations: raw markdown with a metadata header for crawlers
//! that want text, and a small HTML page for everyone else. Which one a
//! caller gets is decided by the client classifier from its User-Agent.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
};
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::web::state::AppState;
use ctxt_core::botdetect::ClientClassification;
use ctxt_core::domain::ConversionRecord;

const FALLBACK_TITLE: &str = "Converted Content";

/// GET /read/{slug} - Serve a conversion, format negotiated by client identity
#[utoipa::path(
    get,
    path = "/read/{slug}",
    params(("slug" = String, Path, description = "Permanent conversion address")),
    responses(
        (status = 200, description = "The conversion, as text/plain for eligible crawlers or text/html otherwise"),
        (status = 404, description = "Unknown slug")
    )
)]
pub async fn read_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());

    let mut record = state
        .conversions
        .get_by_slug(&slug)
        .await
        .map_err(ApiError::or_not_found("Conversion", slug.clone()))?;

    record.view_count = state.conversions.record_view(&slug).await?;

    let classification = state.bot_detector.classify(user_agent);
    let plain_text = classification.should_serve_plain_text();

    log_access(&classification, &slug, plain_text);

    let base_url = &state.config.site_base_url;
    if plain_text {
        Ok(markdown_response(&record, base_url))
    } else {
        Ok(html_response(&record, base_url))
    }
}

fn log_access(classification: &ClientClassification, slug: &str, served_plain_text: bool) {
    if classification.is_bot {
        info!(
            bot = classification.name.as_deref().unwrap_or("unknown"),
            category = classification.category.map(|c| c.as_str()).unwrap_or("uncategorized"),
            confidence = classification.confidence,
            slug,
            served_plain_text,
            "bot access"
        );
    }
}

/// Raw markdown with a metadata header block, for crawlers.
fn markdown_response(record: &ConversionRecord, base_url: &str) -> Response {
    let title = record.title.as_deref().unwrap_or(FALLBACK_TITLE);
    let body = format!(
        "# {title}\n\n\
         **Source:** {source}\n\
         **Domain:** {domain}\n\
         **Published:** {published}\n\
         **Word Count:** {word_count}\n\
         **Reading Time:** {reading_time} minutes\n\n\
         ---\n\n\
         {content}\n\n\
         ---\n\
         *Converted by ctxt - The LLM Context Builder*\n\
         *Permanent link: {base_url}/read/{slug}*\n",
        source = record.source_url,
        domain = record.domain,
        published = record.created_at.format("%Y-%m-%d"),
        word_count = record.word_count,
        reading_time = record.reading_time,
        content = record.content,
        slug = record.slug,
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );
    headers.insert("x-robots-tag", HeaderValue::from_static("index, follow"));

    (StatusCode::OK, headers, body).into_response()
}

/// A small rendered page for browsers. Full SEO rendering is handled by the
/// frontend; this keeps the permanent address useful on its own.
fn html_response(record: &ConversionRecord, base_url: &str) -> Response {
    let title = record.title.as_deref().unwrap_or(FALLBACK_TITLE);
    let title = escape_html(title);
    let description = escape_html(&record.meta_description);
    let domain = escape_html(&record.domain);
    let content = escape_html(&record.content);

    let body = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - Clean Markdown | ctxt</title>
    <meta name="description" content="{description}">
    <link rel="canonical" href="{base_url}/read/{slug}">
</head>
<body>
    <div class="header">
        <h1>{title}</h1>
        <div class="meta">
            Source: <a href="{source}" target="_blank" rel="noopener">{domain}</a>
            &bull; {word_count} words
            &bull; {reading_time} min read
            &bull; Converted {published}
            &bull; {view_count} views
        </div>
    </div>
    <div class="content">
        <pre>{content}</pre>
    </div>
</body>
</html>"#,
        slug = record.slug,
        source = record.source_url,
        word_count = record.word_count,
        reading_time = record.reading_time,
        published = record.created_at.format("%B %d, %Y"),
        view_count = record.view_count,
    );

    Html(body).into_response()
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
