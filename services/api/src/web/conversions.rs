//! services/api/src/web/conversions.rs
//!
//! Conversion endpoints: the rate-limited convert pipeline plus the CRUD
//! surface for saved conversions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{rate_limit_headers, ApiError};
use crate::web::middleware::MaybeAccount;
use crate::web::state::AppState;
use ctxt_core::convert::ConvertOptions;
use ctxt_core::domain::{Account, ConversionRecord};

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct ConvertRequest {
    pub url: String,
    #[serde(default)]
    pub options: ConvertRequestOptions,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct ConvertRequestOptions {
    /// Persist the conversion. Defaults to a preview-only run.
    #[serde(default)]
    pub save: bool,
}

/// The public shape of a conversion.
#[derive(Serialize, ToSchema)]
pub struct ConversionPayload {
    pub id: Uuid,
    pub slug: String,
    pub account_id: Option<Uuid>,
    pub source_url: String,
    pub title: Option<String>,
    pub domain: String,
    pub content: String,
    pub meta_description: String,
    pub word_count: i32,
    pub reading_time: i32,
    pub token_count: i32,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<ConversionRecord> for ConversionPayload {
    fn from(record: ConversionRecord) -> Self {
        Self {
            id: record.id,
            slug: record.slug,
            account_id: record.account_id,
            source_url: record.source_url,
            title: record.title,
            domain: record.domain,
            content: record.content,
            meta_description: record.meta_description,
            word_count: record.word_count,
            reading_time: record.reading_time,
            token_count: record.token_count,
            view_count: record.view_count,
            created_at: record.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SaveRequest {
    #[serde(default = "default_true")]
    pub make_public: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, ToSchema)]
pub struct SaveResponse {
    pub slug: String,
    pub permanent_url: String,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    10
}

#[derive(Serialize, ToSchema)]
pub struct ConversionList {
    pub items: Vec<ConversionPayload>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ViewCountResponse {
    pub message: String,
    pub view_count: i64,
}

pub fn validate_pagination(limit: i64, offset: i64) -> Result<(), ApiError> {
    if limit < 1 {
        return Err(ApiError::validation_for("limit", "Limit must be at least 1"));
    }
    if limit > 100 {
        return Err(ApiError::validation_for("limit", "Limit cannot exceed 100"));
    }
    if offset < 0 {
        return Err(ApiError::validation_for("offset", "Offset cannot be negative"));
    }
    Ok(())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /convert - Convert a URL to markdown
///
/// Works anonymously (free-tier quota) or authenticated (the account's tier).
/// The rate limit is checked before the external extraction call; a denial
/// returns 429 with machine-readable quota metadata.
#[utoipa::path(
    post,
    path = "/convert",
    request_body = ConvertRequest,
    responses(
        (status = 200, description = "Conversion result", body = ConversionPayload),
        (status = 422, description = "Invalid URL"),
        (status = 429, description = "Rate limit exceeded"),
        (status = 400, description = "Extraction failed"),
        (status = 503, description = "Backing store unavailable")
    )
)]
pub async fn convert_handler(
    State(state): State<Arc<AppState>>,
    Extension(MaybeAccount(account)): Extension<MaybeAccount>,
    Json(req): Json<ConvertRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let decision = state.rate_limiter.check(account.as_ref()).await?;
    if !decision.allowed {
        return Err(ApiError::RateLimited(decision));
    }

    let options = ConvertOptions {
        save: req.options.save,
    };
    let record = state
        .converter
        .convert(&req.url, account.as_ref(), &options)
        .await?;

    // Every successful conversion moves the account's cumulative counter.
    if let Some(account) = &account {
        state.accounts.record_usage(account.id).await?;
    }

    let headers = rate_limit_headers(&decision);
    Ok((headers, Json(ConversionPayload::from(record))))
}

/// POST /conversions/{id}/save - Save a conversion to the caller's library
#[utoipa::path(
    post,
    path = "/conversions/{id}/save",
    request_body = SaveRequest,
    responses(
        (status = 200, description = "Conversion saved", body = SaveResponse),
        (status = 404, description = "Conversion not found")
    )
)]
pub async fn save_conversion_handler(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
    Path(id): Path<Uuid>,
    Json(req): Json<SaveRequest>,
) -> Result<Json<SaveResponse>, ApiError> {
    let record = state
        .conversions
        .claim(id, account.id, req.make_public)
        .await
        .map_err(ApiError::or_not_found("Conversion", id.to_string()))?;

    info!(conversion = %id, account = %account.id, "conversion saved to library");

    Ok(Json(SaveResponse {
        permanent_url: format!("{}/read/{}", state.config.site_base_url, record.slug),
        slug: record.slug,
    }))
}

/// GET /conversions - List the caller's saved conversions
pub async fn list_conversions_handler(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
    Query(params): Query<ListParams>,
) -> Result<Json<ConversionList>, ApiError> {
    validate_pagination(params.limit, params.offset)?;

    let (records, total) = state
        .conversions
        .list_for_account(account.id, params.search.as_deref(), params.limit, params.offset)
        .await?;

    Ok(Json(ConversionList {
        items: records.into_iter().map(ConversionPayload::from).collect(),
        total,
        limit: params.limit,
        offset: params.offset,
    }))
}

/// GET /conversions/{id} - Fetch a public conversion and count the view
pub async fn get_conversion_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversionPayload>, ApiError> {
    let mut record = state
        .conversions
        .get_public_by_id(id)
        .await
        .map_err(ApiError::or_not_found("Conversion", id.to_string()))?;

    record.view_count = state.conversions.record_view(&record.slug).await?;

    Ok(Json(ConversionPayload::from(record)))
}

/// GET /conversions/slug/{slug} - Fetch a public conversion by slug
pub async fn get_conversion_by_slug_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ConversionPayload>, ApiError> {
    let record = state
        .conversions
        .get_public_by_slug(&slug)
        .await
        .map_err(ApiError::or_not_found("Conversion", slug.clone()))?;

    Ok(Json(ConversionPayload::from(record)))
}

/// POST /conversions/slug/{slug}/view - Bump the view counter
pub async fn increment_view_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ViewCountResponse>, ApiError> {
    // Confirm the record is public before counting the view.
    state
        .conversions
        .get_public_by_slug(&slug)
        .await
        .map_err(ApiError::or_not_found("Conversion", slug.clone()))?;

    let view_count = state.conversions.record_view(&slug).await?;

    Ok(Json(ViewCountResponse {
        message: "View count updated".to_string(),
        view_count,
    }))
}

/// DELETE /conversions/{id} - Delete an owned conversion
pub async fn delete_conversion_handler(
    State(state): State<Arc<AppState>>,
    Extension(maybe): Extension<MaybeAccount>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let account = maybe.require()?;
    let deleted = state.conversions.delete_owned(id, account.id).await?;
    if !deleted {
        return Err(ApiError::not_found("Conversion", id.to_string()));
    }

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Conversion deleted successfully" })),
    ))
}
