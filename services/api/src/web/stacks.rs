//! services/api/src/web/stacks.rs
//!
//! Context stack endpoints: CRUD for the caller's stacks, the public
//! listing, and the export pipeline. Every read or export of a stack bumps
//! its use counter, whoever the caller is.

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

use crate::error::ApiError;
use crate::web::conversions::validate_pagination;
use crate::web::middleware::MaybeAccount;
use crate::web::state::AppState;
use ctxt_core::domain::{Account, ContextBlock, ContextStack};
use ctxt_core::export::{self, ExportFormat, ExportOptions};
use ctxt_core::ports::{ContextStackUpdate, NewContextStack};

const NAME_MAX: usize = 200;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateStackRequest {
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub blocks: Vec<ContextBlock>,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct UpdateStackRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<Vec<Object>>)]
    pub blocks: Option<Vec<ContextBlock>>,
    pub is_template: Option<bool>,
    pub is_public: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct StackPayload {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub blocks: Vec<ContextBlock>,
    pub is_template: bool,
    pub is_public: bool,
    pub use_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ContextStack> for StackPayload {
    fn from(stack: ContextStack) -> Self {
        Self {
            id: stack.id,
            account_id: stack.account_id,
            name: stack.name,
            description: stack.description,
            blocks: stack.blocks,
            is_template: stack.is_template,
            is_public: stack.is_public,
            use_count: stack.use_count,
            last_used_at: stack.last_used_at,
            created_at: stack.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct StackListParams {
    pub search: Option<String>,
    pub is_template: Option<bool>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Deserialize)]
pub struct PublicListParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Deserialize, ToSchema)]
pub struct ExportRequest {
    /// One of `xml`, `json`, `markdown`. Defaults to `xml`.
    pub format: Option<String>,
    pub custom_wrapper: Option<String>,
    /// Include URL provenance in the output. Defaults to true.
    pub include_sources: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct ExportResponse {
    pub content: String,
    pub format: String,
    pub name: String,
    pub exported_at: DateTime<Utc>,
}

fn require_template_access(state: &AppState, account: &Account) -> Result<(), ApiError> {
    if state.tier_policy.can_access(account.tier, "context_templates") {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Context templates are not included in your plan".to_string(),
        ))
    }
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::validation_for("name", "Name cannot be empty"));
    }
    if name.len() > NAME_MAX {
        return Err(ApiError::validation_for(
            "name",
            "Name must be no more than 200 characters long",
        ));
    }
    Ok(name.to_string())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /context-stacks - Create a stack
///
/// Marking a stack as a template is a paid entitlement.
#[utoipa::path(
    post,
    path = "/context-stacks",
    request_body = CreateStackRequest,
    responses(
        (status = 201, description = "Stack created", body = StackPayload),
        (status = 403, description = "Tier is not entitled to templates"),
        (status = 422, description = "Invalid payload")
    )
)]
pub async fn create_stack_handler(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
    Json(req): Json<CreateStackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate_name(&req.name)?;
    if req.is_template {
        require_template_access(&state, &account)?;
    }

    let stack = state
        .stacks
        .create(NewContextStack {
            account_id: account.id,
            name,
            description: req.description,
            blocks: req.blocks,
            is_template: req.is_template,
            is_public: req.is_public,
        })
        .await?;

    info!(stack = %stack.id, account = %account.id, "context stack created");

    Ok((StatusCode::CREATED, Json(StackPayload::from(stack))))
}

/// GET /context-stacks - List the caller's stacks
pub async fn list_stacks_handler(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
    Query(params): Query<StackListParams>,
) -> Result<Json<Vec<StackPayload>>, ApiError> {
    validate_pagination(params.limit, params.offset)?;

    let stacks = state
        .stacks
        .list_for_account(
            account.id,
            params.search.as_deref(),
            params.is_template,
            params.limit,
            params.offset,
        )
        .await?;

    Ok(Json(stacks.into_iter().map(StackPayload::from).collect()))
}

/// GET /context-stacks/public - Browse public stacks
pub async fn list_public_stacks_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PublicListParams>,
) -> Result<Json<Vec<StackPayload>>, ApiError> {
    validate_pagination(params.limit, params.offset)?;

    let stacks = state.stacks.list_public(params.limit, params.offset).await?;
    Ok(Json(stacks.into_iter().map(StackPayload::from).collect()))
}

/// GET /context-stacks/{id} - Read one stack (own or public)
///
/// Reading counts as a use, independent of authentication.
pub async fn get_stack_handler(
    State(state): State<Arc<AppState>>,
    Extension(MaybeAccount(account)): Extension<MaybeAccount>,
    Path(id): Path<Uuid>,
) -> Result<Json<StackPayload>, ApiError> {
    let stack = state
        .stacks
        .get_accessible(id, account.map(|a| a.id))
        .await
        .map_err(ApiError::or_not_found("Context stack", id.to_string()))?;

    state.stacks.record_use(id).await?;

    Ok(Json(StackPayload::from(stack)))
}

/// PUT /context-stacks/{id} - Update an owned stack
pub async fn update_stack_handler(
    State(state): State<Arc<AppState>>,
    Extension(maybe): Extension<MaybeAccount>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStackRequest>,
) -> Result<Json<StackPayload>, ApiError> {
    let account = maybe.require()?;
    let name = req.name.as_deref().map(validate_name).transpose()?;
    if req.is_template == Some(true) {
        require_template_access(&state, &account)?;
    }

    let stack = state
        .stacks
        .update_owned(
            id,
            account.id,
            ContextStackUpdate {
                name,
                description: req.description,
                blocks: req.blocks,
                is_template: req.is_template,
                is_public: req.is_public,
            },
        )
        .await
        .map_err(ApiError::or_not_found("Context stack", id.to_string()))?;

    info!(stack = %id, "context stack updated");

    Ok(Json(StackPayload::from(stack)))
}

/// DELETE /context-stacks/{id} - Delete an owned stack
pub async fn delete_stack_handler(
    State(state): State<Arc<AppState>>,
    Extension(maybe): Extension<MaybeAccount>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let account = maybe.require()?;
    let deleted = state.stacks.delete_owned(id, account.id).await?;
    if !deleted {
        return Err(ApiError::not_found("Context stack", id.to_string()));
    }

    info!(stack = %id, "context stack deleted");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Context stack deleted successfully" })),
    ))
}

/// POST /context-stacks/{id}/export - Export a stack
///
/// Anonymous callers can export public stacks; every export bumps the use
/// counter.
#[utoipa::path(
    post,
    path = "/context-stacks/{id}/export",
    request_body = ExportRequest,
    params(("id" = Uuid, Path, description = "Stack id")),
    responses(
        (status = 200, description = "Serialized stack", body = ExportResponse),
        (status = 404, description = "Stack not found or not accessible"),
        (status = 422, description = "Unknown export format")
    )
)]
pub async fn export_stack_handler(
    State(state): State<Arc<AppState>>,
    Extension(MaybeAccount(account)): Extension<MaybeAccount>,
    Path(id): Path<Uuid>,
    Json(req): Json<ExportRequest>,
) -> Result<Json<ExportResponse>, ApiError> {
    let format_name = req.format.as_deref().unwrap_or("xml");
    let format = ExportFormat::from_name(format_name).ok_or_else(|| {
        ApiError::validation_for("format", "Format must be one of: xml, json, markdown")
    })?;

    let stack = state
        .stacks
        .get_accessible(id, account.map(|a| a.id))
        .await
        .map_err(ApiError::or_not_found("Context stack", id.to_string()))?;

    state.stacks.record_use(id).await?;

    let options = ExportOptions {
        custom_wrapper: req.custom_wrapper,
        include_sources: req.include_sources.unwrap_or(true),
    };
    let content = export::render(&stack, format, &options);

    info!(stack = %id, format = format.as_str(), "context stack exported");

    Ok(Json(ExportResponse {
        content,
        format: format.as_str().to_string(),
        name: stack.name,
        exported_at: Utc::now(),
    }))
}
