//! services/api/src/web/docs.rs
//!
//! The master definition for the OpenAPI specification.

use utoipa::OpenApi;

use crate::web::{auth, billing, conversions, read, stacks};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        conversions::convert_handler,
        conversions::save_conversion_handler,
        read::read_handler,
        stacks::create_stack_handler,
        stacks::export_stack_handler,
        billing::webhook_handler,
    ),
    components(
        schemas(
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            auth::MeResponse,
            conversions::ConvertRequest,
            conversions::ConvertRequestOptions,
            conversions::ConversionPayload,
            conversions::SaveRequest,
            conversions::SaveResponse,
            stacks::CreateStackRequest,
            stacks::StackPayload,
            stacks::ExportRequest,
            stacks::ExportResponse,
        )
    ),
    tags(
        (name = "ctxt API", description = "URL-to-markdown conversion and context building.")
    )
)]
pub struct ApiDoc;
