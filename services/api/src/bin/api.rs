//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, reader::JinaReaderAdapter, tokens::TiktokenAdapter},
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler, me_handler, signup_handler},
        billing::webhook_handler,
        conversions::{
            convert_handler, delete_conversion_handler, get_conversion_by_slug_handler,
            get_conversion_handler, increment_view_handler, list_conversions_handler,
            save_conversion_handler,
        },
        optional_auth,
        read::read_handler,
        require_auth,
        stacks::{
            create_stack_handler, delete_stack_handler, export_stack_handler, get_stack_handler,
            list_public_stacks_handler, list_stacks_handler, update_stack_handler,
        },
        state::AppState,
        ApiDoc,
    },
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use ctxt_core::{
    botdetect::BotDetector, convert::ConversionService, ratelimit::RateLimiter, tier::TierPolicy,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!(environment = %config.environment, "Configuration loaded. Starting server...");
    if config.is_production() && cfg!(debug_assertions) {
        tracing::warn!("running a debug build in production; internal error detail will leak");
    }

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters & Core Services ---
    let extractor = Arc::new(
        JinaReaderAdapter::new(
            config.reader_base_url.clone(),
            Duration::from_secs(config.reader_timeout_secs),
        )
        .map_err(|e| ApiError::Internal(format!("failed to build extraction client: {e}")))?,
    );
    let tokens = Arc::new(TiktokenAdapter::new());

    let tier_policy = TierPolicy::new(config.free_daily_limit);
    let rate_limiter = Arc::new(RateLimiter::new(tier_policy.clone(), db_adapter.clone()));
    let converter = Arc::new(ConversionService::new(
        extractor,
        tokens,
        db_adapter.clone(),
    ));
    let bot_detector = Arc::new(BotDetector::new());

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        tier_policy,
        accounts: db_adapter.clone(),
        conversions: db_adapter.clone(),
        stacks: db_adapter.clone(),
        converter,
        rate_limiter,
        bot_detector,
    });

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .allowed_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("invalid ALLOWED_ORIGIN: {e}")))?,
        )
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Routes that never look at credentials
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/billing/webhook", post(webhook_handler));

    // Routes that work anonymously but honor a session when present
    let mixed_routes = Router::new()
        .route("/convert", post(convert_handler))
        .route("/read/{slug}", get(read_handler))
        .route("/conversions/slug/{slug}", get(get_conversion_by_slug_handler))
        .route("/conversions/slug/{slug}/view", post(increment_view_handler))
        .route(
            "/conversions/{id}",
            get(get_conversion_handler).delete(delete_conversion_handler),
        )
        .route("/context-stacks/public", get(list_public_stacks_handler))
        .route(
            "/context-stacks/{id}",
            get(get_stack_handler)
                .put(update_stack_handler)
                .delete(delete_stack_handler),
        )
        .route("/context-stacks/{id}/export", post(export_stack_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            optional_auth,
        ));

    // Routes that require a session
    let protected_routes = Router::new()
        .route("/auth/me", get(me_handler))
        .route("/conversions", get(list_conversions_handler))
        .route("/conversions/{id}/save", post(save_conversion_handler))
        .route(
            "/context-stacks",
            post(create_stack_handler).get(list_stacks_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(mixed_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
