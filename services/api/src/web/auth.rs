//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for account signup, login, and logout.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Extension, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::middleware::session_cookie;
use crate::web::state::AppState;
use ctxt_core::domain::Account;
use ctxt_core::ports::PortError;

const SESSION_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub account_id: Uuid,
    pub email: String,
    pub tier: String,
}

#[derive(Serialize, ToSchema)]
pub struct MeResponse {
    pub account_id: Uuid,
    pub email: String,
    pub tier: String,
    pub features: Vec<String>,
    pub usage_count: i64,
    pub subscription_ends_at: Option<chrono::DateTime<Utc>>,
}

//=========================================================================================
// Input Validation
//=========================================================================================

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email pattern")
    })
}

fn validate_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::validation_for("email", "Email is required"));
    }
    if email.len() > 254 || !email_re().is_match(&email) {
        return Err(ApiError::validation_for("email", "Invalid email format"));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::validation_for(
            "password",
            "Password must be at least 8 characters long",
        ));
    }
    if password.len() > 128 {
        return Err(ApiError::validation_for(
            "password",
            "Password must be no more than 128 characters long",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(ApiError::validation_for(
            "password",
            "Password must contain at least one letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::validation_for(
            "password",
            "Password must contain at least one number",
        ));
    }
    Ok(())
}

fn session_cookie_value(session_id: &str, max_age_secs: i64) -> String {
    format!(
        "session={session_id}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={max_age_secs}"
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created successfully", body = AuthResponse),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Invalid email or password")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    // 1. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "failed to hash password");
            ApiError::Internal("Failed to hash password".to_string())
        })?
        .to_string();

    // 2. Create the account
    let account = state
        .accounts
        .create_account(&email, &password_hash)
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => ApiError::Conflict("Email already registered".to_string()),
            other => other.into(),
        })?;

    // 3. Open a session for the new account
    let auth_session_id = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_DAYS);
    state
        .accounts
        .create_auth_session(&auth_session_id, account.id, expires_at)
        .await?;

    let cookie =
        session_cookie_value(&auth_session_id, Duration::days(SESSION_DAYS).num_seconds());

    let response = AuthResponse {
        account_id: account.id,
        email: account.email,
        tier: account.tier.to_string(),
    };

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// POST /auth/login - Login with an existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&req.email)?;

    // A missing account and a wrong password answer identically.
    let invalid = || ApiError::Authentication("Invalid email or password".to_string());

    let creds = state
        .accounts
        .get_account_by_email(&email)
        .await
        .map_err(|_| invalid())?;

    if !creds.is_active {
        return Err(invalid());
    }

    let parsed_hash = PasswordHash::new(&creds.hashed_password).map_err(|e| {
        error!(error = %e, "failed to parse stored password hash");
        ApiError::Internal("Authentication error".to_string())
    })?;

    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(invalid());
    }

    let account = state.accounts.get_account(creds.account_id).await?;

    let auth_session_id = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_DAYS);
    state
        .accounts
        .create_auth_session(&auth_session_id, account.id, expires_at)
        .await?;

    let cookie =
        session_cookie_value(&auth_session_id, Duration::days(SESSION_DAYS).num_seconds());

    let response = AuthResponse {
        account_id: account.id,
        email: account.email,
        tier: account.tier.to_string(),
    };

    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and invalidate the session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let auth_session_id = session_cookie(&headers)
        .ok_or_else(|| ApiError::Authentication("No session found".to_string()))?;

    state.accounts.delete_auth_session(auth_session_id).await?;

    // Clear cookie
    let cookie = session_cookie_value("", 0);

    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)]))
}

/// GET /auth/me - Current account info with tier entitlements
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current account", body = MeResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<Account>,
) -> Json<MeResponse> {
    let spec = state.tier_policy.spec(account.tier);
    Json(MeResponse {
        account_id: account.id,
        email: account.email,
        tier: account.tier.to_string(),
        features: spec.features.iter().map(|f| f.to_string()).collect(),
        usage_count: account.usage_count,
        subscription_ends_at: account.subscription_ends_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reasonable_emails() {
        assert_eq!(validate_email(" User@Example.COM ").unwrap(), "user@example.com");
    }

    #[test]
    fn rejects_malformed_emails() {
        for email in ["", "nope", "a@b", "@example.com", "user@.com"] {
            assert!(validate_email(email).is_err(), "{email} should be rejected");
        }
    }

    #[test]
    fn enforces_password_rules() {
        assert!(validate_password("short1").is_err());
        assert!(validate_password("allletters").is_err());
        assert!(validate_password("12345678").is_err());
        assert!(validate_password("passw0rd").is_ok());
    }
}
