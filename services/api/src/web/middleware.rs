//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::error;

use crate::web::state::AppState;
use ctxt_core::domain::Account;

/// Extension inserted by [`optional_auth`]: the caller's account when a valid
/// session cookie was presented, `None` otherwise.
#[derive(Clone)]
pub struct MaybeAccount(pub Option<Account>);

impl MaybeAccount {
    /// For handlers that live on a mixed-access route but only make sense
    /// authenticated (e.g. DELETE next to a public GET).
    pub fn require(self) -> Result<Account, crate::error::ApiError> {
        self.0
            .ok_or_else(|| crate::error::ApiError::Authentication("Authentication required".into()))
    }
}

/// Extracts the opaque session id from the request's cookie header.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
}

async fn account_for_request(state: &AppState, headers: &HeaderMap) -> Option<Account> {
    let session_id = session_cookie(headers)?;

    let account_id = match state.accounts.validate_auth_session(session_id).await {
        Ok(account_id) => account_id,
        Err(_) => return None,
    };

    match state.accounts.get_account(account_id).await {
        Ok(account) if account.is_active => Some(account),
        Ok(_) => None,
        Err(e) => {
            error!(%account_id, error = %e, "failed to load account for session");
            None
        }
    }
}

/// Middleware that validates the auth session cookie and loads the account.
///
/// If valid, inserts the [`Account`] into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let account = account_for_request(&state, req.headers())
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(account);

    Ok(next.run(req).await)
}

/// Middleware variant for routes that work both anonymously and
/// authenticated (convert, public reads). Always continues; handlers receive
/// a [`MaybeAccount`].
pub async fn optional_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let account = account_for_request(&state, req.headers()).await;
    req.extensions_mut().insert(MaybeAccount(account));
    next.run(req).await
}
