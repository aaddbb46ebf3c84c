//! crates/ctxt_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

use crate::domain::{
    Account, AccountCredentials, ContextBlock, ContextStack, ConversionRecord,
};
use crate::tier::Tier;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint was violated (e.g. duplicate slug or email).
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The backing store could not be reached. Callers must treat this as a
    /// transient failure, never as an implicit allow or deny.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Write Payloads
//=========================================================================================

#[derive(Debug, Clone)]
pub struct NewContextStack {
    pub account_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub blocks: Vec<ContextBlock>,
    pub is_template: bool,
    pub is_public: bool,
}

/// Partial update for a stack. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ContextStackUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub blocks: Option<Vec<ContextBlock>>,
    pub is_template: Option<bool>,
    pub is_public: Option<bool>,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AccountStore: Send + Sync {
    // --- Auth Methods ---
    async fn create_account(&self, email: &str, hashed_password: &str) -> PortResult<Account>;

    async fn get_account(&self, account_id: Uuid) -> PortResult<Account>;

    async fn get_account_by_email(&self, email: &str) -> PortResult<AccountCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        account_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Usage Tracking ---

    /// Atomically bumps the account's cumulative usage counter.
    async fn record_usage(&self, account_id: Uuid) -> PortResult<()>;

    // --- Billing-Event Application (all idempotent) ---

    async fn grant_tier(
        &self,
        account_id: Uuid,
        tier: Tier,
        customer_id: Option<&str>,
    ) -> PortResult<()>;

    async fn attach_subscription(
        &self,
        customer_id: &str,
        subscription_id: &str,
        ends_at: Option<DateTime<Utc>>,
    ) -> PortResult<()>;

    async fn set_subscription_end(
        &self,
        subscription_id: &str,
        ends_at: Option<DateTime<Utc>>,
    ) -> PortResult<()>;
}

#[async_trait]
pub trait ConversionStore: Send + Sync {
    /// Persists a fully-built record. Returns [`PortError::Conflict`] when the
    /// slug collides with an existing row, so the pipeline can retry.
    async fn insert(&self, record: &ConversionRecord) -> PortResult<()>;

    async fn slug_exists(&self, slug: &str) -> PortResult<bool>;

    async fn get_by_slug(&self, slug: &str) -> PortResult<ConversionRecord>;

    async fn get_public_by_slug(&self, slug: &str) -> PortResult<ConversionRecord>;

    async fn get_public_by_id(&self, id: Uuid) -> PortResult<ConversionRecord>;

    async fn list_for_account(
        &self,
        account_id: Uuid,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> PortResult<(Vec<ConversionRecord>, i64)>;

    /// Attaches an existing record to an account's library ("save").
    async fn claim(
        &self,
        id: Uuid,
        account_id: Uuid,
        make_public: bool,
    ) -> PortResult<ConversionRecord>;

    /// Atomically bumps the view counter, returning the new count.
    async fn record_view(&self, slug: &str) -> PortResult<i64>;

    async fn delete_owned(&self, id: Uuid, account_id: Uuid) -> PortResult<bool>;
}

/// Rolling-window usage lookup against the conversion history. Pure read,
/// no mutation; backed by the same store as [`ConversionStore`].
#[async_trait]
pub trait UsageCounter: Send + Sync {
    /// Number of records created by this account since `since`.
    async fn conversions_since(&self, account_id: Uuid, since: DateTime<Utc>) -> PortResult<u32>;
}

#[async_trait]
pub trait ContextStackStore: Send + Sync {
    async fn create(&self, stack: NewContextStack) -> PortResult<ContextStack>;

    /// Fetches a stack the viewer may see: their own, or a public one.
    /// Inaccessible stacks surface as [`PortError::NotFound`].
    async fn get_accessible(&self, id: Uuid, viewer: Option<Uuid>) -> PortResult<ContextStack>;

    async fn list_for_account(
        &self,
        account_id: Uuid,
        search: Option<&str>,
        is_template: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> PortResult<Vec<ContextStack>>;

    async fn list_public(&self, limit: i64, offset: i64) -> PortResult<Vec<ContextStack>>;

    async fn update_owned(
        &self,
        id: Uuid,
        account_id: Uuid,
        update: ContextStackUpdate,
    ) -> PortResult<ContextStack>;

    async fn delete_owned(&self, id: Uuid, account_id: Uuid) -> PortResult<bool>;

    /// Atomically bumps use_count and refreshes last_used_at.
    async fn record_use(&self, id: Uuid) -> PortResult<()>;
}

//=========================================================================================
// External Collaborators
//=========================================================================================

/// Failure modes of the remote extraction call.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("the webpage took too long to process")]
    Timeout,
    #[error("upstream returned HTTP {0}")]
    UpstreamStatus(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

/// The remote URL-to-markdown extraction service. Given a validated absolute
/// URL it returns the page as markdown text, or fails.
#[async_trait]
pub trait MarkdownExtractor: Send + Sync {
    async fn fetch_markdown(&self, url: &Url) -> Result<String, ExtractError>;
}

/// Model-compatible token counting. Implementations must be deterministic for
/// identical input and must degrade internally instead of failing.
pub trait TokenEstimator: Send + Sync {
    fn count(&self, text: &str) -> usize;
}
