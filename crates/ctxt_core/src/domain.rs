//! crates/ctxt_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format,
//! except for [`ContextBlock`], which doubles as the persisted JSON shape
//! of a stack's block list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tier::Tier;

/// Represents a registered account, the unit of quota accounting.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub tier: Tier,
    pub is_active: bool,
    /// Cumulative number of successful conversions attributed to this account.
    pub usage_count: i64,
    pub subscription_ends_at: Option<DateTime<Utc>>,
    pub billing_customer_id: Option<String>,
    pub billing_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct AccountCredentials {
    pub account_id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub is_active: bool,
}

/// The durable result of one successful extraction.
///
/// Content is immutable after creation; only the visibility flags, the view
/// counter and the owning account may change later (save-to-library).
#[derive(Debug, Clone)]
pub struct ConversionRecord {
    pub id: Uuid,
    /// URL-safe public address. Unique and immutable once assigned.
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
    pub is_public: bool,
    pub is_indexed: bool,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of a context stack. Stored as tagged JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContextBlock {
    Url {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        content: String,
    },
    Text {
        content: String,
    },
}

impl ContextBlock {
    pub fn content(&self) -> &str {
        match self {
            ContextBlock::Url { content, .. } => content,
            ContextBlock::Text { content } => content,
        }
    }
}

/// An ordered, user-authored collection of content blocks.
#[derive(Debug, Clone)]
pub struct ContextStack {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Order is significant and preserved on every read and export.
    pub blocks: Vec<ContextBlock>,
    pub is_template: bool,
    pub is_public: bool,
    pub use_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The outcome of one rate-limit evaluation. Computed fresh per request,
/// never cached or persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub tier: Tier,
    /// `None` means the tier is unlimited.
    pub daily_limit: Option<u32>,
    pub remaining: Option<u32>,
    pub current_usage: u32,
    pub reset_at: Option<DateTime<Utc>>,
}
