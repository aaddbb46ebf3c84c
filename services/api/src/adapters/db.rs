//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the store ports from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Counter updates (view_count, use_count, usage_count) are single-statement
//! atomic increments, and slug/email uniqueness relies on real UNIQUE
//! indexes; unique violations surface as [`PortError::Conflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

use ctxt_core::domain::{
    Account, AccountCredentials, ContextBlock, ContextStack, ConversionRecord,
};
use ctxt_core::ports::{
    AccountStore, ContextStackStore, ContextStackUpdate, ConversionStore, NewContextStack,
    PortError, PortResult, UsageCounter,
};
use ctxt_core::tier::Tier;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the store ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn map_db_err(e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::Database(db)
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
        {
            PortError::Conflict(db.constraint().unwrap_or("unique constraint").to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => PortError::Unavailable(e.to_string()),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn not_found_or(e: sqlx::Error, what: String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        other => map_db_err(other),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct AccountRecord {
    id: Uuid,
    email: String,
    tier: String,
    is_active: bool,
    usage_count: i64,
    subscription_ends_at: Option<DateTime<Utc>>,
    billing_customer_id: Option<String>,
    billing_subscription_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl AccountRecord {
    fn to_domain(self) -> Account {
        Account {
            id: self.id,
            email: self.email,
            // Unknown tier names degrade to free, mirroring the policy fallback.
            tier: Tier::from_name(&self.tier).unwrap_or(Tier::Free),
            is_active: self.is_active,
            usage_count: self.usage_count,
            subscription_ends_at: self.subscription_ends_at,
            billing_customer_id: self.billing_customer_id,
            billing_subscription_id: self.billing_subscription_id,
            created_at: self.created_at,
        }
    }
}

const ACCOUNT_COLUMNS: &str = "id, email, tier, is_active, usage_count, subscription_ends_at, \
     billing_customer_id, billing_subscription_id, created_at";

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    hashed_password: String,
    is_active: bool,
}

impl CredentialsRecord {
    fn to_domain(self) -> AccountCredentials {
        AccountCredentials {
            account_id: self.id,
            email: self.email,
            hashed_password: self.hashed_password,
            is_active: self.is_active,
        }
    }
}

#[derive(FromRow)]
struct ConversionRow {
    id: Uuid,
    slug: String,
    account_id: Option<Uuid>,
    source_url: String,
    title: Option<String>,
    domain: String,
    content: String,
    meta_description: String,
    word_count: i32,
    reading_time: i32,
    token_count: i32,
    is_public: bool,
    is_indexed: bool,
    view_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversionRow {
    fn to_domain(self) -> ConversionRecord {
        ConversionRecord {
            id: self.id,
            slug: self.slug,
            account_id: self.account_id,
            source_url: self.source_url,
            title: self.title,
            domain: self.domain,
            content: self.content,
            meta_description: self.meta_description,
            word_count: self.word_count,
            reading_time: self.reading_time,
            token_count: self.token_count,
            is_public: self.is_public,
            is_indexed: self.is_indexed,
            view_count: self.view_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const CONVERSION_COLUMNS: &str = "id, slug, account_id, source_url, title, domain, content, \
     meta_description, word_count, reading_time, token_count, is_public, is_indexed, \
     view_count, created_at, updated_at";

#[derive(FromRow)]
struct StackRow {
    id: Uuid,
    account_id: Uuid,
    name: String,
    description: Option<String>,
    blocks: Json<Vec<ContextBlock>>,
    is_template: bool,
    is_public: bool,
    use_count: i64,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StackRow {
    fn to_domain(self) -> ContextStack {
        ContextStack {
            id: self.id,
            account_id: self.account_id,
            name: self.name,
            description: self.description,
            blocks: self.blocks.0,
            is_template: self.is_template,
            is_public: self.is_public,
            use_count: self.use_count,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const STACK_COLUMNS: &str = "id, account_id, name, description, blocks, is_template, is_public, \
     use_count, last_used_at, created_at, updated_at";

//=========================================================================================
// `AccountStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountStore for DbAdapter {
    async fn create_account(&self, email: &str, hashed_password: &str) -> PortResult<Account> {
        let sql = format!(
            "INSERT INTO accounts (id, email, hashed_password) VALUES ($1, $2, $3) \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, AccountRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(email)
            .bind(hashed_password)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(record.to_domain())
    }

    async fn get_account(&self, account_id: Uuid) -> PortResult<Account> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let record = sqlx::query_as::<_, AccountRecord>(&sql)
            .bind(account_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, format!("Account {account_id} not found")))?;
        Ok(record.to_domain())
    }

    async fn get_account_by_email(&self, email: &str) -> PortResult<AccountCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, hashed_password, is_active FROM accounts WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, format!("Account for {email} not found")))?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        account_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, account_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(account_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let account_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT account_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, "Auth session not found or expired".to_string()))?;
        Ok(account_id)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn record_usage(&self, account_id: Uuid) -> PortResult<()> {
        sqlx::query(
            "UPDATE accounts SET usage_count = usage_count + 1, updated_at = now() WHERE id = $1",
        )
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn grant_tier(
        &self,
        account_id: Uuid,
        tier: Tier,
        customer_id: Option<&str>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE accounts SET tier = $2, \
             billing_customer_id = COALESCE($3, billing_customer_id), updated_at = now() \
             WHERE id = $1",
        )
        .bind(account_id)
        .bind(tier.as_str())
        .bind(customer_id)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            warn!(%account_id, "tier grant targeted an unknown account");
        }
        Ok(())
    }

    async fn attach_subscription(
        &self,
        customer_id: &str,
        subscription_id: &str,
        ends_at: Option<DateTime<Utc>>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE accounts SET billing_subscription_id = $2, subscription_ends_at = $3, \
             updated_at = now() WHERE billing_customer_id = $1",
        )
        .bind(customer_id)
        .bind(subscription_id)
        .bind(ends_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            warn!(customer_id, "subscription attach targeted an unknown customer");
        }
        Ok(())
    }

    async fn set_subscription_end(
        &self,
        subscription_id: &str,
        ends_at: Option<DateTime<Utc>>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE accounts SET subscription_ends_at = $2, updated_at = now() \
             WHERE billing_subscription_id = $1",
        )
        .bind(subscription_id)
        .bind(ends_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            warn!(subscription_id, "subscription update targeted an unknown subscription");
        }
        Ok(())
    }
}

//=========================================================================================
// `ConversionStore` + `UsageCounter` Trait Implementations
//=========================================================================================

#[async_trait]
impl UsageCounter for DbAdapter {
    async fn conversions_since(
        &self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<u32> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM conversions WHERE account_id = $1 AND created_at >= $2",
        )
        .bind(account_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(count as u32)
    }
}

#[async_trait]
impl ConversionStore for DbAdapter {
    async fn insert(&self, record: &ConversionRecord) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO conversions (id, slug, account_id, source_url, title, domain, content, \
             meta_description, word_count, reading_time, token_count, is_public, is_indexed, \
             view_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(record.id)
        .bind(&record.slug)
        .bind(record.account_id)
        .bind(&record.source_url)
        .bind(&record.title)
        .bind(&record.domain)
        .bind(&record.content)
        .bind(&record.meta_description)
        .bind(record.word_count)
        .bind(record.reading_time)
        .bind(record.token_count)
        .bind(record.is_public)
        .bind(record.is_indexed)
        .bind(record.view_count)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn slug_exists(&self, slug: &str) -> PortResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM conversions WHERE slug = $1)",
        )
        .bind(slug)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(exists)
    }

    async fn get_by_slug(&self, slug: &str) -> PortResult<ConversionRecord> {
        let sql = format!("SELECT {CONVERSION_COLUMNS} FROM conversions WHERE slug = $1");
        let row = sqlx::query_as::<_, ConversionRow>(&sql)
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, format!("Conversion '{slug}' not found")))?;
        Ok(row.to_domain())
    }

    async fn get_public_by_slug(&self, slug: &str) -> PortResult<ConversionRecord> {
        let sql = format!(
            "SELECT {CONVERSION_COLUMNS} FROM conversions WHERE slug = $1 AND is_public = TRUE"
        );
        let row = sqlx::query_as::<_, ConversionRow>(&sql)
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, format!("Conversion '{slug}' not found")))?;
        Ok(row.to_domain())
    }

    async fn get_public_by_id(&self, id: Uuid) -> PortResult<ConversionRecord> {
        let sql = format!(
            "SELECT {CONVERSION_COLUMNS} FROM conversions WHERE id = $1 AND is_public = TRUE"
        );
        let row = sqlx::query_as::<_, ConversionRow>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, format!("Conversion {id} not found")))?;
        Ok(row.to_domain())
    }

    async fn list_for_account(
        &self,
        account_id: Uuid,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> PortResult<(Vec<ConversionRecord>, i64)> {
        let pattern = search.map(|s| format!("%{s}%"));

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM conversions WHERE account_id = $1 \
             AND ($2::text IS NULL OR title ILIKE $2 OR content ILIKE $2)",
        )
        .bind(account_id)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;

        let sql = format!(
            "SELECT {CONVERSION_COLUMNS} FROM conversions WHERE account_id = $1 \
             AND ($2::text IS NULL OR title ILIKE $2 OR content ILIKE $2) \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, ConversionRow>(&sql)
            .bind(account_id)
            .bind(&pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;

        Ok((rows.into_iter().map(|r| r.to_domain()).collect(), total))
    }

    async fn claim(
        &self,
        id: Uuid,
        account_id: Uuid,
        make_public: bool,
    ) -> PortResult<ConversionRecord> {
        let sql = format!(
            "UPDATE conversions SET account_id = $2, is_public = $3, updated_at = now() \
             WHERE id = $1 RETURNING {CONVERSION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ConversionRow>(&sql)
            .bind(id)
            .bind(account_id)
            .bind(make_public)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, format!("Conversion {id} not found")))?;
        Ok(row.to_domain())
    }

    async fn record_view(&self, slug: &str) -> PortResult<i64> {
        let view_count = sqlx::query_scalar::<_, i64>(
            "UPDATE conversions SET view_count = view_count + 1, last_viewed_at = now(), \
             updated_at = now() WHERE slug = $1 RETURNING view_count",
        )
        .bind(slug)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, format!("Conversion '{slug}' not found")))?;
        Ok(view_count)
    }

    async fn delete_owned(&self, id: Uuid, account_id: Uuid) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM conversions WHERE id = $1 AND account_id = $2")
            .bind(id)
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

//=========================================================================================
// `ContextStackStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContextStackStore for DbAdapter {
    async fn create(&self, stack: NewContextStack) -> PortResult<ContextStack> {
        let sql = format!(
            "INSERT INTO context_stacks (id, account_id, name, description, blocks, \
             is_template, is_public) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {STACK_COLUMNS}"
        );
        let row = sqlx::query_as::<_, StackRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(stack.account_id)
            .bind(&stack.name)
            .bind(&stack.description)
            .bind(Json(&stack.blocks))
            .bind(stack.is_template)
            .bind(stack.is_public)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(row.to_domain())
    }

    async fn get_accessible(&self, id: Uuid, viewer: Option<Uuid>) -> PortResult<ContextStack> {
        let sql = format!(
            "SELECT {STACK_COLUMNS} FROM context_stacks \
             WHERE id = $1 AND (is_public = TRUE OR account_id = $2)"
        );
        let row = sqlx::query_as::<_, StackRow>(&sql)
            .bind(id)
            .bind(viewer)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, format!("Context stack {id} not found")))?;
        Ok(row.to_domain())
    }

    async fn list_for_account(
        &self,
        account_id: Uuid,
        search: Option<&str>,
        is_template: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> PortResult<Vec<ContextStack>> {
        let pattern = search.map(|s| format!("%{s}%"));
        let sql = format!(
            "SELECT {STACK_COLUMNS} FROM context_stacks WHERE account_id = $1 \
             AND ($2::text IS NULL OR name ILIKE $2 OR description ILIKE $2) \
             AND ($3::boolean IS NULL OR is_template = $3) \
             ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query_as::<_, StackRow>(&sql)
            .bind(account_id)
            .bind(&pattern)
            .bind(is_template)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_public(&self, limit: i64, offset: i64) -> PortResult<Vec<ContextStack>> {
        let sql = format!(
            "SELECT {STACK_COLUMNS} FROM context_stacks WHERE is_public = TRUE \
             ORDER BY use_count DESC, created_at DESC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query_as::<_, StackRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn update_owned(
        &self,
        id: Uuid,
        account_id: Uuid,
        update: ContextStackUpdate,
    ) -> PortResult<ContextStack> {
        let sql = format!(
            "UPDATE context_stacks SET \
             name = COALESCE($3, name), \
             description = COALESCE($4, description), \
             blocks = COALESCE($5, blocks), \
             is_template = COALESCE($6, is_template), \
             is_public = COALESCE($7, is_public), \
             updated_at = now() \
             WHERE id = $1 AND account_id = $2 RETURNING {STACK_COLUMNS}"
        );
        let row = sqlx::query_as::<_, StackRow>(&sql)
            .bind(id)
            .bind(account_id)
            .bind(&update.name)
            .bind(&update.description)
            .bind(update.blocks.as_ref().map(Json))
            .bind(update.is_template)
            .bind(update.is_public)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, format!("Context stack {id} not found")))?;
        Ok(row.to_domain())
    }

    async fn delete_owned(&self, id: Uuid, account_id: Uuid) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM context_stacks WHERE id = $1 AND account_id = $2")
            .bind(id)
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_use(&self, id: Uuid) -> PortResult<()> {
        sqlx::query(
            "UPDATE context_stacks SET use_count = use_count + 1, last_used_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }
}
