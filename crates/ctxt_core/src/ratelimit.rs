//! crates/ctxt_core/src/ratelimit.rs
//!
//! Tier-aware rate limiting for conversions. Combines the static tier policy
//! with the rolling 24-hour usage window to produce an allow/deny decision
//! plus quota metadata. Decisions are computed fresh on every request and
//! never cached.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::warn;

use crate::domain::{Account, RateLimitDecision};
use crate::ports::{PortResult, UsageCounter};
use crate::tier::{Tier, TierPolicy};

/// Width of the usage lookback window.
const USAGE_WINDOW_HOURS: i64 = 24;

pub struct RateLimiter {
    policy: TierPolicy,
    usage: Arc<dyn UsageCounter>,
}

impl RateLimiter {
    pub fn new(policy: TierPolicy, usage: Arc<dyn UsageCounter>) -> Self {
        Self { policy, usage }
    }

    /// Checks whether the caller may run another conversion right now.
    ///
    /// Anonymous callers are evaluated against the free tier. A store failure
    /// propagates as an error; the caller must surface it as a transient
    /// failure rather than silently allowing or denying the request.
    pub async fn check(&self, account: Option<&Account>) -> PortResult<RateLimitDecision> {
        self.check_at(account, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        account: Option<&Account>,
        now: DateTime<Utc>,
    ) -> PortResult<RateLimitDecision> {
        let tier = account.map(|a| a.tier).unwrap_or(Tier::Free);

        let Some(daily_limit) = self.policy.daily_limit(tier) else {
            // Unlimited tiers never query usage, so their decision reports
            // current_usage as zero rather than a precise figure.
            return Ok(RateLimitDecision {
                allowed: true,
                tier,
                daily_limit: None,
                remaining: None,
                current_usage: 0,
                reset_at: None,
            });
        };

        let since = now - Duration::hours(USAGE_WINDOW_HOURS);
        let current_usage = match account {
            Some(account) => self.usage.conversions_since(account.id, since).await?,
            // Anonymous usage is not tracked per identity.
            None => 0,
        };

        let remaining = daily_limit.saturating_sub(current_usage);
        let allowed = current_usage < daily_limit;

        if !allowed {
            warn!(
                account = %account.map(|a| a.id.to_string()).unwrap_or_else(|| "anonymous".into()),
                %tier,
                current_usage,
                daily_limit,
                "rate limit exceeded"
            );
        }

        Ok(RateLimitDecision {
            allowed,
            tier,
            daily_limit: Some(daily_limit),
            remaining: Some(remaining),
            current_usage,
            reset_at: Some(next_utc_midnight(now)),
        })
    }
}

/// The next UTC midnight strictly after `now`.
fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    (now.date_naive() + Duration::days(1))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// In-memory usage history: a list of conversion timestamps per account.
    struct MemoryUsage {
        created: Mutex<Vec<(Uuid, DateTime<Utc>)>>,
        unavailable: bool,
    }

    impl MemoryUsage {
        fn with_history(entries: Vec<(Uuid, DateTime<Utc>)>) -> Self {
            Self {
                created: Mutex::new(entries),
                unavailable: false,
            }
        }

        fn down() -> Self {
            Self {
                created: Mutex::new(Vec::new()),
                unavailable: true,
            }
        }
    }

    #[async_trait]
    impl UsageCounter for MemoryUsage {
        async fn conversions_since(
            &self,
            account_id: Uuid,
            since: DateTime<Utc>,
        ) -> PortResult<u32> {
            if self.unavailable {
                return Err(PortError::Unavailable("connection refused".into()));
            }
            let created = self.created.lock().unwrap();
            Ok(created
                .iter()
                .filter(|(id, at)| *id == account_id && *at >= since)
                .count() as u32)
        }
    }

    fn account(tier: Tier) -> Account {
        Account {
            id: Uuid::new_v4(),
            email: "user@example.com".into(),
            tier,
            is_active: true,
            usage_count: 0,
            subscription_ends_at: None,
            billing_customer_id: None,
            billing_subscription_id: None,
            created_at: Utc::now(),
        }
    }

    fn limiter_with(history: Vec<(Uuid, DateTime<Utc>)>) -> RateLimiter {
        RateLimiter::new(TierPolicy::new(5), Arc::new(MemoryUsage::with_history(history)))
    }

    #[tokio::test]
    async fn allows_under_the_limit() {
        let acct = account(Tier::Free);
        let now = Utc::now();
        let history = (0..4).map(|_| (acct.id, now - Duration::hours(1))).collect();
        let limiter = limiter_with(history);

        let decision = limiter.check_at(Some(&acct), now).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.current_usage, 4);
        assert_eq!(decision.remaining, Some(1));
    }

    #[tokio::test]
    async fn denies_at_the_limit() {
        let acct = account(Tier::Free);
        let now = Utc::now();
        let history = (0..5).map(|_| (acct.id, now - Duration::hours(1))).collect();
        let limiter = limiter_with(history);

        let decision = limiter.check_at(Some(&acct), now).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.current_usage, 5);
        assert_eq!(decision.remaining, Some(0));
        assert_eq!(decision.daily_limit, Some(5));
    }

    #[tokio::test]
    async fn window_rolls_past_old_conversions() {
        // Five conversions, but the oldest two fall outside the 24h window,
        // so the caller is allowed again without any explicit reset.
        let acct = account(Tier::Free);
        let now = Utc::now();
        let mut history: Vec<_> =
            (0..3).map(|_| (acct.id, now - Duration::hours(2))).collect();
        history.push((acct.id, now - Duration::hours(25)));
        history.push((acct.id, now - Duration::hours(30)));
        let limiter = limiter_with(history);

        let decision = limiter.check_at(Some(&acct), now).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.current_usage, 3);
    }

    #[tokio::test]
    async fn unlimited_tiers_never_query_usage() {
        let acct = account(Tier::Pro);
        // A broken usage store proves the unlimited path short-circuits.
        let limiter = RateLimiter::new(TierPolicy::new(5), Arc::new(MemoryUsage::down()));

        let decision = limiter.check(Some(&acct)).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.daily_limit, None);
        assert_eq!(decision.remaining, None);
        assert_eq!(decision.reset_at, None);
    }

    #[tokio::test]
    async fn anonymous_callers_use_the_free_tier() {
        let limiter = limiter_with(Vec::new());
        let decision = limiter.check(None).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.tier, Tier::Free);
        assert_eq!(decision.daily_limit, Some(5));
        assert_eq!(decision.current_usage, 0);
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let acct = account(Tier::Free);
        let limiter = RateLimiter::new(TierPolicy::new(5), Arc::new(MemoryUsage::down()));

        let err = limiter.check(Some(&acct)).await.unwrap_err();
        assert!(matches!(err, PortError::Unavailable(_)));
    }

    #[test]
    fn reset_is_the_next_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap();
        let reset = next_utc_midnight(now);
        assert_eq!(reset, Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap());

        // Strictly after now, even exactly at midnight.
        let midnight = Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap();
        assert_eq!(
            next_utc_midnight(midnight),
            Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap()
        );
    }
}
