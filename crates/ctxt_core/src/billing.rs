//! crates/ctxt_core/src/billing.rs
//!
//! Application of asynchronous billing webhook events: signature
//! verification over the raw body, payload parsing into typed events, and
//! idempotent application to the account store. Webhooks may be redelivered,
//! so every write uses absolute set semantics.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::info;
use uuid::Uuid;

use crate::ports::{AccountStore, PortResult};
use crate::tier::Tier;

type HmacSha256 = Hmac<Sha256>;

/// Verifies the hex-encoded HMAC-SHA256 signature of a raw webhook body.
/// Comparison is constant-time.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// A recognized billing event, already reduced to what we apply.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    /// A completed checkout or one-time order granting a tier.
    TierGranted {
        account_id: Uuid,
        tier: Tier,
        customer_id: Option<String>,
    },
    SubscriptionCreated {
        customer_id: String,
        subscription_id: String,
        current_period_end: Option<DateTime<Utc>>,
    },
    SubscriptionUpdated {
        subscription_id: String,
        current_period_end: Option<DateTime<Utc>>,
    },
    SubscriptionCanceled {
        subscription_id: String,
        cancel_at: Option<DateTime<Utc>>,
    },
}

/// A recognized event type whose payload was unusable. These are logged and
/// acknowledged rather than failed, since the provider will redeliver the
/// same broken payload forever.
#[derive(Debug, thiserror::Error)]
#[error("malformed {event_type} payload: {detail}")]
pub struct MalformedEvent {
    pub event_type: String,
    pub detail: String,
}

impl BillingEvent {
    /// Parses a webhook payload. `Ok(None)` means the event type is not one
    /// we act on.
    pub fn parse(event_type: &str, data: &Value) -> Result<Option<BillingEvent>, MalformedEvent> {
        let malformed = |detail: &str| MalformedEvent {
            event_type: event_type.to_string(),
            detail: detail.to_string(),
        };

        match event_type {
            "checkout.completed" | "order.created" => {
                let metadata = &data["metadata"];
                let account_id = metadata["user_id"]
                    .as_str()
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| malformed("missing or invalid metadata.user_id"))?;
                let tier = metadata["tier"]
                    .as_str()
                    .and_then(Tier::from_name)
                    .ok_or_else(|| malformed("missing or unknown metadata.tier"))?;
                Ok(Some(BillingEvent::TierGranted {
                    account_id,
                    tier,
                    customer_id: data["customer_id"].as_str().map(String::from),
                }))
            }
            "subscription.created" => {
                let customer_id = data["customer_id"]
                    .as_str()
                    .ok_or_else(|| malformed("missing customer_id"))?
                    .to_string();
                let subscription_id = data["id"]
                    .as_str()
                    .ok_or_else(|| malformed("missing id"))?
                    .to_string();
                Ok(Some(BillingEvent::SubscriptionCreated {
                    customer_id,
                    subscription_id,
                    current_period_end: timestamp(&data["current_period_end"]),
                }))
            }
            "subscription.updated" => {
                let subscription_id = data["id"]
                    .as_str()
                    .ok_or_else(|| malformed("missing id"))?
                    .to_string();
                Ok(Some(BillingEvent::SubscriptionUpdated {
                    subscription_id,
                    current_period_end: timestamp(&data["current_period_end"]),
                }))
            }
            "subscription.canceled" | "subscription.cancelled" => {
                let subscription_id = data["id"]
                    .as_str()
                    .ok_or_else(|| malformed("missing id"))?
                    .to_string();
                Ok(Some(BillingEvent::SubscriptionCanceled {
                    subscription_id,
                    cancel_at: timestamp(&data["cancel_at"]),
                }))
            }
            _ => Ok(None),
        }
    }
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Applies one event to the account store. Safe to call repeatedly with the
/// same event: every write sets absolute values.
pub async fn apply(accounts: &dyn AccountStore, event: BillingEvent) -> PortResult<()> {
    match event {
        BillingEvent::TierGranted {
            account_id,
            tier,
            customer_id,
        } => {
            accounts
                .grant_tier(account_id, tier, customer_id.as_deref())
                .await?;
            info!(%account_id, %tier, "tier granted");
        }
        BillingEvent::SubscriptionCreated {
            customer_id,
            subscription_id,
            current_period_end,
        } => {
            accounts
                .attach_subscription(&customer_id, &subscription_id, current_period_end)
                .await?;
            info!(%subscription_id, "subscription attached");
        }
        BillingEvent::SubscriptionUpdated {
            subscription_id,
            current_period_end,
        } => {
            accounts
                .set_subscription_end(&subscription_id, current_period_end)
                .await?;
            info!(%subscription_id, "subscription period updated");
        }
        BillingEvent::SubscriptionCanceled {
            subscription_id,
            cancel_at,
        } => {
            accounts
                .set_subscription_end(&subscription_id, cancel_at)
                .await?;
            info!(%subscription_id, "subscription canceled");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Account, AccountCredentials};
    use crate::ports::PortError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn signed(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_valid_signature() {
        let body = br#"{"type":"subscription.created"}"#;
        let sig = signed("shh", body);
        assert!(verify_signature("shh", body, &sig));
    }

    #[test]
    fn rejects_tampered_bodies_and_garbage_signatures() {
        let body = br#"{"type":"subscription.created"}"#;
        let sig = signed("shh", body);
        assert!(!verify_signature("shh", br#"{"type":"evil"}"#, &sig));
        assert!(!verify_signature("other-secret", body, &sig));
        assert!(!verify_signature("shh", body, "not-hex"));
    }

    #[test]
    fn parses_checkout_completed() {
        let account_id = Uuid::new_v4();
        let data = json!({
            "id": "co_123",
            "customer_id": "cus_9",
            "metadata": { "user_id": account_id.to_string(), "tier": "power" }
        });
        let event = BillingEvent::parse("checkout.completed", &data).unwrap().unwrap();
        assert_eq!(
            event,
            BillingEvent::TierGranted {
                account_id,
                tier: Tier::Power,
                customer_id: Some("cus_9".into())
            }
        );
    }

    #[test]
    fn unknown_event_types_are_skipped() {
        assert_eq!(BillingEvent::parse("invoice.paid", &json!({})).unwrap(), None);
    }

    #[test]
    fn checkout_without_tier_is_malformed() {
        let data = json!({ "metadata": { "user_id": Uuid::new_v4().to_string() } });
        assert!(BillingEvent::parse("checkout.completed", &data).is_err());
    }

    #[test]
    fn cancelled_spelling_variant_is_accepted() {
        let data = json!({ "id": "sub_1", "cancel_at": "2026-01-01T00:00:00Z" });
        let event = BillingEvent::parse("subscription.cancelled", &data).unwrap().unwrap();
        assert!(matches!(event, BillingEvent::SubscriptionCanceled { .. }));
    }

    /// Account store stub covering only what billing application touches.
    struct MemoryAccounts {
        accounts: Mutex<Vec<Account>>,
    }

    impl MemoryAccounts {
        fn with(account: Account) -> Self {
            Self {
                accounts: Mutex::new(vec![account]),
            }
        }

        fn snapshot(&self, id: Uuid) -> Account {
            self.accounts
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.id == id)
                .cloned()
                .unwrap()
        }
    }

    #[async_trait]
    impl AccountStore for MemoryAccounts {
        async fn create_account(
            &self,
            _email: &str,
            _hashed_password: &str,
        ) -> PortResult<Account> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn get_account(&self, account_id: Uuid) -> PortResult<Account> {
            Ok(self.snapshot(account_id))
        }

        async fn get_account_by_email(&self, _email: &str) -> PortResult<AccountCredentials> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn create_auth_session(
            &self,
            _session_id: &str,
            _account_id: Uuid,
            _expires_at: DateTime<Utc>,
        ) -> PortResult<()> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn validate_auth_session(&self, _session_id: &str) -> PortResult<Uuid> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn delete_auth_session(&self, _session_id: &str) -> PortResult<()> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn record_usage(&self, _account_id: Uuid) -> PortResult<()> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn grant_tier(
            &self,
            account_id: Uuid,
            tier: Tier,
            customer_id: Option<&str>,
        ) -> PortResult<()> {
            let mut accounts = self.accounts.lock().unwrap();
            if let Some(account) = accounts.iter_mut().find(|a| a.id == account_id) {
                account.tier = tier;
                if let Some(customer_id) = customer_id {
                    account.billing_customer_id = Some(customer_id.to_string());
                }
            }
            Ok(())
        }

        async fn attach_subscription(
            &self,
            customer_id: &str,
            subscription_id: &str,
            ends_at: Option<DateTime<Utc>>,
        ) -> PortResult<()> {
            let mut accounts = self.accounts.lock().unwrap();
            if let Some(account) = accounts
                .iter_mut()
                .find(|a| a.billing_customer_id.as_deref() == Some(customer_id))
            {
                account.billing_subscription_id = Some(subscription_id.to_string());
                account.subscription_ends_at = ends_at;
            }
            Ok(())
        }

        async fn set_subscription_end(
            &self,
            subscription_id: &str,
            ends_at: Option<DateTime<Utc>>,
        ) -> PortResult<()> {
            let mut accounts = self.accounts.lock().unwrap();
            if let Some(account) = accounts
                .iter_mut()
                .find(|a| a.billing_subscription_id.as_deref() == Some(subscription_id))
            {
                account.subscription_ends_at = ends_at;
            }
            Ok(())
        }
    }

    fn free_account() -> Account {
        Account {
            id: Uuid::new_v4(),
            email: "user@example.com".into(),
            tier: Tier::Free,
            is_active: true,
            usage_count: 0,
            subscription_ends_at: None,
            billing_customer_id: Some("cus_9".into()),
            billing_subscription_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn replaying_an_event_is_idempotent() {
        let account = free_account();
        let id = account.id;
        let store = MemoryAccounts::with(account);

        let data = json!({
            "id": "sub_1",
            "customer_id": "cus_9",
            "current_period_end": "2026-02-01T00:00:00Z",
            "metadata": { "user_id": id.to_string(), "tier": "pro" }
        });

        for event_type in ["checkout.completed", "subscription.created"] {
            let event = BillingEvent::parse(event_type, &data).unwrap().unwrap();
            apply(&store, event.clone()).await.unwrap();
            let once = store.snapshot(id);
            apply(&store, event).await.unwrap();
            let twice = store.snapshot(id);

            assert_eq!(once.tier, twice.tier);
            assert_eq!(once.subscription_ends_at, twice.subscription_ends_at);
            assert_eq!(once.billing_subscription_id, twice.billing_subscription_id);
        }

        let after = store.snapshot(id);
        assert_eq!(after.tier, Tier::Pro);
        assert_eq!(after.billing_subscription_id.as_deref(), Some("sub_1"));
        assert!(after.subscription_ends_at.is_some());
    }

    #[tokio::test]
    async fn cancellation_sets_the_end_date() {
        let mut account = free_account();
        account.billing_subscription_id = Some("sub_1".into());
        let id = account.id;
        let store = MemoryAccounts::with(account);

        let data = json!({ "id": "sub_1", "cancel_at": "2026-03-01T00:00:00Z" });
        let event = BillingEvent::parse("subscription.canceled", &data).unwrap().unwrap();
        apply(&store, event).await.unwrap();

        let after = store.snapshot(id);
        assert_eq!(
            after.subscription_ends_at.map(|t| t.to_rfc3339()),
            Some("2026-03-01T00:00:00+00:00".into())
        );
    }
}
