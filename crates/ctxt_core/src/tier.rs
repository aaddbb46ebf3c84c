//! crates/ctxt_core/src/tier.rs
//!
//! Static subscription-tier policy: which daily conversion quota and which
//! feature set each tier carries. Pure lookups, no side effects.

use serde::{Deserialize, Serialize};

/// A named subscription level. Closed set; anything else degrades to `Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Power,
    Pro,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Power => "power",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }

    pub fn from_name(name: &str) -> Option<Tier> {
        match name {
            "free" => Some(Tier::Free),
            "power" => Some(Tier::Power),
            "pro" => Some(Tier::Pro),
            "enterprise" => Some(Tier::Enterprise),
            _ => None,
        }
    }

    /// Tiers in ascending order of entitlement.
    const ORDERED: [Tier; 4] = [Tier::Free, Tier::Power, Tier::Pro, Tier::Enterprise];

    fn rank(self) -> usize {
        match self {
            Tier::Free => 0,
            Tier::Power => 1,
            Tier::Pro => 2,
            Tier::Enterprise => 3,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const FREE_FEATURES: &[&str] = &[
    "client_side_conversion",
    "copy_to_clipboard",
    "chatgpt_export",
    "claude_export",
    "seo_pages_access",
];

const POWER_FEATURES: &[&str] = &[
    "unlimited_conversions",
    "conversion_library",
    "advanced_export",
    "context_templates",
    "browser_extension",
    "priority_conversion",
];

const PRO_FEATURES: &[&str] = &[
    "mcp_server_access",
    "api_access",
    "advanced_context_tools",
    "team_sharing",
    "analytics_dashboard",
    "priority_support",
];

const ENTERPRISE_FEATURES: &[&str] = &[
    "self_hosted_mcp",
    "custom_rate_limits",
    "sso_integration",
    "custom_features",
    "sla_guarantees",
    "dedicated_support",
];

/// What a tier entitles a caller to.
#[derive(Debug, Clone, Copy)]
pub struct TierSpec {
    /// `None` means unlimited conversions.
    pub daily_limit: Option<u32>,
    pub features: &'static [&'static str],
}

impl TierSpec {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(&feature)
    }
}

/// Tier-to-entitlement mapping, assembled once at startup.
#[derive(Debug, Clone)]
pub struct TierPolicy {
    free_daily_limit: u32,
}

impl TierPolicy {
    pub fn new(free_daily_limit: u32) -> Self {
        Self { free_daily_limit }
    }

    pub fn spec(&self, tier: Tier) -> TierSpec {
        match tier {
            Tier::Free => TierSpec {
                daily_limit: Some(self.free_daily_limit),
                features: FREE_FEATURES,
            },
            Tier::Power => TierSpec {
                daily_limit: None,
                features: POWER_FEATURES,
            },
            Tier::Pro => TierSpec {
                daily_limit: None,
                features: PRO_FEATURES,
            },
            Tier::Enterprise => TierSpec {
                daily_limit: None,
                features: ENTERPRISE_FEATURES,
            },
        }
    }

    /// Whether a tier is entitled to a feature. Entitlements are cumulative:
    /// each paid tier includes everything from the tiers below it.
    pub fn can_access(&self, tier: Tier, feature: &str) -> bool {
        Tier::ORDERED[..=tier.rank()]
            .iter()
            .any(|t| self.spec(*t).has_feature(feature))
    }

    pub fn daily_limit(&self, tier: Tier) -> Option<u32> {
        self.spec(tier).daily_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_tier_is_limited() {
        let policy = TierPolicy::new(5);
        assert_eq!(policy.daily_limit(Tier::Free), Some(5));
    }

    #[test]
    fn paid_tiers_are_unlimited() {
        let policy = TierPolicy::new(5);
        assert_eq!(policy.daily_limit(Tier::Power), None);
        assert_eq!(policy.daily_limit(Tier::Pro), None);
        assert_eq!(policy.daily_limit(Tier::Enterprise), None);
    }

    #[test]
    fn unknown_tier_name_falls_back_to_free() {
        let policy = TierPolicy::new(5);
        let tier = Tier::from_name("platinum").unwrap_or(Tier::Free);
        let spec = policy.spec(tier);
        assert_eq!(spec.daily_limit, Some(5));
        assert!(spec.has_feature("copy_to_clipboard"));
    }

    #[test]
    fn feature_lookup() {
        let policy = TierPolicy::new(5);
        assert!(policy.spec(Tier::Pro).has_feature("api_access"));
        assert!(!policy.spec(Tier::Free).has_feature("api_access"));
    }

    #[test]
    fn entitlements_are_cumulative_across_tiers() {
        let policy = TierPolicy::new(5);
        assert!(policy.can_access(Tier::Power, "context_templates"));
        assert!(policy.can_access(Tier::Pro, "context_templates"));
        assert!(policy.can_access(Tier::Enterprise, "conversion_library"));
        assert!(policy.can_access(Tier::Power, "copy_to_clipboard"));
        assert!(!policy.can_access(Tier::Free, "context_templates"));
        assert!(!policy.can_access(Tier::Power, "api_access"));
    }
}
