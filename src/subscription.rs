use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Basic,
    Premium,
    Pro,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Premium => "premium",
            SubscriptionTier::Pro => "pro",
        }
    }

    pub fn plan(&self) -> &'static PricingPlan {
        match self {
            SubscriptionTier::Basic => &PRICING_PLANS[0],
            SubscriptionTier::Premium => &PRICING_PLANS[1],
            SubscriptionTier::Pro => &PRICING_PLANS[2],
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(SubscriptionTier::Basic),
            "premium" => Ok(SubscriptionTier::Premium),
            "pro" => Ok(SubscriptionTier::Pro),
            other => bail!("unknown subscription tier: {other}"),
        }
    }
}

/// Monthly allowances; `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageLimits {
    pub meal_plans_per_month: Option<u32>,
    pub progress_logs_per_month: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PricingPlan {
    pub tier: SubscriptionTier,
    pub name: &'static str,
    pub monthly_price: u32,
    pub features: &'static [&'static str],
    pub popular: bool,
    pub limits: UsageLimits,
}

pub const PRICING_PLANS: [PricingPlan; 3] = [
    PricingPlan {
        tier: SubscriptionTier::Basic,
        name: "Basic",
        monthly_price: 15,
        features: &[
            "Personalized meal plans",
            "Basic recipe suggestions",
            "Progress tracking",
            "Email support",
        ],
        popular: false,
        limits: UsageLimits {
            meal_plans_per_month: Some(30),
            progress_logs_per_month: Some(10),
        },
    },
    PricingPlan {
        tier: SubscriptionTier::Premium,
        name: "Premium",
        monthly_price: 25,
        features: &[
            "Everything in Basic",
            "Advanced AI recommendations",
            "Weekly progress analysis",
            "Meal plan adjustments",
            "Priority support",
        ],
        popular: true,
        limits: UsageLimits {
            meal_plans_per_month: None,
            progress_logs_per_month: None,
        },
    },
    PricingPlan {
        tier: SubscriptionTier::Pro,
        name: "Pro",
        monthly_price: 40,
        features: &[
            "Everything in Premium",
            "Direct nutritionist consultation",
            "Custom dietary protocols",
            "Advanced analytics",
            "24/7 chat support",
        ],
        popular: false,
        limits: UsageLimits {
            meal_plans_per_month: None,
            progress_logs_per_month: None,
        },
    },
];

/// Tier columns as stored on the user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredSubscription {
    pub tier: SubscriptionTier,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionStatus {
    pub tier: SubscriptionTier,
    /// Tier whose limits apply right now. A lapsed paid tier drops to basic.
    pub effective_tier: SubscriptionTier,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub days_until_expiry: i64,
}

/// Basic never lapses. A paid tier without an expiry is open-ended.
pub fn subscription_status(stored: StoredSubscription, now: DateTime<Utc>) -> SubscriptionStatus {
    let days_until_expiry = stored
        .expires_at
        .map(|expires_at| days_until(expires_at, now))
        .unwrap_or(0);

    let lapsed = stored.tier != SubscriptionTier::Basic
        && stored.expires_at.is_some_and(|expires_at| expires_at <= now);

    SubscriptionStatus {
        tier: stored.tier,
        effective_tier: if lapsed {
            SubscriptionTier::Basic
        } else {
            stored.tier
        },
        active: !lapsed,
        expires_at: stored.expires_at,
        days_until_expiry,
    }
}

/// Whole days left, rounded up; zero once expired.
fn days_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (expires_at - now).num_seconds();
    if seconds <= 0 {
        0
    } else {
        (seconds + 86_399) / 86_400
    }
}

/// Expiry for a paid tier bought `months` months at a time.
pub fn paid_until(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now + Duration::days(30 * i64::from(months))
}

/// Midnight UTC on the first day of `today`'s month; usage counts reset there.
pub fn usage_period_start(today: NaiveDate) -> DateTime<Utc> {
    let first = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);
    first.and_time(NaiveTime::MIN).and_utc()
}

pub fn ensure_within(
    limit: Option<u32>,
    used: i64,
    what: &str,
    tier: SubscriptionTier,
) -> anyhow::Result<()> {
    if let Some(limit) = limit {
        if used >= i64::from(limit) {
            bail!("the {tier} plan allows {limit} {what} per month and {used} are already used");
        }
    }
    Ok(())
}

pub fn format_usage(used: i64, limit: Option<u32>) -> String {
    match limit {
        Some(limit) => format!("{used} / {limit}"),
        None => format!("{used} (unlimited)"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn catalogue_matches_tiers() {
        let prices: Vec<u32> = PRICING_PLANS.iter().map(|plan| plan.monthly_price).collect();
        assert_eq!(prices, vec![15, 25, 40]);
        for plan in PRICING_PLANS.iter() {
            assert_eq!(plan.tier.plan().name, plan.name);
        }
        assert!(SubscriptionTier::Premium.plan().popular);
        assert_eq!(
            SubscriptionTier::Basic.plan().limits.progress_logs_per_month,
            Some(10)
        );
        assert_eq!(SubscriptionTier::Pro.plan().limits.meal_plans_per_month, None);
    }

    #[test]
    fn parses_stored_tier_names() {
        assert_eq!("premium".parse::<SubscriptionTier>().unwrap(), SubscriptionTier::Premium);
        assert_eq!(" Pro ".parse::<SubscriptionTier>().unwrap(), SubscriptionTier::Pro);
        assert!("gold".parse::<SubscriptionTier>().is_err());
        assert_eq!(SubscriptionTier::Basic.to_string(), "basic");
    }

    #[test]
    fn basic_without_expiry_is_active() {
        let status = subscription_status(
            StoredSubscription {
                tier: SubscriptionTier::Basic,
                expires_at: None,
            },
            now(),
        );
        assert!(status.active);
        assert_eq!(status.effective_tier, SubscriptionTier::Basic);
        assert_eq!(status.days_until_expiry, 0);
    }

    #[test]
    fn paid_tier_counts_days_rounding_up() {
        let expires_at = now() + Duration::days(29) + Duration::hours(1);
        let status = subscription_status(
            StoredSubscription {
                tier: SubscriptionTier::Premium,
                expires_at: Some(expires_at),
            },
            now(),
        );
        assert!(status.active);
        assert_eq!(status.effective_tier, SubscriptionTier::Premium);
        assert_eq!(status.days_until_expiry, 30);
    }

    #[test]
    fn lapsed_paid_tier_falls_back_to_basic() {
        let status = subscription_status(
            StoredSubscription {
                tier: SubscriptionTier::Pro,
                expires_at: Some(now() - Duration::days(2)),
            },
            now(),
        );
        assert!(!status.active);
        assert_eq!(status.tier, SubscriptionTier::Pro);
        assert_eq!(status.effective_tier, SubscriptionTier::Basic);
        assert_eq!(status.days_until_expiry, 0);
    }

    #[test]
    fn paid_until_adds_thirty_day_months() {
        assert_eq!(paid_until(now(), 2), now() + Duration::days(60));
    }

    #[test]
    fn usage_period_starts_at_first_of_month() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 17).unwrap();
        assert_eq!(
            usage_period_start(today),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn limits_block_only_when_reached() {
        let tier = SubscriptionTier::Basic;
        assert!(ensure_within(Some(10), 9, "progress logs", tier).is_ok());
        assert!(ensure_within(Some(10), 10, "progress logs", tier).is_err());
        assert!(ensure_within(None, 10_000, "progress logs", SubscriptionTier::Pro).is_ok());
        assert_eq!(format_usage(8, Some(10)), "8 / 10");
        assert_eq!(format_usage(24, None), "24 (unlimited)");
    }
}
