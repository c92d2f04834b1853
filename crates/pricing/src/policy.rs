use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Percentage kept after the recurrence discount.
const RECURRENCE_DISCOUNT_KEEP_PCT: u64 = 90;
/// Flat coins added to deposit rewards under the recurrence policy.
const RECURRENCE_DEPOSIT_BONUS: u64 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pricing parameter `{0}` is not configured")]
    MissingParameter(&'static str),

    #[error("pricing parameter `{name}` is invalid: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("unknown pricing policy '{0}' (expected 'by_duration' or 'by_recurrence')")]
    UnknownPolicy(String),
}

/// Which pricing variant a deployment runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Price is purely a function of time.
    #[default]
    ByDuration,
    /// Time-based price with a discount for renters and a bonus for depositors.
    ByRecurrence,
}

impl FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "by_duration" | "duration" => Ok(PolicyKind::ByDuration),
            "by_recurrence" | "recurrence" => Ok(PolicyKind::ByRecurrence),
            other => Err(ConfigError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Raw pricing parameters as supplied by configuration. Every field is
/// required; `PricingPolicy::new` reports the first one missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingParams {
    pub deposit_reward: Option<u64>,
    pub rent_per_day: Option<u64>,
    pub penalty_per_day: Option<u64>,
    pub rental_period_days: Option<u32>,
}

/// Validated pricing policy. Immutable for the lifetime of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    kind: PolicyKind,
    deposit_reward: u64,
    rent_per_day: u64,
    penalty_per_day: u64,
    rental_period_days: u32,
}

impl PricingPolicy {
    pub fn new(kind: PolicyKind, params: &PricingParams) -> Result<Self, ConfigError> {
        let deposit_reward = positive("deposit_reward", params.deposit_reward)?;
        let rent_per_day = positive("rent_per_day", params.rent_per_day)?;
        let penalty_per_day = positive("penalty_per_day", params.penalty_per_day)?;
        let rental_period_days = positive(
            "rental_period_days",
            params.rental_period_days.map(u64::from),
        )?;
        let rental_period_days =
            u32::try_from(rental_period_days).map_err(|_| ConfigError::InvalidParameter {
                name: "rental_period_days",
                reason: "out of range".to_string(),
            })?;

        Ok(Self {
            kind,
            deposit_reward,
            rent_per_day,
            penalty_per_day,
            rental_period_days,
        })
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    /// Length of one rental, in days.
    pub fn rental_period_days(&self) -> u32 {
        self.rental_period_days
    }

    /// Coins minted for the depositor of a new item.
    pub fn deposit_reward(&self) -> u64 {
        self.bonus(self.deposit_reward)
    }

    /// Coins charged for renting an item for `days` days.
    pub fn rental_price(&self, days: u32) -> u64 {
        self.discount(u64::from(days).saturating_mul(self.rent_per_day))
    }

    /// Coins charged for returning `overdue_days` late. Negative input counts as
    /// on time.
    pub fn penalty(&self, overdue_days: i64) -> u64 {
        let days = u64::try_from(overdue_days).unwrap_or(0);
        days.saturating_mul(self.penalty_per_day)
    }

    pub fn discount(&self, amount: u64) -> u64 {
        match self.kind {
            PolicyKind::ByDuration => amount,
            PolicyKind::ByRecurrence => amount.saturating_mul(RECURRENCE_DISCOUNT_KEEP_PCT) / 100,
        }
    }

    pub fn bonus(&self, amount: u64) -> u64 {
        match self.kind {
            PolicyKind::ByDuration => amount,
            PolicyKind::ByRecurrence => amount.saturating_add(RECURRENCE_DEPOSIT_BONUS),
        }
    }
}

fn positive(name: &'static str, value: Option<u64>) -> Result<u64, ConfigError> {
    match value {
        None => Err(ConfigError::MissingParameter(name)),
        Some(0) => Err(ConfigError::InvalidParameter {
            name,
            reason: "must be positive".to_string(),
        }),
        Some(v) => Ok(v),
    }
}
