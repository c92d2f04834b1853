//! Runtime configuration for the rental engine.
//!
//! Values come from `SABER_*` environment variables; anything unset falls back
//! to the defaults below. The pricing policy is validated once, when the
//! orchestrator is built.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use saber_pricing::{ConfigError, PolicyKind, PricingParams, PricingPolicy};

pub const ENV_DEPOSIT_COINS: &str = "SABER_DEPOSIT_COINS";
pub const ENV_RENT_COINS_PER_DAY: &str = "SABER_RENT_COINS_PER_DAY";
pub const ENV_PENALTY_COINS_PER_DAY: &str = "SABER_PENALTY_COINS_PER_DAY";
pub const ENV_RENTAL_PERIOD_DAYS: &str = "SABER_RENTAL_PERIOD_DAYS";
pub const ENV_PRICING_POLICY: &str = "SABER_PRICING_POLICY";
pub const ENV_LOCK_TIMEOUT_MS: &str = "SABER_LOCK_TIMEOUT_MS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigLoadError {
    #[error("{key}='{value}' is not valid: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Pricing(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalConfig {
    #[serde(default)]
    pub policy: PolicyKind,
    #[serde(default = "default_deposit_coins")]
    pub deposit_coins: u64,
    #[serde(default = "default_rent_coins_per_day")]
    pub rent_coins_per_day: u64,
    #[serde(default = "default_penalty_coins_per_day")]
    pub penalty_coins_per_day: u64,
    #[serde(default = "default_rental_period_days")]
    pub rental_period_days: u32,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_deposit_coins() -> u64 {
    10
}

fn default_rent_coins_per_day() -> u64 {
    1
}

fn default_penalty_coins_per_day() -> u64 {
    2
}

fn default_rental_period_days() -> u32 {
    7
}

fn default_lock_timeout_ms() -> u64 {
    2_000
}

impl Default for RentalConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            deposit_coins: default_deposit_coins(),
            rent_coins_per_day: default_rent_coins_per_day(),
            penalty_coins_per_day: default_penalty_coins_per_day(),
            rental_period_days: default_rental_period_days(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl RentalConfig {
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = get(ENV_PRICING_POLICY) {
            config.policy = raw.parse::<PolicyKind>()?;
        }
        if let Some(raw) = get(ENV_DEPOSIT_COINS) {
            config.deposit_coins = parse(ENV_DEPOSIT_COINS, &raw)?;
        }
        if let Some(raw) = get(ENV_RENT_COINS_PER_DAY) {
            config.rent_coins_per_day = parse(ENV_RENT_COINS_PER_DAY, &raw)?;
        }
        if let Some(raw) = get(ENV_PENALTY_COINS_PER_DAY) {
            config.penalty_coins_per_day = parse(ENV_PENALTY_COINS_PER_DAY, &raw)?;
        }
        if let Some(raw) = get(ENV_RENTAL_PERIOD_DAYS) {
            config.rental_period_days = parse(ENV_RENTAL_PERIOD_DAYS, &raw)?;
        }
        if let Some(raw) = get(ENV_LOCK_TIMEOUT_MS) {
            config.lock_timeout_ms = parse(ENV_LOCK_TIMEOUT_MS, &raw)?;
        }

        Ok(config)
    }

    pub fn pricing_params(&self) -> PricingParams {
        PricingParams {
            deposit_reward: Some(self.deposit_coins),
            rent_per_day: Some(self.rent_coins_per_day),
            penalty_per_day: Some(self.penalty_coins_per_day),
            rental_period_days: Some(self.rental_period_days),
        }
    }

    pub fn pricing_policy(&self) -> Result<PricingPolicy, ConfigError> {
        PricingPolicy::new(self.policy, &self.pricing_params())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigLoadError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigLoadError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_classic_economy() {
        let config = RentalConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RentalConfig::default());

        let policy = config.pricing_policy().unwrap();
        assert_eq!(policy.deposit_reward(), 10);
        assert_eq!(policy.rental_price(policy.rental_period_days()), 7);
        assert_eq!(policy.penalty(1), 2);
        assert_eq!(config.lock_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn overrides_are_read_and_trimmed() {
        let config = RentalConfig::from_lookup(lookup(&[
            (ENV_PRICING_POLICY, "by_recurrence"),
            (ENV_RENT_COINS_PER_DAY, " 10 "),
            (ENV_LOCK_TIMEOUT_MS, "50"),
            (ENV_DEPOSIT_COINS, ""),
        ]))
        .unwrap();

        assert_eq!(config.policy, PolicyKind::ByRecurrence);
        assert_eq!(config.rent_coins_per_day, 10);
        assert_eq!(config.deposit_coins, 10);
        assert_eq!(config.lock_timeout(), Duration::from_millis(50));
    }

    #[test]
    fn malformed_numbers_name_the_variable() {
        let err = RentalConfig::from_lookup(lookup(&[(ENV_PENALTY_COINS_PER_DAY, "two")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::InvalidValue {
                key: ENV_PENALTY_COINS_PER_DAY,
                ..
            }
        ));
    }

    #[test]
    fn unknown_policy_is_a_pricing_error() {
        let err = RentalConfig::from_lookup(lookup(&[(ENV_PRICING_POLICY, "auction")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigLoadError::Pricing(ConfigError::UnknownPolicy("auction".to_string()))
        );
    }

    #[test]
    fn zero_rate_fails_policy_validation() {
        let config = RentalConfig {
            rent_coins_per_day: 0,
            ..RentalConfig::default()
        };
        assert!(matches!(
            config.pricing_policy(),
            Err(ConfigError::InvalidParameter {
                name: "rent_per_day",
                ..
            })
        ));
    }

    #[test]
    fn deserializes_partial_documents() {
        let config: RentalConfig =
            serde_json::from_str(r#"{"policy":"by_recurrence","lock_timeout_ms":10}"#).unwrap();
        assert_eq!(config.policy, PolicyKind::ByRecurrence);
        assert_eq!(config.rental_period_days, 7);
        assert_eq!(config.lock_timeout_ms, 10);
    }
}
