//! Coin pricing: deposit rewards, rental prices, overdue penalties.
//!
//! Pure functions over a policy chosen once at configuration time.

pub mod policy;

pub use policy::{ConfigError, PolicyKind, PricingParams, PricingPolicy};
