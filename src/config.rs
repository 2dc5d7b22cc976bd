//! Environment configuration.

use std::str::FromStr;
use std::time::Duration;
use rust_decimal::Decimal;
use crate::pricing::PricingPolicy;
use crate::reconcile::PollPolicy;
use crate::{Chf, Result, StorefrontError};

#[derive(Clone, Debug)]
pub struct StorefrontConfig {
    pub api_url: String,
    pub publishable_key: String,
    pub public_base_url: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub pricing: PricingPolicy,
    pub polling: PollPolicy,
    /// Cached carts and checkout flows untouched this long are dropped.
    pub session_idle: Duration,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3001".into(),
            publishable_key: String::new(),
            public_base_url: "http://localhost:3000".into(),
            port: 8083,
            database_url: None,
            nats_url: None,
            pricing: PricingPolicy::default(),
            polling: PollPolicy::default(),
            session_idle: Duration::from_secs(30 * 60),
        }
    }
}

impl StorefrontConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let pricing = PricingPolicy {
            free_shipping_threshold: parse_or(&get, "FREE_SHIPPING_THRESHOLD", defaults.pricing.free_shipping_threshold.amount())?.into(),
            flat_shipping_fee: Chf::from(parse_or(&get, "FLAT_SHIPPING_FEE", defaults.pricing.flat_shipping_fee.amount())?),
            tax_rate: parse_or(&get, "TAX_RATE", Decimal::ZERO)?,
        };
        if pricing.tax_rate.is_sign_negative() {
            return Err(StorefrontError::Config("TAX_RATE must not be negative".into()));
        }

        let polling = PollPolicy {
            interval: Duration::from_millis(parse_or(&get, "PAYMENT_POLL_INTERVAL_MS", defaults.polling.interval.as_millis() as u64)?),
            max_attempts: parse_or(&get, "PAYMENT_POLL_MAX_ATTEMPTS", defaults.polling.max_attempts)?,
        };
        if polling.interval.is_zero() {
            return Err(StorefrontError::Config("PAYMENT_POLL_INTERVAL_MS must be greater than 0".into()));
        }

        let session_idle = Duration::from_secs(parse_or(&get, "SESSION_IDLE_SECS", defaults.session_idle.as_secs())?);
        if session_idle.is_zero() {
            return Err(StorefrontError::Config("SESSION_IDLE_SECS must be greater than 0".into()));
        }

        Ok(Self {
            api_url: get("API_URL").unwrap_or(defaults.api_url).trim_end_matches('/').to_string(),
            publishable_key: get("STRIPE_PUBLISHABLE_KEY").unwrap_or_default(),
            public_base_url: get("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url).trim_end_matches('/').to_string(),
            port: parse_or(&get, "PORT", defaults.port)?,
            database_url: get("DATABASE_URL"),
            nats_url: get("NATS_URL"),
            pricing,
            polling,
            session_idle,
        })
    }
}

fn parse_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e| StorefrontError::Config(format!("{key}={raw}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StorefrontConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_url, "http://localhost:3001");
        assert_eq!(config.pricing, PricingPolicy::default());
        assert_eq!(config.polling.max_attempts, 15);
        assert_eq!(config.polling.interval, Duration::from_secs(2));
        assert!(config.database_url.is_none());
        assert_eq!(config.session_idle, Duration::from_secs(1800));
    }

    #[test]
    fn test_overrides() {
        let config = StorefrontConfig::from_lookup(lookup(&[
            ("API_URL", "https://api.yanev-shop.ch/"),
            ("TAX_RATE", "7.7"),
            ("FREE_SHIPPING_THRESHOLD", "100"),
            ("PAYMENT_POLL_MAX_ATTEMPTS", "5"),
            ("NATS_URL", "  "),
        ])).unwrap();
        assert_eq!(config.api_url, "https://api.yanev-shop.ch");
        assert_eq!(config.pricing.tax_rate, Decimal::new(77, 1));
        assert_eq!(config.pricing.free_shipping_threshold, Chf::francs(100));
        assert_eq!(config.polling.max_attempts, 5);
        assert!(config.nats_url.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(StorefrontConfig::from_lookup(lookup(&[("PORT", "http")])), Err(StorefrontError::Config(_))));
        assert!(matches!(StorefrontConfig::from_lookup(lookup(&[("TAX_RATE", "-1")])), Err(StorefrontError::Config(_))));
        assert!(matches!(StorefrontConfig::from_lookup(lookup(&[("PAYMENT_POLL_INTERVAL_MS", "0")])), Err(StorefrontError::Config(_))));
        assert!(matches!(StorefrontConfig::from_lookup(lookup(&[("SESSION_IDLE_SECS", "0")])), Err(StorefrontError::Config(_))));
    }
}
